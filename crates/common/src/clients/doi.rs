//! DOI resolution and Altmetric lookups

use async_trait::async_trait;
use regex_lite::Regex;
use reqwest::{header, redirect, StatusCode};
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::debug;

use super::{http_client, transport_error};
use crate::config::DoiConfig;
use crate::errors::{AppError, Result};
use crate::metrics;

/// DOI metadata operations
#[async_trait]
pub trait DoiLookup: Send + Sync {
    /// Landing page URL a DOI resolves to; `None` when the DOI is unknown
    async fn resolve_url(&self, doi: &str) -> Result<Option<String>>;

    /// Altmetric record for a DOI; `None` when Altmetric has no data
    async fn altmetric(&self, doi: &str) -> Result<Option<Value>>;
}

/// doi.org resolver plus Altmetric API client
pub struct DoiClient {
    config: DoiConfig,
    /// Never follows redirects; the `Location` header is the answer
    resolver: reqwest::Client,
    api: reqwest::Client,
}

impl DoiClient {
    pub fn new(config: DoiConfig) -> Result<Self> {
        let resolver = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .redirect(redirect::Policy::none())
            .build()
            .map_err(|e| AppError::Internal {
                message: format!("Failed to create HTTP client: {}", e),
            })?;
        let api = http_client(config.timeout_secs, None)?;
        Ok(Self { config, resolver, api })
    }

    async fn resolve(&self, doi: &str) -> Result<Option<String>> {
        let response = self
            .resolver
            .post(&self.config.resolver_url)
            .header(header::ACCEPT, "text/html,application/xhtml+xml")
            .form(&[("hdl", doi)])
            .send()
            .await
            .map_err(|e| transport_error("doi", e))?;

        let status = response.status();
        if status.is_redirection() {
            return Ok(response
                .headers()
                .get(header::LOCATION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string));
        }
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(AppError::external("doi", format!("HTTP {}", status)));
        }

        let body = response.text().await.map_err(|e| transport_error("doi", e))?;
        Ok(extract_redirect_link(&body))
    }

    async fn fetch_altmetric(&self, doi: &str) -> Result<Option<Value>> {
        let url = format!("{}{}", self.config.altmetric_url, doi);
        let response = self
            .api
            .get(&url)
            .send()
            .await
            .map_err(|e| transport_error("altmetric", e))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let value = response.json().await.map_err(|e| AppError::ExternalFormat {
                    message: format!("Failed to parse Altmetric response: {}", e),
                })?;
                Ok(Some(value))
            }
            status => Err(AppError::external("altmetric", format!("HTTP {}", status))),
        }
    }
}

/// First link target in an HTML body, used when the resolver answers with a page
pub fn extract_redirect_link(body: &str) -> Option<String> {
    let re = Regex::new(r#"<a href="(.*?)">"#).ok()?;
    re.captures(body)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

#[async_trait]
impl DoiLookup for DoiClient {
    async fn resolve_url(&self, doi: &str) -> Result<Option<String>> {
        let start = Instant::now();
        let result = self.resolve(doi).await;
        metrics::record_external("doi", result.is_ok(), start.elapsed());
        debug!(doi, resolved = ?result.as_ref().ok(), "DOI resolution");
        result
    }

    async fn altmetric(&self, doi: &str) -> Result<Option<Value>> {
        let start = Instant::now();
        let result = self.fetch_altmetric(doi).await;
        metrics::record_external("altmetric", result.is_ok(), start.elapsed());
        result
    }
}
