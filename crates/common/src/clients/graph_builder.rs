//! Graph builder client
//!
//! The graph builder indexes article documents into a Neo4j knowledge graph and answers
//! questions over it. Every call is a form-encoded POST carrying the Neo4j connection.

use async_trait::async_trait;
use reqwest::multipart;
use serde::Deserialize;
use serde_json::Value;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::{http_client, transport_error};
use crate::config::GraphBuilderConfig;
use crate::errors::{AppError, Result};
use crate::metrics;

const SERVICE: &str = "graph_builder";

/// Source type recorded for documents uploaded from ArticleHub
const LOCAL_SOURCE: &str = "local file";

/// Node labels the extractor may create
const ALLOWED_NODES: &[&str] = &[
    "File", "Access", "PeerReview", "DatabaseType", "Area", "Language", "Editor", "Author",
    "Institution", "Keyword", "Citation", "Topic", "PublicationDate", "Journal", "FundingAgency",
    "Country", "Methodology", "ResearchField", "Affiliation", "DocumentType", "ExperimentType",
    "ImpactFactor", "Conference", "Publisher", "Reference", "Grant", "Version",
];

/// Relationship types the extractor may create
const ALLOWED_RELATIONSHIPS: &[&str] = &[
    "HAS_ACCESS", "HAS_PEER_REVIEW", "HAS_DATABASE_TYPE", "BELONGS_TO_AREA", "IN_LANGUAGE",
    "PUBLISHED_BY", "WRITTEN_BY", "AFFILIATED_WITH", "HAS_KEYWORD", "CITES", "RELATES_TO_TOPIC",
    "PUBLISHED_IN", "FUNDED_BY", "ORIGINATES_FROM", "SIMILAR_TO", "REFERENCED_BY", "USES_METHOD",
    "STUDIES_FIELD", "HAS_DOCUMENT_TYPE", "PART_OF_CONFERENCE", "PUBLISHED_WITH_PUBLISHER",
    "SUPPORTED_BY_GRANT", "MENTIONS_REFERENCE", "HAS_IMPACT_FACTOR", "HAS_EXPERIMENT_TYPE",
    "HAS_VERSION", "DERIVED_FROM", "IS_BASED_ON",
];

/// Envelope returned by every graph builder endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct GraphResponse {
    pub status: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl GraphResponse {
    pub fn is_success(&self) -> bool {
        self.status.eq_ignore_ascii_case("success")
    }

    fn into_result(self, operation: &str) -> Result<Value> {
        if self.is_success() {
            Ok(self.data)
        } else {
            let detail = self
                .error
                .or(self.message)
                .unwrap_or_else(|| format!("status {}", self.status));
            Err(AppError::external(SERVICE, format!("{} failed: {}", operation, detail)))
        }
    }
}

/// Answer text of a chat response
///
/// The answer lives under `info.metric_details.answer`; older deployments put it in `message`.
pub fn answer_text(data: &Value) -> Option<&str> {
    data.pointer("/info/metric_details/answer")
        .or_else(|| data.pointer("/message"))
        .and_then(Value::as_str)
}

/// Operations on the external knowledge graph
#[async_trait]
pub trait GraphBuilder: Send + Sync {
    /// Ask a question; returns the raw answer text
    async fn chat(&self, question: &str, session_id: &str, mode: &str) -> Result<String>;

    /// Upload a document and run entity extraction on it
    async fn index_document(&self, file_name: &str, content: Vec<u8>) -> Result<()>;

    /// Remove a document and the entities extracted from it
    async fn delete_document(&self, file_name: &str) -> Result<()>;
}

/// HTTP client for the graph builder API
pub struct GraphBuilderClient {
    base_url: String,
    config: GraphBuilderConfig,
    client: reqwest::Client,
}

impl GraphBuilderClient {
    /// Build a client; `None` when no base URL is configured
    pub fn from_config(config: &GraphBuilderConfig) -> Result<Option<Self>> {
        let Some(base_url) = config.base_url.as_deref() else {
            return Ok(None);
        };
        let client = http_client(config.timeout_secs, None)?;
        Ok(Some(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            config: config.clone(),
            client,
        }))
    }

    fn connection(&self) -> Vec<(&'static str, String)> {
        vec![
            ("uri", self.config.neo4j_uri.clone()),
            ("userName", self.config.neo4j_username.clone()),
            ("password", self.config.neo4j_password.clone()),
            ("database", self.config.neo4j_database.clone()),
            ("model", self.config.model.clone()),
        ]
    }

    async fn post_form(&self, path: &str, form: Vec<(&'static str, String)>) -> Result<GraphResponse> {
        let url = format!("{}/{}", self.base_url, path);
        let start = Instant::now();
        let result = self.send(self.client.post(&url).form(&form)).await;
        metrics::record_external(SERVICE, result.is_ok(), start.elapsed());
        result
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<GraphResponse> {
        let response = request.send().await.map_err(|e| transport_error(SERVICE, e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::external(SERVICE, format!("HTTP {}: {}", status, body)));
        }

        response.json().await.map_err(|e| AppError::ExternalFormat {
            message: format!("Failed to parse graph builder response: {}", e),
        })
    }

    async fn upload(&self, file_name: &str, content: Vec<u8>) -> Result<()> {
        let part = multipart::Part::bytes(content)
            .file_name(file_name.to_string())
            .mime_str("text/plain")
            .map_err(|e| AppError::Internal {
                message: format!("Invalid upload part: {}", e),
            })?;

        let mut form = multipart::Form::new()
            .part("file", part)
            .text("chunkNumber", "1")
            .text("totalChunks", "1")
            .text("originalname", file_name.to_string());
        for (key, value) in self.connection() {
            form = form.text(key, value);
        }

        let url = format!("{}/upload", self.base_url);
        let start = Instant::now();
        let result = self.send(self.client.post(&url).multipart(form)).await;
        metrics::record_external(SERVICE, result.is_ok(), start.elapsed());
        result?.into_result("upload")?;
        Ok(())
    }

    async fn extract(&self, file_name: &str) -> Result<()> {
        let mut form = self.connection();
        form.push(("file_name", file_name.to_string()));
        form.push(("source_type", LOCAL_SOURCE.to_string()));
        form.push(("allowedNodes", ALLOWED_NODES.join(",")));
        form.push(("allowedRelationship", ALLOWED_RELATIONSHIPS.join(",")));

        self.post_form("extract", form).await?.into_result("extract")?;
        Ok(())
    }
}

#[async_trait]
impl GraphBuilder for GraphBuilderClient {
    async fn chat(&self, question: &str, session_id: &str, mode: &str) -> Result<String> {
        let mut form = self.connection();
        form.push(("question", question.to_string()));
        form.push(("session_id", session_id.to_string()));
        form.push(("mode", mode.to_string()));
        form.push(("document_names", "[]".to_string()));

        let data = self.post_form("chat_bot", form).await?.into_result("chat_bot")?;
        let answer = answer_text(&data).ok_or_else(|| AppError::ExternalFormat {
            message: "Chat response contained no answer".to_string(),
        })?;

        debug!(session_id, chars = answer.len(), "Graph builder answered");
        Ok(answer.to_string())
    }

    async fn index_document(&self, file_name: &str, content: Vec<u8>) -> Result<()> {
        self.upload(file_name, content).await?;
        self.extract(file_name).await?;
        info!(file_name, "Document indexed in graph");
        Ok(())
    }

    async fn delete_document(&self, file_name: &str) -> Result<()> {
        let mut form = self.connection();
        form.push(("filenames", serde_json::to_string(&[file_name])?));
        form.push(("source_types", serde_json::to_string(&[LOCAL_SOURCE])?));
        form.push(("deleteEntities", "true".to_string()));

        match self
            .post_form("delete_document_and_entities", form)
            .await
            .and_then(|r| r.into_result("delete_document_and_entities"))
        {
            Ok(_) => {
                info!(file_name, "Document removed from graph");
                Ok(())
            }
            Err(e) => {
                warn!(file_name, error = %e, "Graph document removal failed");
                Err(e)
            }
        }
    }
}
