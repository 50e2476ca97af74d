//! DOI resolution and Altmetric lookups

use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::state::AppState;
use articlehub_common::errors::{AppError, Result};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DoiQuery {
    pub doi: Option<String>,
    /// When set, the Altmetric score is stored on this article's metrics
    pub article_id: Option<String>,
}

impl DoiQuery {
    fn doi(&self) -> Result<&str> {
        self.doi
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .ok_or_else(|| AppError::validation("doi", "DOI parameter is required"))
    }
}

#[derive(Serialize)]
pub struct ResolveResponse {
    pub url: String,
}

fn unresolved(doi: &str) -> AppError {
    AppError::NotFound {
        resource_type: "doi".to_string(),
        id: doi.to_string(),
    }
}

/// Altmetric details for a DOI
pub async fn doi_info(
    State(state): State<AppState>,
    Query(query): Query<DoiQuery>,
) -> Result<Json<Value>> {
    let doi = query.doi()?;
    let details = state.doi.altmetric(doi).await?.ok_or_else(|| unresolved(doi))?;

    if let Some(article_id) = query.article_id.as_deref() {
        let metrics = state.articles.apply_altmetric(article_id, &details).await?;
        tracing::info!(article_id, score = ?metrics.altmetric_score, "Altmetric score stored");
    }
    Ok(Json(details))
}

/// Landing page URL for a DOI
pub async fn resolve_doi(
    State(state): State<AppState>,
    Query(query): Query<DoiQuery>,
) -> Result<Json<ResolveResponse>> {
    let doi = query.doi()?;
    let url = state.doi.resolve_url(doi).await?.ok_or_else(|| unresolved(doi))?;
    Ok(Json(ResolveResponse { url }))
}
