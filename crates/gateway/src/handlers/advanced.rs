//! Advanced (AI) search handler

use axum::{extract::State, Json};
use serde::Deserialize;

use crate::extract::AppJson;
use crate::state::AppState;
use articlehub_common::{errors::Result, search::ArticleView};

#[derive(Debug, Deserialize)]
pub struct AdvancedSearchRequest {
    #[serde(default)]
    pub query: String,
}

/// Answer a free-text question with stored articles, each carrying `aiResume`
pub async fn advanced_search(
    State(state): State<AppState>,
    AppJson(request): AppJson<AdvancedSearchRequest>,
) -> Result<Json<Vec<ArticleView>>> {
    Ok(Json(state.advanced.search(&request.query).await?))
}
