//! Abstract summary generation

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::extract::AppJson;
use crate::state::AppState;
use articlehub_common::errors::Result;

#[derive(Debug, Deserialize)]
pub struct SummaryRequest {
    #[serde(rename = "abstract", default)]
    pub abstract_text: String,
}

#[derive(Serialize)]
pub struct SummaryResponse {
    pub summary: String,
}

pub async fn generate_summary(
    State(state): State<AppState>,
    AppJson(request): AppJson<SummaryRequest>,
) -> Result<Json<SummaryResponse>> {
    let summary = state.articles.summarize(&request.abstract_text).await?;
    Ok(Json(SummaryResponse { summary }))
}
