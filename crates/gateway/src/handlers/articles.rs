//! Article listing, fetch and lifecycle handlers

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::extract::AppJson;
use crate::state::AppState;
use articlehub_common::{
    db::{models::ArticleMetrics, ArticleUpdate, FilterOptions, MetricsUpdate, NewArticle},
    errors::{AppError, Result},
    import::ImportOutcome,
    search::{fetch_article, search_articles, ArticleListResponse, ArticleView, Include, RawParams},
};

/// Body of `POST /articles`: an import by site id or a full article
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateArticleRequest {
    #[serde(default)]
    pub site_id: Option<String>,
    #[serde(default)]
    pub article: Option<NewArticle>,
}

#[derive(Serialize)]
pub struct ImportResponse {
    pub message: &'static str,
    #[serde(flatten)]
    pub outcome: ImportOutcome,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResponse {
    pub message: &'static str,
    pub llm_cleanup_success: bool,
}

/// List articles matching the query-string filters
pub async fn list_articles(
    State(state): State<AppState>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Json<ArticleListResponse>> {
    let params: RawParams = pairs.into_iter().collect();
    let response = search_articles(state.store.as_ref(), &params).await?;
    Ok(Json(response))
}

/// Import from the scraping source, or store a submitted article
pub async fn create_article(
    State(state): State<AppState>,
    AppJson(request): AppJson<CreateArticleRequest>,
) -> Result<Json<ImportResponse>> {
    let site_id = request.site_id.filter(|s| !s.trim().is_empty());
    let outcome = match (site_id, request.article) {
        (Some(site_id), _) => state.articles.import(&site_id).await?,
        (None, Some(article)) => state.articles.create(article).await?,
        (None, None) => return Err(AppError::validation("siteId", "siteId is required")),
    };

    Ok(Json(ImportResponse {
        message: "Article saved successfully",
        outcome,
    }))
}

/// Get one article with topics, citations, keywords and metrics
pub async fn get_article(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ArticleView>> {
    let view = fetch_article(state.store.as_ref(), &id, Include::detail()).await?;
    view.map(Json).ok_or(AppError::ArticleNotFound { id })
}

pub async fn update_article(
    State(state): State<AppState>,
    Path(id): Path<String>,
    AppJson(update): AppJson<ArticleUpdate>,
) -> Result<Json<ArticleView>> {
    let view = state.articles.update(&id, update).await?;
    tracing::info!(article_id = %id, "Article updated");
    Ok(Json(view))
}

pub async fn update_metrics(
    State(state): State<AppState>,
    Path(id): Path<String>,
    AppJson(update): AppJson<MetricsUpdate>,
) -> Result<Json<ArticleMetrics>> {
    Ok(Json(state.articles.update_metrics(&id, update).await?))
}

/// Cascading delete; the flag reports the graph index cleanup
pub async fn delete_article(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeleteResponse>> {
    let outcome = state.articles.delete(&id).await?;
    Ok(Json(DeleteResponse {
        message: "Article and related data deleted successfully",
        llm_cleanup_success: outcome.llm_cleanup_success,
    }))
}

/// Distinct values for the filter sidebar
pub async fn filter_options(State(state): State<AppState>) -> Result<Json<FilterOptions>> {
    Ok(Json(state.store.filter_options().await?))
}
