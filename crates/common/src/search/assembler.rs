//! Result assembly
//!
//! Attaches relations to page rows and wraps them in the listing envelope.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::executor::Page;
use crate::db::models::{Article, ArticleMetrics, Citation, Keyword, Topic};
use crate::db::ArticleStore;
use crate::errors::Result;

/// Informational message carried by an empty listing
pub const EMPTY_RESULT_MESSAGE: &str = "No articles found";

/// Relations attached beyond topics, which are always present
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Include {
    pub citations: bool,
    pub keywords: bool,
    pub metrics: bool,
}

impl Include {
    /// Listing rows: topics only
    pub const fn list() -> Self {
        Self {
            citations: false,
            keywords: false,
            metrics: false,
        }
    }

    /// Single-article fetch: every relation
    pub const fn detail() -> Self {
        Self {
            citations: true,
            keywords: true,
            metrics: true,
        }
    }
}

/// An article as returned by the API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleView {
    #[serde(flatten)]
    pub article: Article,
    pub topics: Vec<Topic>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub citations_made: Option<Vec<Citation>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub citations_received: Option<Vec<Citation>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keywords: Option<Vec<Keyword>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<ArticleMetrics>,
    /// Per-article answer text from advanced search
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_resume: Option<String>,
}

/// Listing response envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleListResponse {
    pub data: Vec<ArticleView>,
    pub page: u64,
    pub page_size: u64,
    pub total: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl From<Page<ArticleView>> for ArticleListResponse {
    fn from(page: Page<ArticleView>) -> Self {
        let message = page.is_empty().then(|| EMPTY_RESULT_MESSAGE.to_string());
        Self {
            data: page.rows,
            page: page.page,
            page_size: page.page_size,
            total: page.total,
            message,
        }
    }
}

/// Attach relations to each row, preserving row order
pub async fn attach_relations(
    store: &dyn ArticleStore,
    rows: Vec<Article>,
    include: Include,
) -> Result<Vec<ArticleView>> {
    let ids: Vec<String> = rows.iter().map(|a| a.id.clone()).collect();
    let mut topics = store.topics_for(&ids).await?;
    let mut keywords = if include.keywords {
        store.keywords_for(&ids).await?
    } else {
        HashMap::new()
    };

    let mut views = Vec::with_capacity(rows.len());
    for article in rows {
        let (citations_made, citations_received) = if include.citations {
            let set = store.citations_for(&article.id).await?;
            (Some(set.made), Some(set.received))
        } else {
            (None, None)
        };
        let metrics = if include.metrics {
            store.metrics_for(&article.id).await?
        } else {
            None
        };

        views.push(ArticleView {
            topics: topics.remove(&article.id).unwrap_or_default(),
            keywords: include
                .keywords
                .then(|| keywords.remove(&article.id).unwrap_or_default()),
            citations_made,
            citations_received,
            metrics,
            ai_resume: None,
            article,
        });
    }
    Ok(views)
}

/// Wrap an executed page into the listing envelope
pub async fn assemble_page(
    store: &dyn ArticleStore,
    page: Page<Article>,
    include: Include,
) -> Result<ArticleListResponse> {
    let Page {
        rows,
        page,
        page_size,
        total,
    } = page;
    let views = attach_relations(store, rows, include).await?;
    Ok(Page {
        rows: views,
        page,
        page_size,
        total,
    }
    .into())
}

/// Single-row fetch shared by the detail endpoint and advanced search
pub async fn fetch_article(
    store: &dyn ArticleStore,
    id: &str,
    include: Include,
) -> Result<Option<ArticleView>> {
    let Some(article) = store.find_by_id(id).await? else {
        return Ok(None);
    };
    let mut views = attach_relations(store, vec![article], include).await?;
    Ok(views.pop())
}
