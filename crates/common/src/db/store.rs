//! Storage seam for articles and their relations
//!
//! Everything above the storage layer talks to an [`ArticleStore`]. The SeaORM
//! [`Repository`](super::Repository) backs it with Postgres; [`MemoryStore`](super::MemoryStore)
//! keeps the same contract in-process for local runs and tests.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::models::{Article, ArticleMetrics, ArticleStatus, Citation, Keyword, Topic};
use crate::errors::{AppError, Result};
use crate::search::{Predicate, SortSpec};

/// Article submitted for creation, either directly or by the import pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewArticle {
    pub id: String,
    pub title: String,
    #[serde(rename = "abstract", default)]
    pub abstract_text: String,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub institutions: Vec<String>,
    #[serde(default)]
    pub volume: Option<String>,
    #[serde(default)]
    pub issue: Option<String>,
    #[serde(default)]
    pub publication_year: Option<i32>,
    #[serde(default)]
    pub publication_type: Option<String>,
    #[serde(default)]
    pub journal_name: Option<String>,
    #[serde(default)]
    pub publisher_name: Option<String>,
    #[serde(default)]
    pub doi: Option<String>,
    #[serde(default)]
    pub issn: Option<String>,
    #[serde(default = "default_status")]
    pub status: ArticleStatus,
    #[serde(default)]
    pub is_open_access: bool,
    #[serde(default)]
    pub peer_reviewed: bool,
    /// Topic names; unknown names are created, known ones reused
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub citations: Vec<NewCitation>,
}

fn default_status() -> ArticleStatus {
    ArticleStatus::Published
}

impl NewArticle {
    /// Minimal article with defaults for every optional attribute
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            abstract_text: String::new(),
            language: String::new(),
            authors: Vec::new(),
            institutions: Vec::new(),
            volume: None,
            issue: None,
            publication_year: None,
            publication_type: None,
            journal_name: None,
            publisher_name: None,
            doi: None,
            issn: None,
            status: default_status(),
            is_open_access: false,
            peer_reviewed: false,
            topics: Vec::new(),
            keywords: Vec::new(),
            citations: Vec::new(),
        }
    }

    /// Reject submissions missing their identity
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(AppError::MissingField { field: "id".into() });
        }
        if self.title.trim().is_empty() {
            return Err(AppError::MissingField { field: "title".into() });
        }
        Ok(())
    }

    /// Topic names trimmed and deduplicated case-insensitively, first spelling wins
    pub fn topic_names(&self) -> Vec<String> {
        dedup_names(&self.topics)
    }

    pub fn keyword_names(&self) -> Vec<String> {
        dedup_names(&self.keywords)
    }
}

pub(crate) fn dedup_names(names: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    names
        .iter()
        .map(|n| n.trim())
        .filter(|n| !n.is_empty())
        .filter(|n| seen.insert(n.to_lowercase()))
        .map(str::to_string)
        .collect()
}

/// Outgoing reference of a new article
///
/// `cited_article_id` is set when the cited work is itself stored; otherwise the
/// bibliographic fields describe the external record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NewCitation {
    pub cited_article_id: Option<String>,
    /// Source identifier of the cited work; used to link it when that work is stored
    pub work_id: Option<String>,
    pub title: Option<String>,
    pub authors: Vec<String>,
    pub journal: Option<String>,
    pub volume: Option<String>,
    pub issue: Option<String>,
    pub pages: Option<String>,
    pub year: Option<i32>,
    pub doi: Option<String>,
    pub url: Option<String>,
}

impl NewCitation {
    /// Internal references carry no bibliographic copy
    pub fn normalized(self) -> Self {
        if self.cited_article_id.is_some() {
            NewCitation {
                cited_article_id: self.cited_article_id,
                ..Default::default()
            }
        } else {
            self
        }
    }
}

/// Partial update of an existing article; absent fields are left unchanged
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ArticleUpdate {
    pub title: Option<String>,
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    pub language: Option<String>,
    pub authors: Option<Vec<String>>,
    pub institutions: Option<Vec<String>>,
    pub volume: Option<String>,
    pub issue: Option<String>,
    pub publication_year: Option<i32>,
    pub publication_type: Option<String>,
    pub journal_name: Option<String>,
    pub publisher_name: Option<String>,
    pub doi: Option<String>,
    pub issn: Option<String>,
    pub status: Option<ArticleStatus>,
    pub is_open_access: Option<bool>,
    pub peer_reviewed: Option<bool>,
    /// Replaces the full topic set when present
    pub topics: Option<Vec<String>>,
}

impl ArticleUpdate {
    pub fn is_empty(&self) -> bool {
        *self == ArticleUpdate::default()
    }

    /// Apply the scalar fields onto a loaded article
    pub fn apply_to(&self, article: &mut Article) {
        if let Some(v) = &self.title {
            article.title = v.clone();
        }
        if let Some(v) = &self.abstract_text {
            article.abstract_text = v.clone();
        }
        if let Some(v) = &self.language {
            article.language = v.clone();
        }
        if let Some(v) = &self.authors {
            article.authors = v.clone();
        }
        if let Some(v) = &self.institutions {
            article.institutions = v.clone();
        }
        if let Some(v) = &self.volume {
            article.volume = Some(v.clone());
        }
        if let Some(v) = &self.issue {
            article.issue = Some(v.clone());
        }
        if let Some(v) = self.publication_year {
            article.publication_year = Some(v);
        }
        if let Some(v) = &self.publication_type {
            article.publication_type = Some(v.clone());
        }
        if let Some(v) = &self.journal_name {
            article.journal_name = Some(v.clone());
        }
        if let Some(v) = &self.publisher_name {
            article.publisher_name = Some(v.clone());
        }
        if let Some(v) = &self.doi {
            article.doi = Some(v.clone());
        }
        if let Some(v) = &self.issn {
            article.issn = Some(v.clone());
        }
        if let Some(v) = self.status {
            article.status = v.into();
        }
        if let Some(v) = self.is_open_access {
            article.is_open_access = v;
        }
        if let Some(v) = self.peer_reviewed {
            article.peer_reviewed = v;
        }
    }
}

/// Counter values to store; absent fields keep their current value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase", default)]
pub struct MetricsUpdate {
    #[validate(range(min = 0, message = "citations must not be negative"))]
    pub citations: Option<i32>,
    #[validate(range(min = 0, message = "views must not be negative"))]
    pub views: Option<i32>,
    #[validate(range(min = 0, message = "downloads must not be negative"))]
    pub downloads: Option<i32>,
    pub altmetric_score: Option<f64>,
}

impl MetricsUpdate {
    pub fn validate(&self) -> Result<()> {
        Validate::validate(self).map_err(AppError::from)
    }
}

/// Citations grouped by direction relative to one article
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CitationSet {
    pub made: Vec<Citation>,
    pub received: Vec<Citation>,
}

/// Distinct values currently present, for populating filter controls
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterOptions {
    pub topics: Vec<String>,
    pub languages: Vec<String>,
    pub publication_types: Vec<String>,
    pub statuses: Vec<String>,
    pub journal_names: Vec<String>,
}

/// Article persistence operations
#[async_trait]
pub trait ArticleStore: Send + Sync {
    /// Backend label used in logs and health output
    fn backend(&self) -> &'static str;

    async fn ping(&self) -> Result<()>;

    /// Rows matching `predicate`, ignoring pagination
    async fn count(&self, predicate: &Predicate) -> Result<u64>;

    /// Page window ordered by `sort`, ties broken by ascending id
    async fn find_page(
        &self,
        predicate: &Predicate,
        sort: SortSpec,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<Article>>;

    async fn find_by_id(&self, id: &str) -> Result<Option<Article>>;

    async fn exists(&self, id: &str) -> Result<bool>;

    /// Topics keyed by article id; articles without topics are absent from the map
    async fn topics_for(&self, article_ids: &[String]) -> Result<HashMap<String, Vec<Topic>>>;

    async fn keywords_for(&self, article_ids: &[String]) -> Result<HashMap<String, Vec<Keyword>>>;

    async fn citations_for(&self, article_id: &str) -> Result<CitationSet>;

    async fn metrics_for(&self, article_id: &str) -> Result<Option<ArticleMetrics>>;

    /// Insert an article with its topics, keywords and citations as one unit.
    /// Fails with `ArticleExists` when the id is taken, writing nothing.
    async fn create_article(&self, article: NewArticle) -> Result<Article>;

    async fn update_article(&self, id: &str, update: ArticleUpdate) -> Result<Article>;

    /// Upsert the metrics row of an existing article
    async fn update_metrics(&self, id: &str, update: MetricsUpdate) -> Result<ArticleMetrics>;

    /// Remove citations in both directions, topic and keyword links, metrics and the
    /// article row atomically. Returns false when no such article exists.
    async fn delete_article(&self, id: &str) -> Result<bool>;

    async fn filter_options(&self) -> Result<FilterOptions>;
}
