//! Article import and lifecycle
//!
//! Everything that changes the catalogue goes through [`ArticleService`]: imports from
//! the scraping source, direct submissions, updates and the cascading delete. The graph
//! index is kept in step where configured.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::clients::{abstract_summary_prompt, ArticleSource, CompletionClient, GraphBuilder};
use crate::config::{CleanupPolicy, GraphBuilderConfig};
use crate::db::models::{document_name, ArticleMetrics};
use crate::db::{ArticleStore, ArticleUpdate, MetricsUpdate, NewArticle, NewCitation};
use crate::errors::{AppError, Result};
use crate::metrics;
use crate::search::{fetch_article, ArticleView, Include};

/// Upper bound on generated abstract summaries, in characters
pub const SUMMARY_MAX_CHARS: usize = 250;

/// Stored article plus the indexing outcome
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportOutcome {
    pub article: ArticleView,
    pub graph_indexed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteOutcome {
    pub llm_cleanup_success: bool,
}

/// Plain-text rendering indexed by the graph builder
pub fn render_document(article: &NewArticle) -> String {
    let mut lines = vec![format!("Title: {}", article.title)];
    if !article.authors.is_empty() {
        lines.push(format!("Authors: {}", article.authors.join(", ")));
    }
    if !article.institutions.is_empty() {
        lines.push(format!("Institutions: {}", article.institutions.join(", ")));
    }
    if let Some(journal) = &article.journal_name {
        lines.push(format!("Journal: {}", journal));
    }
    if let Some(year) = article.publication_year {
        lines.push(format!("Year: {}", year));
    }
    if let Some(doi) = &article.doi {
        lines.push(format!("DOI: {}", doi));
    }
    if !article.language.is_empty() {
        lines.push(format!("Language: {}", article.language));
    }
    let topics = article.topic_names();
    if !topics.is_empty() {
        lines.push(format!("Topics: {}", topics.join(", ")));
    }
    let keywords = article.keyword_names();
    if !keywords.is_empty() {
        lines.push(format!("Keywords: {}", keywords.join(", ")));
    }
    lines.push(format!("Article identifier: {}", article.id));
    lines.push(String::new());
    lines.push(article.abstract_text.clone());
    lines.join("\n")
}

/// Cut a summary to [`SUMMARY_MAX_CHARS`] on a char boundary
fn clamp_summary(text: &str) -> String {
    let text = text.trim();
    match text.char_indices().nth(SUMMARY_MAX_CHARS) {
        Some((cut, _)) => text[..cut].trim_end().to_string(),
        None => text.to_string(),
    }
}

/// Write-side operations on the catalogue
pub struct ArticleService {
    store: Arc<dyn ArticleStore>,
    source: Arc<dyn ArticleSource>,
    graph: Option<Arc<dyn GraphBuilder>>,
    completion: Arc<dyn CompletionClient>,
    index_on_import: bool,
    cleanup_policy: CleanupPolicy,
}

impl ArticleService {
    pub fn new(
        store: Arc<dyn ArticleStore>,
        source: Arc<dyn ArticleSource>,
        graph: Option<Arc<dyn GraphBuilder>>,
        completion: Arc<dyn CompletionClient>,
        config: &GraphBuilderConfig,
    ) -> Self {
        Self {
            store,
            source,
            graph,
            completion,
            index_on_import: config.index_on_import,
            cleanup_policy: config.cleanup_policy,
        }
    }

    /// Import an article from the scraping source by its site id
    #[instrument(skip(self))]
    pub async fn import(&self, site_id: &str) -> Result<ImportOutcome> {
        let start = Instant::now();
        let site_id = site_id.trim();
        if site_id.is_empty() {
            return Err(AppError::validation("siteId", "siteId is required"));
        }

        if self.store.exists(site_id).await? {
            metrics::record_import("duplicate", start.elapsed());
            return Err(AppError::ArticleExists { id: site_id.to_string() });
        }

        let scraped = match self.source.fetch_article(site_id).await {
            Ok(article) => article,
            Err(e) => {
                metrics::record_import("error", start.elapsed());
                return Err(e);
            }
        };

        let result = self.persist(scraped).await;
        metrics::record_import(
            match &result {
                Ok(_) => "imported",
                Err(AppError::ArticleExists { .. }) => "duplicate",
                Err(_) => "error",
            },
            start.elapsed(),
        );
        if let Ok(outcome) = &result {
            info!(
                article_id = %outcome.article.article.id,
                graph_indexed = outcome.graph_indexed,
                duration_ms = start.elapsed().as_millis() as u64,
                "Article imported"
            );
        }
        result
    }

    /// Store a directly submitted article
    #[instrument(skip(self, article), fields(article_id = %article.id))]
    pub async fn create(&self, article: NewArticle) -> Result<ImportOutcome> {
        article.validate()?;
        let outcome = self.persist(article).await?;
        info!(graph_indexed = outcome.graph_indexed, "Article created");
        Ok(outcome)
    }

    async fn persist(&self, mut article: NewArticle) -> Result<ImportOutcome> {
        article.citations = self.link_citations(std::mem::take(&mut article.citations)).await?;
        let document = render_document(&article);

        let stored = self.store.create_article(article).await?;
        let graph_indexed = self.index(&stored.id, document).await;

        let article = fetch_article(self.store.as_ref(), &stored.id, Include::detail())
            .await?
            .ok_or_else(|| AppError::Internal {
                message: format!("Article {} missing after insert", stored.id),
            })?;
        Ok(ImportOutcome { article, graph_indexed })
    }

    /// Point references at stored articles where the cited work is already present
    async fn link_citations(&self, citations: Vec<NewCitation>) -> Result<Vec<NewCitation>> {
        let mut linked = Vec::with_capacity(citations.len());
        for mut citation in citations {
            if citation.cited_article_id.is_none() {
                if let Some(work_id) = citation.work_id.as_deref() {
                    if self.store.exists(work_id).await? {
                        citation.cited_article_id = Some(work_id.to_string());
                    }
                }
            }
            linked.push(citation.normalized());
        }
        Ok(linked)
    }

    /// Upload the document to the graph index; failures only downgrade the outcome
    async fn index(&self, article_id: &str, document: String) -> bool {
        let Some(graph) = self.graph.as_ref().filter(|_| self.index_on_import) else {
            return false;
        };
        match graph
            .index_document(&document_name(article_id), document.into_bytes())
            .await
        {
            Ok(()) => true,
            Err(e) => {
                warn!(article_id, error = %e, "Graph indexing failed; article kept");
                false
            }
        }
    }

    #[instrument(skip(self, update))]
    pub async fn update(&self, id: &str, update: ArticleUpdate) -> Result<ArticleView> {
        if update.is_empty() {
            return Err(AppError::validation("body", "No fields to update"));
        }
        if update.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
            return Err(AppError::validation("title", "title must not be empty"));
        }
        self.store.update_article(id, update).await?;
        fetch_article(self.store.as_ref(), id, Include::detail())
            .await?
            .ok_or_else(|| AppError::ArticleNotFound { id: id.to_string() })
    }

    pub async fn update_metrics(&self, id: &str, update: MetricsUpdate) -> Result<ArticleMetrics> {
        update.validate()?;
        self.store.update_metrics(id, update).await
    }

    /// Store the Altmetric score from a details payload on the article's metrics
    pub async fn apply_altmetric(&self, id: &str, details: &Value) -> Result<ArticleMetrics> {
        let score = details
            .get("score")
            .and_then(Value::as_f64)
            .ok_or_else(|| AppError::ExternalFormat {
                message: "Altmetric details carry no score".to_string(),
            })?;
        self.update_metrics(
            id,
            MetricsUpdate {
                altmetric_score: Some(score),
                ..Default::default()
            },
        )
        .await
    }

    /// Cascading delete, with graph cleanup ordered by the configured policy
    #[instrument(skip(self))]
    pub async fn delete(&self, id: &str) -> Result<DeleteOutcome> {
        if !self.store.exists(id).await? {
            return Err(AppError::ArticleNotFound { id: id.to_string() });
        }

        let llm_cleanup_success = match self.cleanup_policy {
            CleanupPolicy::Required => {
                self.clean_graph(id).await?;
                self.delete_row(id).await?;
                true
            }
            CleanupPolicy::BestEffort => {
                self.delete_row(id).await?;
                match self.clean_graph(id).await {
                    Ok(()) => true,
                    Err(e) => {
                        warn!(article_id = id, error = %e, "Graph cleanup failed after delete");
                        false
                    }
                }
            }
        };

        metrics::record_delete(llm_cleanup_success);
        info!(llm_cleanup_success, "Article deleted");
        Ok(DeleteOutcome { llm_cleanup_success })
    }

    async fn delete_row(&self, id: &str) -> Result<()> {
        if self.store.delete_article(id).await? {
            Ok(())
        } else {
            Err(AppError::ArticleNotFound { id: id.to_string() })
        }
    }

    /// Nothing to clean when no graph builder is configured
    async fn clean_graph(&self, id: &str) -> Result<()> {
        match &self.graph {
            Some(graph) => graph.delete_document(&document_name(id)).await,
            None => Ok(()),
        }
    }

    /// Short summary of an abstract via the completion service
    pub async fn summarize(&self, abstract_text: &str) -> Result<String> {
        if abstract_text.trim().is_empty() {
            return Err(AppError::validation("abstract", "abstract is required"));
        }
        let reply = self
            .completion
            .complete(&abstract_summary_prompt(abstract_text.trim()))
            .await?;
        Ok(clamp_summary(&reply))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::MockCompletion;
    use crate::db::MemoryStore;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;
    use tokio_test::{assert_err, assert_ok};

    struct FakeSource;

    #[async_trait]
    impl ArticleSource for FakeSource {
        async fn fetch_article(&self, source_id: &str) -> Result<NewArticle> {
            if source_id == "broken" {
                return Err(AppError::external("capes", "HTTP 500"));
            }
            let mut article = NewArticle::new(source_id, format!("Scraped {}", source_id));
            article.topics = vec!["Ecology".into()];
            article.citations = vec![
                NewCitation {
                    work_id: Some("W1".into()),
                    title: Some("Stored work".into()),
                    ..Default::default()
                },
                NewCitation {
                    work_id: Some("W999".into()),
                    title: Some("External work".into()),
                    ..Default::default()
                },
            ];
            Ok(article)
        }
    }

    #[derive(Default)]
    struct FakeGraph {
        fail: bool,
        indexed: Mutex<Vec<(String, String)>>,
        deleted: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl GraphBuilder for FakeGraph {
        async fn chat(&self, _question: &str, _session_id: &str, _mode: &str) -> Result<String> {
            Ok("{}".into())
        }

        async fn index_document(&self, file_name: &str, content: Vec<u8>) -> Result<()> {
            if self.fail {
                return Err(AppError::external("graph_builder", "upload failed"));
            }
            let text = String::from_utf8(content).unwrap();
            self.indexed.lock().unwrap().push((file_name.to_string(), text));
            Ok(())
        }

        async fn delete_document(&self, file_name: &str) -> Result<()> {
            if self.fail {
                return Err(AppError::external("graph_builder", "delete failed"));
            }
            self.deleted.lock().unwrap().push(file_name.to_string());
            Ok(())
        }
    }

    async fn store_with_w1() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store.create_article(NewArticle::new("W1", "Stored work")).await.unwrap();
        store
    }

    fn service(
        store: Arc<MemoryStore>,
        graph: Option<Arc<FakeGraph>>,
        cleanup_policy: CleanupPolicy,
    ) -> ArticleService {
        let config = GraphBuilderConfig {
            cleanup_policy,
            ..Default::default()
        };
        ArticleService::new(
            store,
            Arc::new(FakeSource),
            graph.map(|g| g as Arc<dyn GraphBuilder>),
            Arc::new(MockCompletion),
            &config,
        )
    }

    #[tokio::test]
    async fn test_import_links_stored_citations_and_indexes() {
        let store = store_with_w1().await;
        let graph = Arc::new(FakeGraph::default());
        let svc = service(store.clone(), Some(graph.clone()), CleanupPolicy::BestEffort);

        let outcome = svc.import("W2").await.unwrap();
        assert!(outcome.graph_indexed);
        assert_eq!(outcome.article.topics[0].name, "Ecology");

        let made = outcome.article.citations_made.unwrap();
        assert_eq!(made.len(), 2);
        assert!(made.iter().any(|c| c.cited_article_id.as_deref() == Some("W1")));

        let received = store.citations_for("W1").await.unwrap().received;
        assert_eq!(received.len(), 1);

        let indexed = graph.indexed.lock().unwrap();
        assert_eq!(indexed[0].0, "W2.txt");
        assert!(indexed[0].1.starts_with("Title: Scraped W2"));
    }

    #[tokio::test]
    async fn test_import_of_existing_id_writes_nothing() {
        let store = store_with_w1().await;
        let svc = service(store.clone(), None, CleanupPolicy::BestEffort);

        let err = assert_err!(svc.import("W1").await);
        assert!(matches!(err, AppError::ArticleExists { .. }));
        assert_eq!(err.status_code(), axum::http::StatusCode::BAD_REQUEST);

        let citations = store.citations_for("W1").await.unwrap();
        assert!(citations.made.is_empty());
        assert!(citations.received.is_empty());
    }

    #[tokio::test]
    async fn test_import_validates_and_surfaces_source_errors() {
        let svc = service(store_with_w1().await, None, CleanupPolicy::BestEffort);
        assert!(matches!(svc.import("  ").await, Err(AppError::Validation { .. })));
        assert!(matches!(svc.import("broken").await, Err(AppError::ExternalService { .. })));
    }

    #[tokio::test]
    async fn test_indexing_failure_keeps_article() {
        let store = store_with_w1().await;
        let graph = Arc::new(FakeGraph { fail: true, ..Default::default() });
        let svc = service(store.clone(), Some(graph), CleanupPolicy::BestEffort);

        let outcome = svc.import("W2").await.unwrap();
        assert!(!outcome.graph_indexed);
        assert!(store.exists("W2").await.unwrap());
    }

    #[tokio::test]
    async fn test_create_rejects_duplicates() {
        let svc = service(store_with_w1().await, None, CleanupPolicy::BestEffort);
        let err = svc.create(NewArticle::new("W1", "Again")).await.unwrap_err();
        assert!(matches!(err, AppError::ArticleExists { .. }));

        let err = svc.create(NewArticle::new("W3", " ")).await.unwrap_err();
        assert!(matches!(err, AppError::MissingField { .. }));
    }

    #[tokio::test]
    async fn test_best_effort_delete_reports_cleanup_failure() {
        let store = store_with_w1().await;
        let graph = Arc::new(FakeGraph { fail: true, ..Default::default() });
        let svc = service(store.clone(), Some(graph), CleanupPolicy::BestEffort);

        let outcome = svc.delete("W1").await.unwrap();
        assert!(!outcome.llm_cleanup_success);
        assert!(!store.exists("W1").await.unwrap());
    }

    #[tokio::test]
    async fn test_required_cleanup_failure_keeps_row() {
        let store = store_with_w1().await;
        let graph = Arc::new(FakeGraph { fail: true, ..Default::default() });
        let svc = service(store.clone(), Some(graph), CleanupPolicy::Required);

        let err = assert_err!(svc.delete("W1").await);
        assert!(err.is_server_error());
        assert!(store.exists("W1").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_cleans_graph_document() {
        let store = store_with_w1().await;
        let graph = Arc::new(FakeGraph::default());
        let svc = service(store.clone(), Some(graph.clone()), CleanupPolicy::Required);

        let outcome = assert_ok!(svc.delete("W1").await);
        assert!(outcome.llm_cleanup_success);
        assert_eq!(graph.deleted.lock().unwrap().as_slice(), ["W1.txt"]);
        assert!(matches!(svc.delete("W1").await, Err(AppError::ArticleNotFound { .. })));
    }

    #[tokio::test]
    async fn test_update_and_metrics() {
        let store = store_with_w1().await;
        let svc = service(store, None, CleanupPolicy::BestEffort);

        assert!(svc.update("W1", ArticleUpdate::default()).await.is_err());
        let view = svc
            .update(
                "W1",
                ArticleUpdate {
                    language: Some("pt".into()),
                    topics: Some(vec!["Soil".into()]),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(view.article.language, "pt");
        assert_eq!(view.topics[0].name, "Soil");

        let metrics = svc.apply_altmetric("W1", &json!({ "score": 12.5 })).await.unwrap();
        assert_eq!(metrics.altmetric_score, Some(12.5));
        assert!(svc.apply_altmetric("W1", &json!({})).await.is_err());

        let bad = MetricsUpdate { views: Some(-1), ..Default::default() };
        assert!(svc.update_metrics("W1", bad).await.is_err());
    }

    #[tokio::test]
    async fn test_summarize() {
        let svc = service(store_with_w1().await, None, CleanupPolicy::BestEffort);
        assert!(svc.summarize("   ").await.is_err());
        let summary = svc.summarize("Este estudo avalia o solo.").await.unwrap();
        assert!(summary.contains("solo"));
    }

    #[test]
    fn test_clamp_summary() {
        let long = "á".repeat(300);
        assert_eq!(clamp_summary(&long).chars().count(), SUMMARY_MAX_CHARS);
        assert_eq!(clamp_summary("  short "), "short");
    }
}
