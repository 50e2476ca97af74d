//! Advanced (AI) search orchestration
//!
//! A request moves through these stages:
//!
//! `Received -> (Shortening) -> Dispatched -> Parsing -> Resolving`
//!
//! Long queries are first reduced to keywords by the completion service. The graph
//! builder then answers with a JSON list of `{article_identifier, abstract}` entries,
//! and each identifier is resolved through the same single-row fetch the detail
//! endpoint uses. Unresolvable entries are dropped.

mod payload;

pub use payload::extract_json_payload;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use futures::future::try_join_all;
use serde_json::Value;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::clients::{shorten_query_prompt, CompletionClient, GraphBuilder};
use crate::config::{AdvancedSearchConfig, SummarizationFailurePolicy};
use crate::db::ArticleStore;
use crate::errors::{AppError, Result};
use crate::metrics;
use crate::search::{fetch_article, ArticleView, Include};

/// Orchestrator stages, reported on failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchStage {
    Received,
    Shortening,
    Dispatched,
    Parsing,
    Resolving,
}

impl SearchStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchStage::Received => "received",
            SearchStage::Shortening => "shortening",
            SearchStage::Dispatched => "dispatched",
            SearchStage::Parsing => "parsing",
            SearchStage::Resolving => "resolving",
        }
    }
}

/// One usable entry of the graph builder answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerEntry {
    pub article_identifier: String,
    pub summary: Option<String>,
}

fn identifier_of(entry: &Value) -> Option<String> {
    match entry.get("article_identifier")? {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Usable entries of a parsed answer, in answer order, first occurrence of each id
///
/// Entries without an identifier are skipped; a payload without a `results` array is
/// a format error.
pub fn answer_entries(payload: &Value) -> Result<Vec<AnswerEntry>> {
    let results = payload
        .get("results")
        .and_then(Value::as_array)
        .ok_or_else(|| AppError::ExternalFormat {
            message: "Answer has no results array".to_string(),
        })?;

    let mut seen = HashSet::new();
    Ok(results
        .iter()
        .filter_map(|entry| {
            let article_identifier = identifier_of(entry)?;
            let summary = entry
                .get("abstract")
                .and_then(Value::as_str)
                .map(str::to_string);
            Some(AnswerEntry { article_identifier, summary })
        })
        .filter(|entry| seen.insert(entry.article_identifier.clone()))
        .collect())
}

/// Advanced search service
pub struct AdvancedSearch {
    store: Arc<dyn ArticleStore>,
    graph: Option<Arc<dyn GraphBuilder>>,
    completion: Arc<dyn CompletionClient>,
    config: AdvancedSearchConfig,
}

impl AdvancedSearch {
    pub fn new(
        store: Arc<dyn ArticleStore>,
        graph: Option<Arc<dyn GraphBuilder>>,
        completion: Arc<dyn CompletionClient>,
        config: AdvancedSearchConfig,
    ) -> Self {
        Self {
            store,
            graph,
            completion,
            config,
        }
    }

    /// Run an advanced search for `query`
    #[instrument(skip(self), fields(query_chars = query.chars().count()))]
    pub async fn search(&self, query: &str) -> Result<Vec<ArticleView>> {
        let start = Instant::now();
        let mut shortened = false;
        let result = self.run(query, &mut shortened).await;

        metrics::record_advanced_search(result.is_ok(), shortened, start.elapsed());
        match &result {
            Ok(articles) => info!(
                resolved = articles.len(),
                shortened,
                duration_ms = start.elapsed().as_millis() as u64,
                "Advanced search completed"
            ),
            Err((stage, e)) => warn!(stage = stage.as_str(), error = %e, "Advanced search failed"),
        }
        result.map_err(|(_, e)| e)
    }

    async fn run(
        &self,
        query: &str,
        shortened: &mut bool,
    ) -> std::result::Result<Vec<ArticleView>, (SearchStage, AppError)> {
        let query = query.trim();
        if query.is_empty() {
            return Err((
                SearchStage::Received,
                AppError::validation("query", "Query is required"),
            ));
        }

        let graph = self.graph.as_ref().ok_or_else(|| {
            (
                SearchStage::Received,
                AppError::ServiceUnavailable {
                    message: "Graph builder is not configured".to_string(),
                },
            )
        })?;

        let question = if query.chars().count() > self.config.shorten_threshold {
            match self.shorten(query).await {
                Ok(Some(short)) => {
                    *shortened = true;
                    short
                }
                Ok(None) => query.to_string(),
                Err(e) => return Err((SearchStage::Shortening, e)),
            }
        } else {
            query.to_string()
        };

        let session_id = Uuid::new_v4().to_string();
        let answer = graph
            .chat(&question, &session_id, &self.config.retrieval_mode)
            .await
            .map_err(|e| (SearchStage::Dispatched, e))?;

        let entries = extract_json_payload(&answer)
            .and_then(|payload| answer_entries(&payload))
            .map_err(|e| (SearchStage::Parsing, e))?;

        self.resolve(entries)
            .await
            .map_err(|e| (SearchStage::Resolving, e))
    }

    /// Shortened query, `None` to keep the original
    async fn shorten(&self, query: &str) -> Result<Option<String>> {
        match self.completion.complete(&shorten_query_prompt(query)).await {
            Ok(short) if !short.trim().is_empty() => Ok(Some(short.trim().to_string())),
            Ok(_) => Ok(None),
            Err(e) => match self.config.summarization_failure {
                SummarizationFailurePolicy::FallBack => {
                    warn!(error = %e, "Query shortening failed, using original query");
                    Ok(None)
                }
                SummarizationFailurePolicy::Fail => Err(e),
            },
        }
    }

    /// Look up every entry concurrently, keeping answer order
    async fn resolve(&self, entries: Vec<AnswerEntry>) -> Result<Vec<ArticleView>> {
        let store = self.store.as_ref();
        let lookups = entries.into_iter().map(|entry| async move {
            let view = fetch_article(store, &entry.article_identifier, Include::list()).await?;
            Ok::<_, AppError>(view.map(|mut view| {
                view.ai_resume = entry.summary;
                view
            }))
        });

        let resolved = try_join_all(lookups).await?;
        Ok(resolved.into_iter().flatten().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::Prompt;
    use crate::db::{MemoryStore, NewArticle};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    struct FakeGraph {
        answer: std::result::Result<String, String>,
        questions: Mutex<Vec<String>>,
    }

    impl FakeGraph {
        fn answering(answer: impl Into<String>) -> Arc<Self> {
            Arc::new(Self {
                answer: Ok(answer.into()),
                questions: Mutex::new(Vec::new()),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                answer: Err("connection refused".into()),
                questions: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl GraphBuilder for FakeGraph {
        async fn chat(&self, question: &str, _session_id: &str, mode: &str) -> Result<String> {
            assert_eq!(mode, "graph_vector_fulltext");
            self.questions.lock().unwrap().push(question.to_string());
            self.answer
                .clone()
                .map_err(|e| AppError::external("graph_builder", e))
        }

        async fn index_document(&self, _file_name: &str, _content: Vec<u8>) -> Result<()> {
            Ok(())
        }

        async fn delete_document(&self, _file_name: &str) -> Result<()> {
            Ok(())
        }
    }

    struct FakeCompletion(std::result::Result<&'static str, ()>);

    #[async_trait]
    impl CompletionClient for FakeCompletion {
        async fn complete(&self, _prompt: &Prompt) -> Result<String> {
            self.0
                .map(str::to_string)
                .map_err(|_| AppError::external("completion", "HTTP 503"))
        }
    }

    async fn store() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        for id in ["W1", "W2", "W3"] {
            let mut article = NewArticle::new(id, format!("Title {}", id));
            article.topics = vec!["AI".into()];
            store.create_article(article).await.unwrap();
        }
        store
    }

    fn service(
        store: Arc<MemoryStore>,
        graph: Arc<FakeGraph>,
        completion: FakeCompletion,
        policy: SummarizationFailurePolicy,
    ) -> AdvancedSearch {
        AdvancedSearch::new(
            store,
            Some(graph),
            Arc::new(completion),
            AdvancedSearchConfig {
                summarization_failure: policy,
                ..Default::default()
            },
        )
    }

    fn answer(ids: &[&str]) -> String {
        let results: Vec<Value> = ids
            .iter()
            .map(|id| json!({ "article_identifier": id, "abstract": format!("Why {}", id) }))
            .collect();
        json!({ "results": results }).to_string()
    }

    #[tokio::test]
    async fn test_empty_query_is_validation_error() {
        let search = service(store().await, FakeGraph::answering("{}"), FakeCompletion(Ok("x")), Default::default());
        let err = search.search("   ").await.unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_resolves_in_answer_order_with_resume() {
        let graph = FakeGraph::answering(answer(&["W3", "W1"]));
        let search = service(store().await, graph, FakeCompletion(Ok("x")), Default::default());
        let results = search.search("soil").await.unwrap();
        let ids: Vec<_> = results.iter().map(|v| v.article.id.as_str()).collect();
        assert_eq!(ids, vec!["W3", "W1"]);
        assert_eq!(results[0].ai_resume.as_deref(), Some("Why W3"));
        assert_eq!(results[0].topics[0].name, "AI");
    }

    #[tokio::test]
    async fn test_unknown_and_missing_identifiers_are_dropped() {
        let raw = json!({ "results": [
            { "article_identifier": "W1", "abstract": "a" },
            { "article_identifier": "W404", "abstract": "b" },
            { "abstract": "no id" },
            { "article_identifier": "W2" },
            { "article_identifier": "W1", "abstract": "dup" }
        ]})
        .to_string();
        let search = service(store().await, FakeGraph::answering(raw), FakeCompletion(Ok("x")), Default::default());
        let results = search.search("soil").await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].ai_resume.as_deref(), Some("a"));
        assert_eq!(results[1].article.id, "W2");
        assert_eq!(results[1].ai_resume, None);
    }

    #[tokio::test]
    async fn test_wrapped_answers_parse_like_plain() {
        let plain = answer(&["W2"]);
        for wrapped in [
            plain.clone(),
            format!("{{{}}}", plain),
            format!("```json\n{}\n```", plain),
        ] {
            let search = service(store().await, FakeGraph::answering(wrapped), FakeCompletion(Ok("x")), Default::default());
            let results = search.search("soil").await.unwrap();
            assert_eq!(results.len(), 1);
            assert_eq!(results[0].article.id, "W2");
        }
    }

    #[tokio::test]
    async fn test_unparseable_answer_is_format_error() {
        let search = service(store().await, FakeGraph::answering("I could not find anything."), FakeCompletion(Ok("x")), Default::default());
        let err = search.search("soil").await.unwrap_err();
        assert!(matches!(err, AppError::ExternalFormat { .. }));
    }

    #[tokio::test]
    async fn test_graph_failure_propagates() {
        let search = service(store().await, FakeGraph::failing(), FakeCompletion(Ok("x")), Default::default());
        let err = search.search("soil").await.unwrap_err();
        assert!(err.is_server_error());
    }

    #[tokio::test]
    async fn test_long_query_is_shortened() {
        let graph = FakeGraph::answering(answer(&[]));
        let search = service(store().await, graph.clone(), FakeCompletion(Ok("soil deep learning")), Default::default());
        let long = "which recent studies apply deep learning models to the analysis of tropical soil samples";
        search.search(long).await.unwrap();
        assert_eq!(graph.questions.lock().unwrap().as_slice(), ["soil deep learning"]);
    }

    #[tokio::test]
    async fn test_short_query_skips_completion() {
        let graph = FakeGraph::answering(answer(&[]));
        let search = service(store().await, graph.clone(), FakeCompletion(Err(())), SummarizationFailurePolicy::Fail);
        search.search("soil").await.unwrap();
        assert_eq!(graph.questions.lock().unwrap().as_slice(), ["soil"]);
    }

    #[tokio::test]
    async fn test_shortening_failure_policy() {
        let long = "x".repeat(80);

        let graph = FakeGraph::answering(answer(&[]));
        let search = service(store().await, graph.clone(), FakeCompletion(Err(())), SummarizationFailurePolicy::FallBack);
        search.search(&long).await.unwrap();
        assert_eq!(graph.questions.lock().unwrap()[0], long);

        let graph = FakeGraph::answering(answer(&[]));
        let search = service(store().await, graph.clone(), FakeCompletion(Err(())), SummarizationFailurePolicy::Fail);
        assert!(search.search(&long).await.is_err());
        assert!(graph.questions.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unconfigured_graph_is_unavailable() {
        let search = AdvancedSearch::new(store().await, None, Arc::new(FakeCompletion(Ok("x"))), Default::default());
        let err = search.search("soil").await.unwrap_err();
        assert!(matches!(err, AppError::ServiceUnavailable { .. }));
    }

    #[test]
    fn test_answer_entries_requires_results() {
        assert!(answer_entries(&json!({ "items": [] })).is_err());
        let entries = answer_entries(&json!({ "results": [{ "article_identifier": 42 }] })).unwrap();
        assert_eq!(entries[0].article_identifier, "42");
    }
}
