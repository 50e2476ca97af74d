//! In-process article store
//!
//! Selected with `database.url = "memory://"`. All tables live behind one `RwLock`;
//! every mutation takes the write lock once, so multi-table writes are atomic.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::models::{Article, ArticleMetrics, Citation, Keyword, Topic};
use super::store::{
    ArticleStore, ArticleUpdate, CitationSet, FilterOptions, MetricsUpdate, NewArticle,
};
use crate::errors::{AppError, Result};
use crate::search::{ArticleRow, Predicate, SortDirection, SortField, SortSpec};

#[derive(Default)]
struct Tables {
    articles: HashMap<String, Article>,
    topics: Vec<Topic>,
    article_topics: Vec<(String, Uuid)>,
    keywords: Vec<Keyword>,
    article_keywords: Vec<(String, Uuid)>,
    citations: Vec<Citation>,
    metrics: HashMap<String, ArticleMetrics>,
}

impl Tables {
    fn topic_names(&self, article_id: &str) -> Vec<String> {
        self.topics_of(article_id).into_iter().map(|t| t.name).collect()
    }

    fn topics_of(&self, article_id: &str) -> Vec<Topic> {
        self.article_topics
            .iter()
            .filter(|(a, _)| a == article_id)
            .filter_map(|(_, t)| self.topics.iter().find(|topic| topic.id == *t))
            .cloned()
            .collect()
    }

    fn keywords_of(&self, article_id: &str) -> Vec<Keyword> {
        self.article_keywords
            .iter()
            .filter(|(a, _)| a == article_id)
            .filter_map(|(_, k)| self.keywords.iter().find(|kw| kw.id == *k))
            .cloned()
            .collect()
    }

    fn matching(&self, predicate: &Predicate) -> Vec<&Article> {
        self.articles
            .values()
            .filter(|article| {
                let names = self.topic_names(&article.id);
                predicate.matches(&ArticleRow {
                    article: *article,
                    topic_names: &names,
                })
            })
            .collect()
    }

    /// Case-insensitive lookup by name, creating the topic if needed
    fn upsert_topic(&mut self, name: &str) -> Uuid {
        if let Some(topic) = self
            .topics
            .iter()
            .find(|t| t.name.to_lowercase() == name.to_lowercase())
        {
            return topic.id;
        }
        let now = Utc::now().fixed_offset();
        let topic = Topic {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: None,
            parent_id: None,
            created_at: now,
            updated_at: now,
        };
        let id = topic.id;
        self.topics.push(topic);
        id
    }

    fn upsert_keyword(&mut self, name: &str) -> Uuid {
        if let Some(keyword) = self
            .keywords
            .iter()
            .find(|k| k.name.to_lowercase() == name.to_lowercase())
        {
            return keyword.id;
        }
        let keyword = Keyword {
            id: Uuid::new_v4(),
            name: name.to_string(),
            created_at: Utc::now().fixed_offset(),
        };
        let id = keyword.id;
        self.keywords.push(keyword);
        id
    }

    fn replace_topics(&mut self, article_id: &str, names: &[String]) {
        self.article_topics.retain(|(a, _)| a != article_id);
        for name in names {
            let topic_id = self.upsert_topic(name);
            self.article_topics.push((article_id.to_string(), topic_id));
        }
    }
}

/// `ArticleStore` backed by process memory
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn nulls_last<T: Ord>(a: Option<T>, b: Option<T>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => x.cmp(&y),
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
    }
}

fn compare(a: &Article, b: &Article, sort: SortSpec) -> Ordering {
    let ordering = match sort.field {
        SortField::CreatedAt => a.created_at.cmp(&b.created_at),
        SortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
        SortField::Title => a.title.cmp(&b.title),
        SortField::PublicationYear => nulls_last(a.publication_year, b.publication_year),
        SortField::JournalName => nulls_last(a.journal_name.as_deref(), b.journal_name.as_deref()),
        SortField::Language => a.language.cmp(&b.language),
        SortField::PublicationType => {
            nulls_last(a.publication_type.as_deref(), b.publication_type.as_deref())
        }
        SortField::Status => a.status.cmp(&b.status),
    };
    let ordering = match sort.direction {
        SortDirection::Asc => ordering,
        SortDirection::Desc => ordering.reverse(),
    };
    ordering.then_with(|| a.id.cmp(&b.id))
}

fn distinct<'a>(values: impl Iterator<Item = &'a str>) -> Vec<String> {
    values
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(str::to_string)
        .collect()
}

#[async_trait]
impl ArticleStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn count(&self, predicate: &Predicate) -> Result<u64> {
        let tables = self.tables.read().await;
        Ok(tables.matching(predicate).len() as u64)
    }

    async fn find_page(
        &self,
        predicate: &Predicate,
        sort: SortSpec,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<Article>> {
        let tables = self.tables.read().await;
        let mut rows = tables.matching(predicate);
        rows.sort_by(|a, b| compare(a, b, sort));
        Ok(rows
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Article>> {
        Ok(self.tables.read().await.articles.get(id).cloned())
    }

    async fn exists(&self, id: &str) -> Result<bool> {
        Ok(self.tables.read().await.articles.contains_key(id))
    }

    async fn topics_for(&self, article_ids: &[String]) -> Result<HashMap<String, Vec<Topic>>> {
        let tables = self.tables.read().await;
        Ok(article_ids
            .iter()
            .map(|id| (id.clone(), tables.topics_of(id)))
            .filter(|(_, topics)| !topics.is_empty())
            .collect())
    }

    async fn keywords_for(&self, article_ids: &[String]) -> Result<HashMap<String, Vec<Keyword>>> {
        let tables = self.tables.read().await;
        Ok(article_ids
            .iter()
            .map(|id| (id.clone(), tables.keywords_of(id)))
            .filter(|(_, keywords)| !keywords.is_empty())
            .collect())
    }

    async fn citations_for(&self, article_id: &str) -> Result<CitationSet> {
        let tables = self.tables.read().await;
        let made = tables
            .citations
            .iter()
            .filter(|c| c.citing_article_id == article_id)
            .cloned()
            .collect();
        let received = tables
            .citations
            .iter()
            .filter(|c| c.cited_article_id.as_deref() == Some(article_id))
            .cloned()
            .collect();
        Ok(CitationSet { made, received })
    }

    async fn metrics_for(&self, article_id: &str) -> Result<Option<ArticleMetrics>> {
        Ok(self.tables.read().await.metrics.get(article_id).cloned())
    }

    async fn create_article(&self, new: NewArticle) -> Result<Article> {
        new.validate()?;
        let mut tables = self.tables.write().await;
        if tables.articles.contains_key(&new.id) {
            return Err(AppError::ArticleExists { id: new.id });
        }

        let now = Utc::now().fixed_offset();
        let topics = new.topic_names();
        let keywords = new.keyword_names();
        let article = Article {
            id: new.id.clone(),
            title: new.title,
            abstract_text: new.abstract_text,
            language: new.language,
            authors: new.authors,
            institutions: new.institutions,
            volume: new.volume,
            issue: new.issue,
            publication_year: new.publication_year,
            publication_type: new.publication_type,
            journal_name: new.journal_name,
            publisher_name: new.publisher_name,
            doi: new.doi,
            issn: new.issn,
            status: new.status.into(),
            is_open_access: new.is_open_access,
            peer_reviewed: new.peer_reviewed,
            created_at: now,
            updated_at: now,
        };

        tables.replace_topics(&article.id, &topics);
        for name in &keywords {
            let keyword_id = tables.upsert_keyword(name);
            tables.article_keywords.push((article.id.clone(), keyword_id));
        }
        for citation in new.citations {
            let citation = citation.normalized();
            tables.citations.push(Citation {
                id: Uuid::new_v4(),
                citing_article_id: article.id.clone(),
                cited_article_id: citation.cited_article_id,
                cited_title: citation.title,
                cited_authors: citation.authors,
                cited_journal: citation.journal,
                cited_volume: citation.volume,
                cited_issue: citation.issue,
                cited_pages: citation.pages,
                cited_year: citation.year,
                cited_doi: citation.doi,
                cited_url: citation.url,
                created_at: now,
            });
        }
        tables.articles.insert(article.id.clone(), article.clone());
        Ok(article)
    }

    async fn update_article(&self, id: &str, update: ArticleUpdate) -> Result<Article> {
        let mut tables = self.tables.write().await;
        let mut article = tables
            .articles
            .get(id)
            .cloned()
            .ok_or_else(|| AppError::ArticleNotFound { id: id.to_string() })?;

        update.apply_to(&mut article);
        article.updated_at = Utc::now().fixed_offset();

        if let Some(topics) = &update.topics {
            tables.replace_topics(id, &super::store::dedup_names(topics));
        }
        tables.articles.insert(id.to_string(), article.clone());
        Ok(article)
    }

    async fn update_metrics(&self, id: &str, update: MetricsUpdate) -> Result<ArticleMetrics> {
        update.validate()?;
        let mut tables = self.tables.write().await;
        if !tables.articles.contains_key(id) {
            return Err(AppError::ArticleNotFound { id: id.to_string() });
        }

        let now = Utc::now().fixed_offset();
        let metrics = tables
            .metrics
            .entry(id.to_string())
            .or_insert_with(|| ArticleMetrics {
                article_id: id.to_string(),
                citations: 0,
                views: 0,
                downloads: 0,
                altmetric_score: None,
                updated_at: now,
            });
        if let Some(v) = update.citations {
            metrics.citations = v;
        }
        if let Some(v) = update.views {
            metrics.views = v;
        }
        if let Some(v) = update.downloads {
            metrics.downloads = v;
        }
        if update.altmetric_score.is_some() {
            metrics.altmetric_score = update.altmetric_score;
        }
        metrics.updated_at = now;
        Ok(metrics.clone())
    }

    async fn delete_article(&self, id: &str) -> Result<bool> {
        let mut tables = self.tables.write().await;
        if tables.articles.remove(id).is_none() {
            return Ok(false);
        }
        tables.citations.retain(|c| {
            c.citing_article_id != id && c.cited_article_id.as_deref() != Some(id)
        });
        tables.article_topics.retain(|(a, _)| a != id);
        tables.article_keywords.retain(|(a, _)| a != id);
        tables.metrics.remove(id);
        Ok(true)
    }

    async fn filter_options(&self) -> Result<FilterOptions> {
        let tables = self.tables.read().await;
        let articles = || tables.articles.values();
        Ok(FilterOptions {
            topics: distinct(tables.topics.iter().map(|t| t.name.as_str())),
            languages: distinct(articles().map(|a| a.language.as_str())),
            publication_types: distinct(articles().filter_map(|a| a.publication_type.as_deref())),
            statuses: distinct(articles().map(|a| a.status.as_str())),
            journal_names: distinct(articles().filter_map(|a| a.journal_name.as_deref())),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::NewCitation;

    fn article(id: &str, authors: &[&str], topics: &[&str]) -> NewArticle {
        let mut new = NewArticle::new(id, format!("Article {}", id));
        new.authors = authors.iter().map(|a| a.to_string()).collect();
        new.topics = topics.iter().map(|t| t.to_string()).collect();
        new.language = "English".into();
        new
    }

    #[tokio::test]
    async fn test_create_and_fetch() {
        let store = MemoryStore::new();
        let created = store.create_article(article("W1", &["A"], &["AI"])).await.unwrap();
        assert_eq!(created.status, "PUBLISHED");
        assert!(store.exists("W1").await.unwrap());
        assert_eq!(store.find_by_id("W1").await.unwrap(), Some(created));
        let topics = store.topics_for(&["W1".into()]).await.unwrap();
        assert_eq!(topics["W1"][0].name, "AI");
    }

    #[tokio::test]
    async fn test_duplicate_id_writes_nothing() {
        let store = MemoryStore::new();
        store.create_article(article("W1", &["A"], &["AI"])).await.unwrap();

        let mut dup = article("W1", &["B"], &["Robotics"]);
        dup.citations.push(NewCitation { title: Some("Ext".into()), ..Default::default() });
        let err = store.create_article(dup).await.unwrap_err();
        assert!(matches!(err, AppError::ArticleExists { .. }));

        assert_eq!(store.count(&Predicate::match_all()).await.unwrap(), 1);
        assert!(store.citations_for("W1").await.unwrap().made.is_empty());
        let options = store.filter_options().await.unwrap();
        assert_eq!(options.topics, vec!["AI"]);
    }

    #[tokio::test]
    async fn test_topics_are_shared_by_name() {
        let store = MemoryStore::new();
        store.create_article(article("W1", &[], &["AI"])).await.unwrap();
        store.create_article(article("W2", &[], &["ai", "Robotics"])).await.unwrap();
        let topics = store.topics_for(&["W1".into(), "W2".into()]).await.unwrap();
        assert_eq!(topics["W1"][0].id, topics["W2"][0].id);
        assert_eq!(store.filter_options().await.unwrap().topics, vec!["AI", "Robotics"]);
    }

    #[tokio::test]
    async fn test_delete_cascades_only_own_relations() {
        let store = MemoryStore::new();
        store.create_article(article("W1", &[], &["AI"])).await.unwrap();
        let mut w2 = article("W2", &[], &["AI"]);
        w2.citations.push(NewCitation { cited_article_id: Some("W1".into()), ..Default::default() });
        store.create_article(w2).await.unwrap();
        let mut w3 = article("W3", &[], &["Robotics"]);
        w3.citations.push(NewCitation { cited_article_id: Some("W2".into()), ..Default::default() });
        store.create_article(w3).await.unwrap();
        let mut w4 = article("W4", &[], &[]);
        w4.citations.push(NewCitation { title: Some("External".into()), ..Default::default() });
        store.create_article(w4).await.unwrap();

        let w3_before = store.citations_for("W3").await.unwrap();
        let w4_before = store.citations_for("W4").await.unwrap();

        assert!(store.delete_article("W2").await.unwrap());
        assert!(!store.delete_article("W2").await.unwrap());

        assert!(store.find_by_id("W2").await.unwrap().is_none());
        assert!(store.citations_for("W1").await.unwrap().received.is_empty());
        assert!(store.citations_for("W3").await.unwrap().made.is_empty());
        assert!(store.topics_for(&["W2".into()]).await.unwrap().is_empty());

        assert_ne!(store.citations_for("W3").await.unwrap(), w3_before);
        assert_eq!(store.citations_for("W4").await.unwrap(), w4_before);
        let topics = store.topics_for(&["W1".into()]).await.unwrap();
        assert_eq!(topics["W1"][0].name, "AI");
    }

    #[tokio::test]
    async fn test_update_article_and_topics() {
        let store = MemoryStore::new();
        store.create_article(article("W1", &[], &["AI"])).await.unwrap();
        let update = ArticleUpdate {
            title: Some("Renamed".into()),
            topics: Some(vec!["Robotics".into()]),
            ..Default::default()
        };
        let updated = store.update_article("W1", update).await.unwrap();
        assert_eq!(updated.title, "Renamed");
        let topics = store.topics_for(&["W1".into()]).await.unwrap();
        assert_eq!(topics["W1"].len(), 1);
        assert_eq!(topics["W1"][0].name, "Robotics");

        let err = store.update_article("W9", ArticleUpdate::default()).await.unwrap_err();
        assert!(matches!(err, AppError::ArticleNotFound { .. }));
    }

    #[tokio::test]
    async fn test_metrics_upsert() {
        let store = MemoryStore::new();
        store.create_article(article("W1", &[], &[])).await.unwrap();
        assert!(store.metrics_for("W1").await.unwrap().is_none());

        let update = MetricsUpdate { views: Some(10), ..Default::default() };
        let metrics = store.update_metrics("W1", update).await.unwrap();
        assert_eq!((metrics.views, metrics.citations), (10, 0));

        let update = MetricsUpdate { citations: Some(3), ..Default::default() };
        let metrics = store.update_metrics("W1", update).await.unwrap();
        assert_eq!((metrics.views, metrics.citations), (10, 3));

        assert!(store.update_metrics("W9", MetricsUpdate::default()).await.is_err());
    }

    #[tokio::test]
    async fn test_sort_nulls_last_ascending() {
        let store = MemoryStore::new();
        let mut a = article("W1", &[], &[]);
        a.publication_year = Some(2020);
        let b = article("W2", &[], &[]);
        let mut c = article("W3", &[], &[]);
        c.publication_year = Some(2010);
        for new in [a, b, c] {
            store.create_article(new).await.unwrap();
        }
        let sort = SortSpec { field: SortField::PublicationYear, direction: SortDirection::Asc };
        let rows = store.find_page(&Predicate::match_all(), sort, 0, 10).await.unwrap();
        let ids: Vec<_> = rows.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["W3", "W1", "W2"]);
    }
}
