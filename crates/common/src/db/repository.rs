//! Repository pattern for database operations
//!
//! Postgres implementation of [`ArticleStore`]. Predicate trees are translated into
//! SeaORM conditions; multi-table writes run inside a single transaction.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::extension::postgres::PgFunc;
use sea_orm::sea_query::{Expr, Func, LikeExpr, OnConflict, Query};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, DbErr,
    EntityTrait, Order, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Select, Set,
    SqlErr, TransactionTrait,
};
use uuid::Uuid;

use crate::db::models::*;
use crate::db::store::{
    dedup_names, ArticleStore, ArticleUpdate, CitationSet, FilterOptions, MetricsUpdate,
    NewArticle,
};
use crate::db::DbPool;
use crate::errors::{AppError, Result};
use crate::search::{
    EqualityMatch, MemberField, Predicate, RangeField, SortDirection, SortField, SortSpec,
    TextField, TextMode,
};

/// Repository for data access operations
#[derive(Clone)]
pub struct Repository {
    pool: DbPool,
}

impl Repository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Get the read connection
    fn read_conn(&self) -> &DatabaseConnection {
        self.pool.read()
    }

    /// Get the write connection
    fn write_conn(&self) -> &DatabaseConnection {
        self.pool.write()
    }
}

// ============================================================================
// Predicate Translation
// ============================================================================

fn text_column(field: TextField) -> ArticleColumn {
    match field {
        TextField::Title => ArticleColumn::Title,
        TextField::Abstract => ArticleColumn::AbstractText,
        TextField::Language => ArticleColumn::Language,
        TextField::PublicationType => ArticleColumn::PublicationType,
        TextField::JournalName => ArticleColumn::JournalName,
    }
}

fn sort_column(field: SortField) -> ArticleColumn {
    match field {
        SortField::CreatedAt => ArticleColumn::CreatedAt,
        SortField::UpdatedAt => ArticleColumn::UpdatedAt,
        SortField::Title => ArticleColumn::Title,
        SortField::PublicationYear => ArticleColumn::PublicationYear,
        SortField::JournalName => ArticleColumn::JournalName,
        SortField::Language => ArticleColumn::Language,
        SortField::PublicationType => ArticleColumn::PublicationType,
        SortField::Status => ArticleColumn::Status,
    }
}

fn escape_like(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// Translate a predicate tree into a SeaORM condition over `articles`
pub(crate) fn condition(predicate: &Predicate) -> Condition {
    match predicate {
        Predicate::And { operands } => operands
            .iter()
            .fold(Condition::all(), |acc, p| acc.add(condition(p))),
        Predicate::Or { operands } => operands
            .iter()
            .fold(Condition::any(), |acc, p| acc.add(condition(p))),
        Predicate::TextMatch { field, mode, value } => {
            let lowered = Expr::expr(Func::lower(Expr::col((ArticleEntity, text_column(*field)))));
            let needle = value.to_lowercase();
            let expr = match mode {
                TextMode::Contains => lowered
                    .like(LikeExpr::new(format!("%{}%", escape_like(&needle))).escape('\\')),
                TextMode::Equals => lowered.eq(needle),
            };
            Condition::all().add(expr)
        }
        Predicate::SetMembership { field, any_of } => match field {
            MemberField::Authors => any_of.iter().fold(Condition::any(), |acc, author| {
                acc.add(
                    Expr::val(author.clone())
                        .eq(PgFunc::any(Expr::col((ArticleEntity, ArticleColumn::Authors)))),
                )
            }),
            MemberField::TopicNames => {
                let lowered: Vec<String> = any_of.iter().map(|t| t.to_lowercase()).collect();
                let tagged = Query::select()
                    .column((ArticleTopicEntity, ArticleTopicColumn::ArticleId))
                    .from(ArticleTopicEntity)
                    .inner_join(
                        TopicEntity,
                        Expr::col((TopicEntity, TopicColumn::Id))
                            .equals((ArticleTopicEntity, ArticleTopicColumn::TopicId)),
                    )
                    .and_where(
                        Expr::expr(Func::lower(Expr::col((TopicEntity, TopicColumn::Name))))
                            .is_in(lowered),
                    )
                    .to_owned();
                Condition::all().add(ArticleColumn::Id.in_subquery(tagged))
            }
        },
        Predicate::RangeMatch { field, min, max } => {
            let column = match field {
                RangeField::PublicationYear => ArticleColumn::PublicationYear,
            };
            let mut range = Condition::all();
            if let Some(min) = min {
                range = range.add(column.gte(*min));
            }
            if let Some(max) = max {
                range = range.add(column.lte(*max));
            }
            range
        }
        Predicate::Equality(eq) => Condition::all().add(match eq {
            EqualityMatch::OpenAccess(flag) => ArticleColumn::IsOpenAccess.eq(*flag),
            EqualityMatch::PeerReviewed(flag) => ArticleColumn::PeerReviewed.eq(*flag),
            EqualityMatch::Status(status) => ArticleColumn::Status.eq(status.clone()),
        }),
    }
}

/// Articles matching a predicate; a match-all predicate adds no WHERE clause
pub(crate) fn select_matching(predicate: &Predicate) -> Select<ArticleEntity> {
    if predicate.is_match_all() {
        ArticleEntity::find()
    } else {
        ArticleEntity::find().filter(condition(predicate))
    }
}

fn map_insert_err(err: DbErr, id: &str) -> AppError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => AppError::ArticleExists { id: id.to_string() },
        _ => AppError::Database(err),
    }
}

// ============================================================================
// Relation Helpers
// ============================================================================

/// Find a topic by case-insensitive name, creating it when absent
async fn upsert_topic<C: ConnectionTrait>(conn: &C, name: &str) -> Result<Uuid> {
    let by_name = || {
        TopicEntity::find().filter(
            Expr::expr(Func::lower(Expr::col((TopicEntity, TopicColumn::Name))))
                .eq(name.to_lowercase()),
        )
    };

    if let Some(topic) = by_name().one(conn).await? {
        return Ok(topic.id);
    }

    let now = Utc::now();
    let topic = TopicActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(name.to_string()),
        description: Set(None),
        parent_id: Set(None),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    };
    TopicEntity::insert(topic)
        .on_conflict(OnConflict::column(TopicColumn::Name).do_nothing().to_owned())
        .exec_without_returning(conn)
        .await?;

    by_name()
        .one(conn)
        .await?
        .map(|t| t.id)
        .ok_or_else(|| AppError::Transaction {
            message: format!("Topic {} vanished during upsert", name),
        })
}

async fn upsert_keyword<C: ConnectionTrait>(conn: &C, name: &str) -> Result<Uuid> {
    let by_name = || {
        KeywordEntity::find().filter(
            Expr::expr(Func::lower(Expr::col((KeywordEntity, KeywordColumn::Name))))
                .eq(name.to_lowercase()),
        )
    };

    if let Some(keyword) = by_name().one(conn).await? {
        return Ok(keyword.id);
    }

    let keyword = KeywordActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(name.to_string()),
        created_at: Set(Utc::now().into()),
    };
    KeywordEntity::insert(keyword)
        .on_conflict(OnConflict::column(KeywordColumn::Name).do_nothing().to_owned())
        .exec_without_returning(conn)
        .await?;

    by_name()
        .one(conn)
        .await?
        .map(|k| k.id)
        .ok_or_else(|| AppError::Transaction {
            message: format!("Keyword {} vanished during upsert", name),
        })
}

async fn link_topics<C: ConnectionTrait>(conn: &C, article_id: &str, names: &[String]) -> Result<()> {
    for name in names {
        let topic_id = upsert_topic(conn, name).await?;
        ArticleTopicActiveModel {
            article_id: Set(article_id.to_string()),
            topic_id: Set(topic_id),
        }
        .insert(conn)
        .await?;
    }
    Ok(())
}

fn group_by_article<T>(rows: Vec<(String, T)>) -> HashMap<String, Vec<T>> {
    let mut grouped: HashMap<String, Vec<T>> = HashMap::new();
    for (article_id, item) in rows {
        grouped.entry(article_id).or_default().push(item);
    }
    grouped
}

#[async_trait]
impl ArticleStore for Repository {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    // ========================================================================
    // Health Check
    // ========================================================================

    async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }

    // ========================================================================
    // Listing
    // ========================================================================

    async fn count(&self, predicate: &Predicate) -> Result<u64> {
        select_matching(predicate)
            .count(self.read_conn())
            .await
            .map_err(Into::into)
    }

    async fn find_page(
        &self,
        predicate: &Predicate,
        sort: SortSpec,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<Article>> {
        let order = match sort.direction {
            SortDirection::Asc => Order::Asc,
            SortDirection::Desc => Order::Desc,
        };

        select_matching(predicate)
            .order_by(sort_column(sort.field), order)
            .order_by_asc(ArticleColumn::Id)
            .offset(offset)
            .limit(limit)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    // ========================================================================
    // Single Article & Relations
    // ========================================================================

    async fn find_by_id(&self, id: &str) -> Result<Option<Article>> {
        ArticleEntity::find_by_id(id.to_string())
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    async fn exists(&self, id: &str) -> Result<bool> {
        let count = ArticleEntity::find()
            .filter(ArticleColumn::Id.eq(id))
            .count(self.read_conn())
            .await?;
        Ok(count > 0)
    }

    async fn topics_for(&self, article_ids: &[String]) -> Result<HashMap<String, Vec<Topic>>> {
        if article_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows = ArticleTopicEntity::find()
            .filter(ArticleTopicColumn::ArticleId.is_in(article_ids.to_vec()))
            .find_also_related(TopicEntity)
            .order_by_asc(TopicColumn::Name)
            .all(self.read_conn())
            .await?;

        Ok(group_by_article(
            rows.into_iter()
                .filter_map(|(link, topic)| topic.map(|t| (link.article_id, t)))
                .collect(),
        ))
    }

    async fn keywords_for(&self, article_ids: &[String]) -> Result<HashMap<String, Vec<Keyword>>> {
        if article_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows = ArticleKeywordEntity::find()
            .filter(ArticleKeywordColumn::ArticleId.is_in(article_ids.to_vec()))
            .find_also_related(KeywordEntity)
            .order_by_asc(KeywordColumn::Name)
            .all(self.read_conn())
            .await?;

        Ok(group_by_article(
            rows.into_iter()
                .filter_map(|(link, keyword)| keyword.map(|k| (link.article_id, k)))
                .collect(),
        ))
    }

    async fn citations_for(&self, article_id: &str) -> Result<CitationSet> {
        let made = CitationEntity::find()
            .filter(CitationColumn::CitingArticleId.eq(article_id))
            .order_by_asc(CitationColumn::CreatedAt)
            .all(self.read_conn())
            .await?;

        let received = CitationEntity::find()
            .filter(CitationColumn::CitedArticleId.eq(article_id))
            .order_by_asc(CitationColumn::CreatedAt)
            .all(self.read_conn())
            .await?;

        Ok(CitationSet { made, received })
    }

    async fn metrics_for(&self, article_id: &str) -> Result<Option<ArticleMetrics>> {
        MetricsEntity::find_by_id(article_id.to_string())
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    async fn create_article(&self, new: NewArticle) -> Result<Article> {
        new.validate()?;
        let txn = self.write_conn().begin().await?;

        if ArticleEntity::find_by_id(new.id.clone()).one(&txn).await?.is_some() {
            return Err(AppError::ArticleExists { id: new.id });
        }

        let now = Utc::now();
        let id = new.id.clone();
        let topics = new.topic_names();
        let keywords = new.keyword_names();

        let article = ArticleActiveModel {
            id: Set(id.clone()),
            title: Set(new.title),
            abstract_text: Set(new.abstract_text),
            language: Set(new.language),
            authors: Set(new.authors),
            institutions: Set(new.institutions),
            volume: Set(new.volume),
            issue: Set(new.issue),
            publication_year: Set(new.publication_year),
            publication_type: Set(new.publication_type),
            journal_name: Set(new.journal_name),
            publisher_name: Set(new.publisher_name),
            doi: Set(new.doi),
            issn: Set(new.issn),
            status: Set(new.status.into()),
            is_open_access: Set(new.is_open_access),
            peer_reviewed: Set(new.peer_reviewed),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        }
        .insert(&txn)
        .await
        .map_err(|e| map_insert_err(e, &id))?;

        link_topics(&txn, &id, &topics).await?;

        for name in &keywords {
            let keyword_id = upsert_keyword(&txn, name).await?;
            ArticleKeywordActiveModel {
                article_id: Set(id.clone()),
                keyword_id: Set(keyword_id),
            }
            .insert(&txn)
            .await?;
        }

        let citations: Vec<CitationActiveModel> = new
            .citations
            .into_iter()
            .map(|c| {
                let c = c.normalized();
                CitationActiveModel {
                    id: Set(Uuid::new_v4()),
                    citing_article_id: Set(id.clone()),
                    cited_article_id: Set(c.cited_article_id),
                    cited_title: Set(c.title),
                    cited_authors: Set(c.authors),
                    cited_journal: Set(c.journal),
                    cited_volume: Set(c.volume),
                    cited_issue: Set(c.issue),
                    cited_pages: Set(c.pages),
                    cited_year: Set(c.year),
                    cited_doi: Set(c.doi),
                    cited_url: Set(c.url),
                    created_at: Set(now.into()),
                }
            })
            .collect();

        if !citations.is_empty() {
            CitationEntity::insert_many(citations)
                .exec_without_returning(&txn)
                .await?;
        }

        txn.commit().await?;
        Ok(article)
    }

    async fn update_article(&self, id: &str, update: ArticleUpdate) -> Result<Article> {
        let txn = self.write_conn().begin().await?;

        let mut article = ArticleEntity::find_by_id(id.to_string())
            .one(&txn)
            .await?
            .ok_or_else(|| AppError::ArticleNotFound { id: id.to_string() })?;

        update.apply_to(&mut article);
        article.updated_at = Utc::now().into();

        let active: ArticleActiveModel = article.into();
        let article = active.reset_all().update(&txn).await?;

        if let Some(topics) = &update.topics {
            ArticleTopicEntity::delete_many()
                .filter(ArticleTopicColumn::ArticleId.eq(id))
                .exec(&txn)
                .await?;
            link_topics(&txn, id, &dedup_names(topics)).await?;
        }

        txn.commit().await?;
        Ok(article)
    }

    async fn update_metrics(&self, id: &str, update: MetricsUpdate) -> Result<ArticleMetrics> {
        update.validate()?;
        let txn = self.write_conn().begin().await?;

        if ArticleEntity::find_by_id(id.to_string()).one(&txn).await?.is_none() {
            return Err(AppError::ArticleNotFound { id: id.to_string() });
        }

        let now = Utc::now();
        let existing = MetricsEntity::find_by_id(id.to_string()).one(&txn).await?;

        let metrics = match existing {
            Some(current) => {
                let mut active: MetricsActiveModel = current.into();
                if let Some(v) = update.citations {
                    active.citations = Set(v);
                }
                if let Some(v) = update.views {
                    active.views = Set(v);
                }
                if let Some(v) = update.downloads {
                    active.downloads = Set(v);
                }
                if update.altmetric_score.is_some() {
                    active.altmetric_score = Set(update.altmetric_score);
                }
                active.updated_at = Set(now.into());
                active.update(&txn).await?
            }
            None => {
                MetricsActiveModel {
                    article_id: Set(id.to_string()),
                    citations: Set(update.citations.unwrap_or(0)),
                    views: Set(update.views.unwrap_or(0)),
                    downloads: Set(update.downloads.unwrap_or(0)),
                    altmetric_score: Set(update.altmetric_score),
                    updated_at: Set(now.into()),
                }
                .insert(&txn)
                .await?
            }
        };

        txn.commit().await?;
        Ok(metrics)
    }

    async fn delete_article(&self, id: &str) -> Result<bool> {
        let txn = self.write_conn().begin().await?;

        if ArticleEntity::find_by_id(id.to_string()).one(&txn).await?.is_none() {
            return Ok(false);
        }

        CitationEntity::delete_many()
            .filter(
                Condition::any()
                    .add(CitationColumn::CitingArticleId.eq(id))
                    .add(CitationColumn::CitedArticleId.eq(id)),
            )
            .exec(&txn)
            .await?;

        ArticleTopicEntity::delete_many()
            .filter(ArticleTopicColumn::ArticleId.eq(id))
            .exec(&txn)
            .await?;

        ArticleKeywordEntity::delete_many()
            .filter(ArticleKeywordColumn::ArticleId.eq(id))
            .exec(&txn)
            .await?;

        MetricsEntity::delete_by_id(id.to_string()).exec(&txn).await?;
        ArticleEntity::delete_by_id(id.to_string()).exec(&txn).await?;

        txn.commit().await?;
        Ok(true)
    }

    // ========================================================================
    // Filter Options
    // ========================================================================

    async fn filter_options(&self) -> Result<FilterOptions> {
        let conn = self.read_conn();

        let topics: Vec<String> = TopicEntity::find()
            .select_only()
            .column(TopicColumn::Name)
            .order_by_asc(TopicColumn::Name)
            .into_tuple()
            .all(conn)
            .await?;

        let languages: Vec<String> = ArticleEntity::find()
            .select_only()
            .column(ArticleColumn::Language)
            .distinct()
            .order_by_asc(ArticleColumn::Language)
            .into_tuple()
            .all(conn)
            .await?;

        let statuses: Vec<String> = ArticleEntity::find()
            .select_only()
            .column(ArticleColumn::Status)
            .distinct()
            .order_by_asc(ArticleColumn::Status)
            .into_tuple()
            .all(conn)
            .await?;

        Ok(FilterOptions {
            topics,
            languages,
            publication_types: self.distinct_optional(ArticleColumn::PublicationType).await?,
            statuses,
            journal_names: self.distinct_optional(ArticleColumn::JournalName).await?,
        })
    }
}

impl Repository {
    /// Distinct non-null values of a nullable text column
    async fn distinct_optional(&self, column: ArticleColumn) -> Result<Vec<String>> {
        let values: Vec<Option<String>> = ArticleEntity::find()
            .select_only()
            .column(column)
            .filter(column.is_not_null())
            .distinct()
            .order_by_asc(column)
            .into_tuple()
            .all(self.read_conn())
            .await?;
        Ok(values.into_iter().flatten().collect())
    }
}
