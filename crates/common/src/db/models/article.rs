//! Article entity

use std::str::FromStr;

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::errors::AppError;

/// Editorial status of an article
///
/// Serialized in canonical uppercase; accepted in any casing on input.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all(serialize = "SCREAMING_SNAKE_CASE"), try_from = "String")]
pub enum ArticleStatus {
    Draft,
    Published,
    Archived,
}

impl ArticleStatus {
    /// Canonical stored form
    pub fn as_str(&self) -> &'static str {
        match self {
            ArticleStatus::Draft => "DRAFT",
            ArticleStatus::Published => "PUBLISHED",
            ArticleStatus::Archived => "ARCHIVED",
        }
    }

    /// Canonical casing for a caller-supplied status; unknown values are uppercased as-is
    pub fn canonicalize(raw: &str) -> String {
        raw.trim().to_uppercase()
    }
}

impl FromStr for ArticleStatus {
    type Err = AppError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match ArticleStatus::canonicalize(raw).as_str() {
            "DRAFT" => Ok(ArticleStatus::Draft),
            "PUBLISHED" => Ok(ArticleStatus::Published),
            "ARCHIVED" => Ok(ArticleStatus::Archived),
            _ => Err(AppError::validation(
                "status",
                format!("Unknown article status '{}'", raw.trim()),
            )),
        }
    }
}

impl TryFrom<String> for ArticleStatus {
    type Error = AppError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        raw.parse()
    }
}

impl From<ArticleStatus> for String {
    fn from(status: ArticleStatus) -> Self {
        status.as_str().to_string()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "articles")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    /// Source identifier (e.g. an OpenAlex work id); never regenerated
    #[sea_orm(primary_key, auto_increment = false, column_type = "Text")]
    pub id: String,

    #[sea_orm(column_type = "Text")]
    pub title: String,

    #[sea_orm(column_name = "abstract", column_type = "Text")]
    #[serde(rename = "abstract")]
    pub abstract_text: String,

    #[sea_orm(column_type = "Text")]
    pub language: String,

    pub authors: Vec<String>,

    pub institutions: Vec<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub volume: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub issue: Option<String>,

    pub publication_year: Option<i32>,

    #[sea_orm(column_type = "Text", nullable)]
    pub publication_type: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub journal_name: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub publisher_name: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub doi: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub issn: Option<String>,

    #[sea_orm(column_type = "Text")]
    pub status: String,

    pub is_open_access: bool,

    pub peer_reviewed: bool,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

/// Graph index document name for an article id
pub fn document_name(article_id: &str) -> String {
    format!("{}.txt", article_id)
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::article_topic::Entity")]
    ArticleTopics,

    #[sea_orm(has_many = "super::article_keyword::Entity")]
    ArticleKeywords,

    #[sea_orm(has_one = "super::metrics::Entity")]
    Metrics,
}

impl Related<super::topic::Entity> for Entity {
    fn to() -> RelationDef {
        super::article_topic::Relation::Topic.def()
    }

    fn via() -> Option<RelationDef> {
        Some(super::article_topic::Relation::Article.def().rev())
    }
}

impl Related<super::keyword::Entity> for Entity {
    fn to() -> RelationDef {
        super::article_keyword::Relation::Keyword.def()
    }

    fn via() -> Option<RelationDef> {
        Some(super::article_keyword::Relation::Article.def().rev())
    }
}

impl Related<super::metrics::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Metrics.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
