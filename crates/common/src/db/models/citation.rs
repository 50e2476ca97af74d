//! Citation entity
//!
//! A citation always has a citing article. The cited side is either another stored
//! article (`cited_article_id`) or the external bibliographic fields.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "citations")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Article that contains the citation
    #[sea_orm(column_type = "Text")]
    pub citing_article_id: String,

    /// Stored article being cited, when known
    #[sea_orm(column_type = "Text", nullable)]
    pub cited_article_id: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub cited_title: Option<String>,

    pub cited_authors: Vec<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub cited_journal: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub cited_volume: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub cited_issue: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub cited_pages: Option<String>,

    pub cited_year: Option<i32>,

    #[sea_orm(column_type = "Text", nullable)]
    pub cited_doi: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub cited_url: Option<String>,

    pub created_at: DateTimeWithTimeZone,
}

impl Model {
    /// Whether the cited work is itself stored
    pub fn is_internal(&self) -> bool {
        self.cited_article_id.is_some()
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::article::Entity",
        from = "Column::CitingArticleId",
        to = "super::article::Column::Id",
        on_delete = "Cascade"
    )]
    CitingArticle,

    #[sea_orm(
        belongs_to = "super::article::Entity",
        from = "Column::CitedArticleId",
        to = "super::article::Column::Id",
        on_delete = "Cascade"
    )]
    CitedArticle,
}

impl ActiveModelBehavior for ActiveModel {}
