//! Topic entity (optionally hierarchical)

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "topics")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[sea_orm(column_type = "Text", unique)]
    pub name: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,

    pub parent_id: Option<Uuid>,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "Entity",
        from = "Column::ParentId",
        to = "Column::Id",
        on_delete = "SetNull"
    )]
    Parent,

    #[sea_orm(has_many = "super::article_topic::Entity")]
    ArticleTopics,
}

impl Related<super::article::Entity> for Entity {
    fn to() -> RelationDef {
        super::article_topic::Relation::Article.def()
    }

    fn via() -> Option<RelationDef> {
        Some(super::article_topic::Relation::Topic.def().rev())
    }
}

impl ActiveModelBehavior for ActiveModel {}
