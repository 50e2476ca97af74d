//! SeaORM entity models
//!
//! Database entities for ArticleHub

mod article;
mod article_keyword;
mod article_topic;
mod citation;
mod keyword;
mod metrics;
mod topic;

pub use article::{
    document_name,
    Entity as ArticleEntity,
    Model as Article,
    ActiveModel as ArticleActiveModel,
    Column as ArticleColumn,
    ArticleStatus,
};

pub use topic::{
    Entity as TopicEntity,
    Model as Topic,
    ActiveModel as TopicActiveModel,
    Column as TopicColumn,
};

pub use article_topic::{
    Entity as ArticleTopicEntity,
    Model as ArticleTopic,
    ActiveModel as ArticleTopicActiveModel,
    Column as ArticleTopicColumn,
};

pub use keyword::{
    Entity as KeywordEntity,
    Model as Keyword,
    ActiveModel as KeywordActiveModel,
    Column as KeywordColumn,
};

pub use article_keyword::{
    Entity as ArticleKeywordEntity,
    Model as ArticleKeyword,
    ActiveModel as ArticleKeywordActiveModel,
    Column as ArticleKeywordColumn,
};

pub use citation::{
    Entity as CitationEntity,
    Model as Citation,
    ActiveModel as CitationActiveModel,
    Column as CitationColumn,
};

pub use metrics::{
    Entity as MetricsEntity,
    Model as ArticleMetrics,
    ActiveModel as MetricsActiveModel,
    Column as MetricsColumn,
};
