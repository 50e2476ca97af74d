//! Predicate tree and builder
//!
//! A storage-independent description of which articles a listing selects. The builder is a
//! pure function of [`ArticleFilter`]; each store translates the tree into its own query
//! form (a SeaORM `Condition` for Postgres, [`Predicate::matches`] for the in-memory store).

use serde::Serialize;

use super::filter::ArticleFilter;
use crate::db::models::Article;

/// Scalar text columns a predicate may match on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TextField {
    Title,
    Abstract,
    Language,
    PublicationType,
    JournalName,
}

/// Text comparison; both modes ignore case
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TextMode {
    Contains,
    Equals,
}

/// List-valued attributes tested for membership
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MemberField {
    /// Exact, case-sensitive element of the author list
    Authors,
    /// Name of any associated topic, case-insensitive
    TopicNames,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RangeField {
    PublicationYear,
}

/// Exact equality tests
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "field", content = "value")]
pub enum EqualityMatch {
    OpenAccess(bool),
    PeerReviewed(bool),
    /// Canonical status string
    Status(String),
}

/// Composable filter tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "op")]
pub enum Predicate {
    /// Conjunction; empty matches every row
    And { operands: Vec<Predicate> },
    /// Disjunction; empty matches no row
    Or { operands: Vec<Predicate> },
    TextMatch {
        field: TextField,
        mode: TextMode,
        value: String,
    },
    /// True when any of `any_of` is present in the field
    SetMembership {
        field: MemberField,
        any_of: Vec<String>,
    },
    /// Inclusive bounds; an absent value never matches a bounded range
    RangeMatch {
        field: RangeField,
        min: Option<i32>,
        max: Option<i32>,
    },
    Equality(EqualityMatch),
}

/// An article together with the relation data a predicate can reference
#[derive(Debug, Clone, Copy)]
pub struct ArticleRow<'a> {
    pub article: &'a Article,
    pub topic_names: &'a [String],
}

impl Predicate {
    pub fn match_all() -> Self {
        Predicate::And { operands: Vec::new() }
    }

    pub fn is_match_all(&self) -> bool {
        matches!(self, Predicate::And { operands } if operands.is_empty())
    }

    /// Evaluate against a single row
    pub fn matches(&self, row: &ArticleRow<'_>) -> bool {
        match self {
            Predicate::And { operands } => operands.iter().all(|p| p.matches(row)),
            Predicate::Or { operands } => operands.iter().any(|p| p.matches(row)),
            Predicate::TextMatch { field, mode, value } => {
                let Some(haystack) = text_value(row.article, *field) else {
                    return false;
                };
                let haystack = haystack.to_lowercase();
                let needle = value.to_lowercase();
                match mode {
                    TextMode::Contains => haystack.contains(&needle),
                    TextMode::Equals => haystack == needle,
                }
            }
            Predicate::SetMembership { field, any_of } => match field {
                MemberField::Authors => any_of.iter().any(|a| row.article.authors.contains(a)),
                MemberField::TopicNames => any_of.iter().any(|wanted| {
                    row.topic_names
                        .iter()
                        .any(|name| name.to_lowercase() == wanted.to_lowercase())
                }),
            },
            Predicate::RangeMatch { field, min, max } => {
                let value = match field {
                    RangeField::PublicationYear => row.article.publication_year,
                };
                match value {
                    Some(v) => min.map_or(true, |lo| v >= lo) && max.map_or(true, |hi| v <= hi),
                    None => min.is_none() && max.is_none(),
                }
            }
            Predicate::Equality(eq) => match eq {
                EqualityMatch::OpenAccess(flag) => row.article.is_open_access == *flag,
                EqualityMatch::PeerReviewed(flag) => row.article.peer_reviewed == *flag,
                EqualityMatch::Status(status) => row.article.status == *status,
            },
        }
    }
}

fn text_value(article: &Article, field: TextField) -> Option<&str> {
    match field {
        TextField::Title => Some(article.title.as_str()),
        TextField::Abstract => Some(article.abstract_text.as_str()),
        TextField::Language => Some(article.language.as_str()),
        TextField::PublicationType => article.publication_type.as_deref(),
        TextField::JournalName => article.journal_name.as_deref(),
    }
}

/// Build the predicate tree for a normalized filter
///
/// Title and author criteria share one OR-group: a row matching the title text or any
/// listed author satisfies it. Every other criterion is an independent AND operand.
pub fn build_predicate(filter: &ArticleFilter) -> Predicate {
    let mut and = Vec::new();
    let mut any_of = Vec::new();

    if let Some(title) = &filter.title {
        any_of.push(Predicate::TextMatch {
            field: TextField::Title,
            mode: TextMode::Contains,
            value: title.clone(),
        });
        any_of.push(Predicate::TextMatch {
            field: TextField::Abstract,
            mode: TextMode::Contains,
            value: title.clone(),
        });
    }

    for author in &filter.authors {
        any_of.push(Predicate::SetMembership {
            field: MemberField::Authors,
            any_of: vec![author.clone()],
        });
    }

    if !any_of.is_empty() {
        and.push(Predicate::Or { operands: any_of });
    }

    if filter.publication_year_from.is_some() || filter.publication_year_to.is_some() {
        and.push(Predicate::RangeMatch {
            field: RangeField::PublicationYear,
            min: filter.publication_year_from,
            max: filter.publication_year_to,
        });
    }

    if !filter.topics.is_empty() {
        and.push(Predicate::SetMembership {
            field: MemberField::TopicNames,
            any_of: filter.topics.clone(),
        });
    }

    if let Some(language) = &filter.language {
        and.push(Predicate::TextMatch {
            field: TextField::Language,
            mode: TextMode::Equals,
            value: language.clone(),
        });
    }

    if let Some(flag) = filter.is_open_access {
        and.push(Predicate::Equality(EqualityMatch::OpenAccess(flag)));
    }

    if let Some(flag) = filter.peer_reviewed {
        and.push(Predicate::Equality(EqualityMatch::PeerReviewed(flag)));
    }

    if let Some(publication_type) = &filter.publication_type {
        and.push(Predicate::TextMatch {
            field: TextField::PublicationType,
            mode: TextMode::Equals,
            value: publication_type.clone(),
        });
    }

    if let Some(status) = &filter.status {
        and.push(Predicate::Equality(EqualityMatch::Status(status.clone())));
    }

    if let Some(journal) = &filter.journal_name {
        and.push(Predicate::TextMatch {
            field: TextField::JournalName,
            mode: TextMode::Contains,
            value: journal.clone(),
        });
    }

    Predicate::And { operands: and }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::search::filter::RawParams;
    use chrono::{TimeZone, Utc};

    pub(crate) fn article(id: &str, title: &str, authors: &[&str]) -> Article {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap().fixed_offset();
        Article {
            id: id.to_string(),
            title: title.to_string(),
            abstract_text: String::new(),
            language: "English".to_string(),
            authors: authors.iter().map(|a| a.to_string()).collect(),
            institutions: Vec::new(),
            volume: None,
            issue: None,
            publication_year: Some(2020),
            publication_type: Some("Journal Article".to_string()),
            journal_name: Some("Journal of Testing".to_string()),
            publisher_name: None,
            doi: None,
            issn: None,
            status: "PUBLISHED".to_string(),
            is_open_access: true,
            peer_reviewed: false,
            created_at: ts,
            updated_at: ts,
        }
    }

    fn build(pairs: &[(&str, &str)]) -> Predicate {
        let params: RawParams = pairs.iter().copied().collect();
        build_predicate(&ArticleFilter::from_params(&params))
    }

    fn row<'a>(article: &'a Article, topics: &'a [String]) -> ArticleRow<'a> {
        ArticleRow { article, topic_names: topics }
    }

    #[test]
    fn test_no_filters_matches_all() {
        let predicate = build(&[]);
        assert!(predicate.is_match_all());
        let a = article("W1", "Anything", &[]);
        assert!(predicate.matches(&row(&a, &[])));
    }

    #[test]
    fn test_title_and_authors_share_one_or_group() {
        let predicate = build(&[("title", "quantum"), ("authors", "Bob")]);
        let Predicate::And { operands } = &predicate else {
            panic!("expected conjunction");
        };
        assert_eq!(operands.len(), 1);
        let Predicate::Or { operands: group } = &operands[0] else {
            panic!("expected disjunction");
        };
        assert_eq!(group.len(), 3);

        let by_title = article("W1", "Quantum Effects", &["Alice"]);
        let by_author = article("W2", "Classical Mechanics", &["Bob"]);
        let neither = article("W3", "Classical Mechanics", &["Carol"]);
        assert!(predicate.matches(&row(&by_title, &[])));
        assert!(predicate.matches(&row(&by_author, &[])));
        assert!(!predicate.matches(&row(&neither, &[])));
    }

    #[test]
    fn test_title_matches_abstract_case_insensitively() {
        let predicate = build(&[("title", "GRAPHENE")]);
        let mut a = article("W1", "Carbon lattices", &[]);
        a.abstract_text = "A study of graphene sheets".into();
        assert!(predicate.matches(&row(&a, &[])));
    }

    #[test]
    fn test_author_membership_is_exact() {
        let predicate = build(&[("authors", "B")]);
        let a = article("W1", "T", &["A", "B"]);
        let b = article("W2", "T", &["Bb"]);
        assert!(predicate.matches(&row(&a, &[])));
        assert!(!predicate.matches(&row(&b, &[])));
    }

    #[test]
    fn test_year_range_is_anded() {
        let predicate = build(&[
            ("title", "x"),
            ("publicationYearFrom", "2021"),
            ("publicationYearTo", "2023"),
        ]);
        let mut a = article("W1", "x marks", &[]);
        assert!(!predicate.matches(&row(&a, &[])));
        a.publication_year = Some(2022);
        assert!(predicate.matches(&row(&a, &[])));
        a.publication_year = None;
        assert!(!predicate.matches(&row(&a, &[])));
    }

    #[test]
    fn test_inverted_range_matches_nothing() {
        let predicate = build(&[("publicationYearFrom", "2022"), ("publicationYearTo", "2010")]);
        let a = article("W1", "T", &[]);
        assert!(!predicate.matches(&row(&a, &[])));
    }

    #[test]
    fn test_topics_membership_ignores_case() {
        let predicate = build(&[("topics", "machine learning"), ("topics", "Robotics")]);
        let a = article("W1", "T", &[]);
        let tagged = vec!["Machine Learning".to_string()];
        assert!(predicate.matches(&row(&a, &tagged)));
        assert!(!predicate.matches(&row(&a, &[])));
    }

    #[test]
    fn test_scalar_filters() {
        let a = article("W1", "T", &[]);
        assert!(build(&[("language", "english")]).matches(&row(&a, &[])));
        assert!(!build(&[("language", "engl")]).matches(&row(&a, &[])));
        assert!(build(&[("journalName", "testing")]).matches(&row(&a, &[])));
        assert!(build(&[("publicationType", "journal article")]).matches(&row(&a, &[])));
        assert!(build(&[("status", "published")]).matches(&row(&a, &[])));
        assert!(!build(&[("status", "draft")]).matches(&row(&a, &[])));
        assert!(build(&[("isOpenAccess", "true")]).matches(&row(&a, &[])));
        assert!(!build(&[("peerReviewed", "true")]).matches(&row(&a, &[])));
    }

    #[test]
    fn test_missing_journal_never_matches() {
        let mut a = article("W1", "T", &[]);
        a.journal_name = None;
        assert!(!build(&[("journalName", "x")]).matches(&row(&a, &[])));
    }

    #[test]
    fn test_tree_serializes_with_tags() {
        let json = serde_json::to_value(build(&[("isOpenAccess", "false")])).unwrap();
        assert_eq!(json["op"], "and");
        assert_eq!(json["operands"][0]["op"], "equality");
        assert_eq!(json["operands"][0]["field"], "openAccess");
        assert_eq!(json["operands"][0]["value"], false);
    }
}
