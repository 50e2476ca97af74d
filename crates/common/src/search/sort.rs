//! Sort keys accepted by the article listing

use serde::{Deserialize, Serialize};

/// Direction of the page window ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    /// Only the exact value `asc` selects ascending order
    pub fn from_param(raw: Option<&str>) -> Self {
        match raw {
            Some("asc") => SortDirection::Asc,
            _ => SortDirection::Desc,
        }
    }
}

/// Allowlist of sortable article fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortField {
    CreatedAt,
    UpdatedAt,
    Title,
    PublicationYear,
    JournalName,
    Language,
    PublicationType,
    Status,
}

impl SortField {
    pub const ALL: [SortField; 8] = [
        SortField::CreatedAt,
        SortField::UpdatedAt,
        SortField::Title,
        SortField::PublicationYear,
        SortField::JournalName,
        SortField::Language,
        SortField::PublicationType,
        SortField::Status,
    ];

    /// Resolve a request `sortBy` value; `None` when it is not sortable
    pub fn from_param(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|field| field.as_param() == raw)
    }

    /// Request parameter spelling
    pub fn as_param(&self) -> &'static str {
        match self {
            SortField::CreatedAt => "createdAt",
            SortField::UpdatedAt => "updatedAt",
            SortField::Title => "title",
            SortField::PublicationYear => "publicationYear",
            SortField::JournalName => "journalName",
            SortField::Language => "language",
            SortField::PublicationType => "publicationType",
            SortField::Status => "status",
        }
    }
}

/// Resolved ordering of a page window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortSpec {
    pub field: SortField,
    pub direction: SortDirection,
}

impl Default for SortSpec {
    fn default() -> Self {
        Self {
            field: SortField::CreatedAt,
            direction: SortDirection::Desc,
        }
    }
}
