//! Filter parameter normalization
//!
//! Turns the raw, possibly repeated, possibly absent query-string pairs of a listing
//! request into a typed [`ArticleFilter`]. Parsing is permissive: malformed numbers and
//! booleans fall back to "absent" or to the defaults, nothing here ever fails.

use super::sort::SortDirection;
use crate::db::models::ArticleStatus;

/// Default page window size
pub const DEFAULT_PAGE_SIZE: u64 = 10;

/// Largest page window a caller may request
pub const MAX_PAGE_SIZE: u64 = 100;

/// Sort key used when the request names none
pub const DEFAULT_SORT_BY: &str = "createdAt";

/// Raw query-string pairs in request order
#[derive(Debug, Clone, Default)]
pub struct RawParams {
    pairs: Vec<(String, String)>,
}

impl RawParams {
    pub fn new(pairs: Vec<(String, String)>) -> Self {
        Self { pairs }
    }

    /// First value for `key`, trimmed; empty values count as absent
    pub fn first(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.trim())
            .find(|v| !v.is_empty())
    }

    /// Every non-empty value for a repeated `key`
    pub fn all(&self, key: &str) -> Vec<String> {
        self.pairs
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.trim())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .collect()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for RawParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::new(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Normalized listing filter
#[derive(Debug, Clone, PartialEq)]
pub struct ArticleFilter {
    pub title: Option<String>,
    pub authors: Vec<String>,
    pub publication_year_from: Option<i32>,
    pub publication_year_to: Option<i32>,
    pub topics: Vec<String>,
    pub language: Option<String>,
    pub is_open_access: Option<bool>,
    pub peer_reviewed: Option<bool>,
    pub publication_type: Option<String>,
    /// Canonical (uppercase) status
    pub status: Option<String>,
    pub journal_name: Option<String>,
    pub page: u64,
    pub page_size: u64,
    /// Not validated here; the executor checks it against the sortable fields
    pub sort_by: String,
    pub sort_order: SortDirection,
}

impl Default for ArticleFilter {
    fn default() -> Self {
        Self {
            title: None,
            authors: Vec::new(),
            publication_year_from: None,
            publication_year_to: None,
            topics: Vec::new(),
            language: None,
            is_open_access: None,
            peer_reviewed: None,
            publication_type: None,
            status: None,
            journal_name: None,
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
            sort_by: DEFAULT_SORT_BY.to_string(),
            sort_order: SortDirection::Desc,
        }
    }
}

impl ArticleFilter {
    /// Normalize raw request parameters
    pub fn from_params(params: &RawParams) -> Self {
        let owned = |key: &str| params.first(key).map(str::to_string);

        Self {
            title: owned("title"),
            authors: params.all("authors"),
            publication_year_from: params.first("publicationYearFrom").and_then(parse_year),
            publication_year_to: params.first("publicationYearTo").and_then(parse_year),
            topics: params.all("topics"),
            language: owned("language"),
            is_open_access: params.first("isOpenAccess").and_then(parse_flag),
            peer_reviewed: params.first("peerReviewed").and_then(parse_flag),
            publication_type: owned("publicationType"),
            status: params.first("status").map(ArticleStatus::canonicalize),
            journal_name: owned("journalName"),
            page: normalize_page(params.first("page")),
            page_size: normalize_page_size(params.first("pageSize")),
            sort_by: owned("sortBy").unwrap_or_else(|| DEFAULT_SORT_BY.to_string()),
            sort_order: SortDirection::from_param(params.first("sortOrder")),
        }
    }

    /// Rows skipped before the page window
    pub fn offset(&self) -> u64 {
        (self.page - 1).saturating_mul(self.page_size)
    }

    /// Whether any row-restricting criterion is present
    pub fn has_criteria(&self) -> bool {
        self.title.is_some()
            || !self.authors.is_empty()
            || self.publication_year_from.is_some()
            || self.publication_year_to.is_some()
            || !self.topics.is_empty()
            || self.language.is_some()
            || self.is_open_access.is_some()
            || self.peer_reviewed.is_some()
            || self.publication_type.is_some()
            || self.status.is_some()
            || self.journal_name.is_some()
    }
}

fn parse_year(raw: &str) -> Option<i32> {
    raw.parse().ok()
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

fn normalize_page(raw: Option<&str>) -> u64 {
    match raw.and_then(|v| v.parse::<i64>().ok()) {
        Some(page) if page >= 1 => page as u64,
        _ => 1,
    }
}

fn normalize_page_size(raw: Option<&str>) -> u64 {
    match raw.and_then(|v| v.parse::<i64>().ok()) {
        Some(size) => size.clamp(1, MAX_PAGE_SIZE as i64) as u64,
        None => DEFAULT_PAGE_SIZE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> RawParams {
        pairs.iter().copied().collect()
    }

    #[test]
    fn test_defaults_when_nothing_supplied() {
        let filter = ArticleFilter::from_params(&RawParams::default());
        assert_eq!(filter, ArticleFilter::default());
        assert!(!filter.has_criteria());
        assert_eq!(filter.offset(), 0);
    }

    #[test]
    fn test_title_trimmed_and_empty_is_absent() {
        let filter = ArticleFilter::from_params(&params(&[("title", "  neural nets ")]));
        assert_eq!(filter.title.as_deref(), Some("neural nets"));

        let filter = ArticleFilter::from_params(&params(&[("title", "   ")]));
        assert_eq!(filter.title, None);
    }

    #[test]
    fn test_repeated_list_parameters() {
        let filter = ArticleFilter::from_params(&params(&[
            ("authors", "Alice Johnson"),
            ("topics", "Machine Learning"),
            ("authors", ""),
            ("authors", "Bob Smith"),
        ]));
        assert_eq!(filter.authors, vec!["Alice Johnson", "Bob Smith"]);
        assert_eq!(filter.topics, vec!["Machine Learning"]);
    }

    #[test]
    fn test_malformed_years_become_absent() {
        let filter = ArticleFilter::from_params(&params(&[
            ("publicationYearFrom", "twenty"),
            ("publicationYearTo", "2021"),
        ]));
        assert_eq!(filter.publication_year_from, None);
        assert_eq!(filter.publication_year_to, Some(2021));
    }

    #[test]
    fn test_inverted_year_range_is_kept() {
        let filter = ArticleFilter::from_params(&params(&[
            ("publicationYearFrom", "2022"),
            ("publicationYearTo", "2010"),
        ]));
        assert_eq!(filter.publication_year_from, Some(2022));
        assert_eq!(filter.publication_year_to, Some(2010));
    }

    #[test]
    fn test_flags_are_tri_state() {
        let filter = ArticleFilter::from_params(&params(&[
            ("isOpenAccess", "TRUE"),
            ("peerReviewed", "false"),
        ]));
        assert_eq!(filter.is_open_access, Some(true));
        assert_eq!(filter.peer_reviewed, Some(false));

        let filter = ArticleFilter::from_params(&params(&[("isOpenAccess", "maybe")]));
        assert_eq!(filter.is_open_access, None);
        assert_eq!(filter.peer_reviewed, None);
    }

    #[test]
    fn test_status_is_canonicalized() {
        let filter = ArticleFilter::from_params(&params(&[("status", "published")]));
        assert_eq!(filter.status.as_deref(), Some("PUBLISHED"));
    }

    #[test]
    fn test_page_clamping() {
        let filter = ArticleFilter::from_params(&params(&[("page", "0"), ("pageSize", "500")]));
        assert_eq!(filter.page, 1);
        assert_eq!(filter.page_size, MAX_PAGE_SIZE);

        let filter = ArticleFilter::from_params(&params(&[("page", "-3"), ("pageSize", "0")]));
        assert_eq!(filter.page, 1);
        assert_eq!(filter.page_size, 1);

        let filter = ArticleFilter::from_params(&params(&[("page", "abc"), ("pageSize", "x")]));
        assert_eq!(filter.page, 1);
        assert_eq!(filter.page_size, DEFAULT_PAGE_SIZE);

        let filter = ArticleFilter::from_params(&params(&[("page", "3"), ("pageSize", "25")]));
        assert_eq!(filter.offset(), 50);
    }

    #[test]
    fn test_sort_parameters() {
        let filter = ArticleFilter::from_params(&params(&[("sortBy", "title"), ("sortOrder", "asc")]));
        assert_eq!(filter.sort_by, "title");
        assert_eq!(filter.sort_order, SortDirection::Asc);

        let filter = ArticleFilter::from_params(&params(&[("sortOrder", "up")]));
        assert_eq!(filter.sort_by, DEFAULT_SORT_BY);
        assert_eq!(filter.sort_order, SortDirection::Desc);
    }
}
