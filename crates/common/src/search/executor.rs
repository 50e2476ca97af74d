//! Paginated query execution

use serde::Serialize;
use tracing::debug;

use super::filter::ArticleFilter;
use super::predicate::Predicate;
use super::sort::{SortField, SortSpec};
use crate::db::models::Article;
use crate::db::ArticleStore;
use crate::errors::{AppError, Result};

/// One page window plus the unpaginated match count
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub rows: Vec<T>,
    pub page: u64,
    pub page_size: u64,
    pub total: u64,
}

impl<T> Page<T> {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Resolve the requested ordering against the sortable fields
pub fn resolve_sort(filter: &ArticleFilter) -> Result<SortSpec> {
    let field = SortField::from_param(&filter.sort_by).ok_or_else(|| {
        AppError::validation("sortBy", format!("Cannot sort by '{}'", filter.sort_by))
    })?;
    Ok(SortSpec {
        field,
        direction: filter.sort_order,
    })
}

/// Count matching rows, then fetch the requested window
///
/// A window past the end of the result set is an empty page, not an error.
pub async fn execute(
    store: &dyn ArticleStore,
    predicate: &Predicate,
    filter: &ArticleFilter,
) -> Result<Page<Article>> {
    let sort = resolve_sort(filter)?;
    let offset = filter.offset();

    let total = store.count(predicate).await?;
    let rows = if offset >= total {
        Vec::new()
    } else {
        store.find_page(predicate, sort, offset, filter.page_size).await?
    };

    debug!(
        total,
        offset,
        returned = rows.len(),
        sort_by = sort.field.as_param(),
        "Executed article page query"
    );

    Ok(Page {
        rows,
        page: filter.page,
        page_size: filter.page_size,
        total,
    })
}
