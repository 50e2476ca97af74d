//! Article search core
//!
//! A listing request flows through four stages: normalize the raw parameters into an
//! [`ArticleFilter`], build a [`Predicate`] tree, execute the counted page query against
//! an [`ArticleStore`], then assemble relations into the response envelope.

mod assembler;
mod executor;
mod filter;
mod predicate;
mod sort;

pub use assembler::{
    assemble_page, attach_relations, fetch_article, ArticleListResponse, ArticleView, Include,
    EMPTY_RESULT_MESSAGE,
};
pub use executor::{execute, resolve_sort, Page};
pub use filter::{ArticleFilter, RawParams, DEFAULT_PAGE_SIZE, DEFAULT_SORT_BY, MAX_PAGE_SIZE};
pub use predicate::{
    build_predicate, ArticleRow, EqualityMatch, MemberField, Predicate, RangeField, TextField,
    TextMode,
};
pub use sort::{SortDirection, SortField, SortSpec};

use std::time::Instant;

use tracing::{info, instrument};

use crate::db::ArticleStore;
use crate::errors::Result;
use crate::metrics;

/// Run a full listing request
#[instrument(skip(store, params))]
pub async fn search_articles(
    store: &dyn ArticleStore,
    params: &RawParams,
) -> Result<ArticleListResponse> {
    let start = Instant::now();
    let filter = ArticleFilter::from_params(params);
    let predicate = build_predicate(&filter);

    let page = execute(store, &predicate, &filter).await?;
    let response = assemble_page(store, page, Include::list()).await?;

    let elapsed = start.elapsed();
    metrics::record_search(filter.has_criteria(), response.data.len(), elapsed);
    info!(
        total = response.total,
        page = response.page,
        returned = response.data.len(),
        filtered = filter.has_criteria(),
        duration_ms = elapsed.as_millis() as u64,
        "Article search completed"
    );

    Ok(response)
}
