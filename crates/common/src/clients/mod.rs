//! Clients for the services ArticleHub depends on
//!
//! Each external collaborator sits behind a trait so the orchestration code can be
//! exercised with in-process fakes:
//! - [`CompletionClient`]: chat-completion LLM (query shortening, abstract summaries)
//! - [`GraphBuilder`]: graph/vector question answering and document indexing
//! - [`ArticleSource`]: scraping of article metadata and references
//! - [`DoiLookup`]: DOI resolution and Altmetric data

mod completion;
mod doi;
mod graph_builder;
mod scraper;

pub use completion::{
    abstract_summary_prompt, shorten_query_prompt, CompletionClient, MockCompletion,
    OpenAiCompletion, Prompt,
};
pub use doi::{extract_redirect_link, DoiClient, DoiLookup};
pub use graph_builder::{answer_text, GraphBuilder, GraphBuilderClient, GraphResponse};
pub use scraper::{parse_detail_page, parse_openalex_works, ArticleSource, CapesScraper, OpenAlexWorks};

use crate::errors::{AppError, Result};
use std::time::Duration;

/// Shared construction of outbound HTTP clients
pub(crate) fn http_client(timeout_secs: u64, user_agent: Option<&str>) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder().timeout(Duration::from_secs(timeout_secs));
    if let Some(agent) = user_agent {
        builder = builder.user_agent(agent);
    }
    builder.build().map_err(|e| AppError::Internal {
        message: format!("Failed to create HTTP client: {}", e),
    })
}

/// Map a transport failure onto an external service error
pub(crate) fn transport_error(service: &str, err: reqwest::Error) -> AppError {
    AppError::external(service, format!("Request failed: {}", err))
}
