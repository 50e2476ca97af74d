//! ArticleHub Common Library
//!
//! Shared code for the ArticleHub gateway:
//! - Configuration and error types
//! - Database entities and the article storage seam
//! - Article search: filter parsing, predicates, paging and result assembly
//! - Advanced (AI) search orchestration
//! - Import and lifecycle operations
//! - External service clients and metrics

pub mod advanced;
pub mod clients;
pub mod config;
pub mod db;
pub mod errors;
pub mod import;
pub mod metrics;
pub mod search;

// Re-export commonly used types
pub use advanced::AdvancedSearch;
pub use config::AppConfig;
pub use db::{ArticleStore, MemoryStore, Repository};
pub use errors::{AppError, Result};
pub use import::ArticleService;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
