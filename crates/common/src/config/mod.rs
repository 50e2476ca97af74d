//! Configuration management for ArticleHub services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config.toml, config.yaml)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Database URL selecting the in-process article store
pub const MEMORY_DATABASE_URL: &str = "memory://";

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Server configuration
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Completion (LLM) service configuration
    #[serde(default)]
    pub llm: LlmConfig,

    /// Graph builder (question answering + document index) configuration
    #[serde(default)]
    pub graph_builder: GraphBuilderConfig,

    /// Article source scraping configuration
    #[serde(default)]
    pub scraper: ScraperConfig,

    /// DOI resolver and Altmetric configuration
    #[serde(default)]
    pub doi: DoiConfig,

    /// Advanced search behaviour
    #[serde(default)]
    pub advanced_search: AdvancedSearchConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Shutdown timeout in seconds
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Primary database URL (for writes), or `memory://`
    pub url: String,

    /// Read replica URL (optional, falls back to primary)
    pub read_url: Option<String>,

    /// Maximum number of connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Idle timeout in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    /// Apply bundled SQL migrations on startup
    #[serde(default = "default_enabled")]
    pub run_migrations: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    /// Chat-completions endpoint
    #[serde(default = "default_llm_endpoint")]
    pub endpoint: String,

    /// API key for the completion service
    pub api_key: Option<String>,

    /// Model to use
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// Request timeout in seconds
    #[serde(default = "default_external_timeout")]
    pub timeout_secs: u64,
}

/// What happens to the database row when graph cleanup is involved in a delete
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CleanupPolicy {
    /// Delete locally, then try the graph index and report the outcome
    #[default]
    BestEffort,
    /// Clean the graph index first; abort the delete when that fails
    Required,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GraphBuilderConfig {
    /// Base URL of the graph builder API
    pub base_url: Option<String>,

    /// Neo4j connection forwarded on every call
    #[serde(default = "default_neo4j_uri")]
    pub neo4j_uri: String,

    #[serde(default = "default_neo4j_username")]
    pub neo4j_username: String,

    #[serde(default)]
    pub neo4j_password: String,

    #[serde(default = "default_neo4j_database")]
    pub neo4j_database: String,

    /// Model name the graph builder should use
    #[serde(default = "default_graph_model")]
    pub model: String,

    /// Upload and extract newly imported articles
    #[serde(default = "default_enabled")]
    pub index_on_import: bool,

    /// Ordering of graph cleanup relative to database deletion
    #[serde(default)]
    pub cleanup_policy: CleanupPolicy,

    /// Request timeout in seconds
    #[serde(default = "default_graph_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScraperConfig {
    /// Article detail page; the article id is appended
    #[serde(default = "default_detail_url")]
    pub detail_url: String,

    /// OpenAlex API base URL
    #[serde(default = "default_openalex_url")]
    pub openalex_url: String,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_external_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DoiConfig {
    #[serde(default = "default_doi_resolver_url")]
    pub resolver_url: String,

    #[serde(default = "default_altmetric_url")]
    pub altmetric_url: String,

    #[serde(default = "default_external_timeout")]
    pub timeout_secs: u64,
}

/// Behaviour when query shortening fails
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SummarizationFailurePolicy {
    /// Continue with the original query
    #[default]
    FallBack,
    /// Fail the whole advanced search
    Fail,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AdvancedSearchConfig {
    /// Queries longer than this (in characters) are shortened first
    #[serde(default = "default_shorten_threshold")]
    pub shorten_threshold: usize,

    #[serde(default)]
    pub summarization_failure: SummarizationFailurePolicy,

    /// Retrieval mode sent to the graph builder chat endpoint
    #[serde(default = "default_retrieval_mode")]
    pub retrieval_mode: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error) or a full filter directive
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Service name for logs
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    /// Requests per second (global)
    #[serde(default = "default_rate_limit")]
    pub requests_per_second: u32,

    /// Burst capacity
    #[serde(default = "default_burst")]
    pub burst: u32,

    /// Enable rate limiting
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_request_timeout() -> u64 { 60 }
fn default_shutdown_timeout() -> u64 { 30 }
fn default_max_connections() -> u32 { 20 }
fn default_min_connections() -> u32 { 2 }
fn default_connect_timeout() -> u64 { 10 }
fn default_idle_timeout() -> u64 { 300 }
fn default_llm_endpoint() -> String { "https://api.openai.com/v1/chat/completions".to_string() }
fn default_llm_model() -> String { "gpt-4o-mini".to_string() }
fn default_external_timeout() -> u64 { 30 }
fn default_graph_timeout() -> u64 { 120 }
fn default_neo4j_uri() -> String { "neo4j://localhost:7687".to_string() }
fn default_neo4j_username() -> String { "neo4j".to_string() }
fn default_neo4j_database() -> String { "neo4j".to_string() }
fn default_graph_model() -> String { "openai_gpt_4o_mini".to_string() }
fn default_detail_url() -> String {
    "https://www.periodicos.capes.gov.br/index.php/acervo/buscador.html?task=detalhes&source=&id=".to_string()
}
fn default_openalex_url() -> String { "https://api.openalex.org".to_string() }
fn default_user_agent() -> String { concat!("articlehub/", env!("CARGO_PKG_VERSION")).to_string() }
fn default_doi_resolver_url() -> String { "https://doi.org/".to_string() }
fn default_altmetric_url() -> String { "https://api.altmetric.com/v1/doi/".to_string() }
fn default_shorten_threshold() -> usize { 50 }
fn default_retrieval_mode() -> String { "graph_vector_fulltext".to_string() }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_metrics_port() -> u16 { 9090 }
fn default_service_name() -> String { "articlehub".to_string() }
fn default_rate_limit() -> u32 { 50 }
fn default_burst() -> u32 { 100 }
fn default_enabled() -> bool { true }

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: default_llm_endpoint(),
            api_key: None,
            model: default_llm_model(),
            timeout_secs: default_external_timeout(),
        }
    }
}

impl Default for GraphBuilderConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            neo4j_uri: default_neo4j_uri(),
            neo4j_username: default_neo4j_username(),
            neo4j_password: String::new(),
            neo4j_database: default_neo4j_database(),
            model: default_graph_model(),
            index_on_import: default_enabled(),
            cleanup_policy: CleanupPolicy::default(),
            timeout_secs: default_graph_timeout(),
        }
    }
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            detail_url: default_detail_url(),
            openalex_url: default_openalex_url(),
            user_agent: default_user_agent(),
            timeout_secs: default_external_timeout(),
        }
    }
}

impl Default for DoiConfig {
    fn default() -> Self {
        Self {
            resolver_url: default_doi_resolver_url(),
            altmetric_url: default_altmetric_url(),
            timeout_secs: default_external_timeout(),
        }
    }
}

impl Default for AdvancedSearchConfig {
    fn default() -> Self {
        Self {
            shorten_threshold: default_shorten_threshold(),
            summarization_failure: SummarizationFailurePolicy::default(),
            retrieval_mode: default_retrieval_mode(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            metrics_port: default_metrics_port(),
            service_name: default_service_name(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: default_rate_limit(),
            burst: default_burst(),
            enabled: default_enabled(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Start with defaults
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?

            // Load base config file
            .add_source(File::with_name("config/default").required(false))

            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))

            // Load local overrides
            .add_source(File::with_name("config/local").required(false))

            // Load from environment variables with APP__ prefix
            // e.g., APP__SERVER__PORT=8081
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            )

            .build()?;

        config.try_deserialize()
    }

    /// Load from an explicit file (format taken from its extension), then `APP__*` overrides
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            )
            .build()?;

        config.try_deserialize()
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout_secs)
    }

    /// Get the read database URL (falls back to primary)
    pub fn read_database_url(&self) -> &str {
        self.database.read_url.as_deref().unwrap_or(&self.database.url)
    }

    /// Whether the in-process store was requested instead of Postgres
    pub fn uses_memory_store(&self) -> bool {
        self.database.url.starts_with(MEMORY_DATABASE_URL)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: default_host(),
                port: default_port(),
                request_timeout_secs: default_request_timeout(),
                shutdown_timeout_secs: default_shutdown_timeout(),
            },
            database: DatabaseConfig {
                url: "postgres://localhost/articlehub".to_string(),
                read_url: None,
                max_connections: default_max_connections(),
                min_connections: default_min_connections(),
                connect_timeout_secs: default_connect_timeout(),
                idle_timeout_secs: default_idle_timeout(),
                run_migrations: default_enabled(),
            },
            llm: LlmConfig::default(),
            graph_builder: GraphBuilderConfig::default(),
            scraper: ScraperConfig::default(),
            doi: DoiConfig::default(),
            advanced_search: AdvancedSearchConfig::default(),
            observability: ObservabilityConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}
