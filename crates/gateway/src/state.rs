//! Shared application state

use std::sync::Arc;

use articlehub_common::{
    advanced::AdvancedSearch,
    clients::{
        ArticleSource, CapesScraper, CompletionClient, DoiClient, DoiLookup, GraphBuilder,
        GraphBuilderClient, MockCompletion, OpenAiCompletion,
    },
    config::AppConfig,
    db::{ArticleStore, DbPool, MemoryStore, Repository},
    errors::Result,
    import::ArticleService,
};
use tracing::{info, warn};

/// API key value selecting the offline completion client
const MOCK_API_KEY: &str = "mock";

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn ArticleStore>,
    pub articles: Arc<ArticleService>,
    pub advanced: Arc<AdvancedSearch>,
    pub doi: Arc<dyn DoiLookup>,
}

impl AppState {
    /// Wire services from already-built collaborators
    pub fn new(
        config: AppConfig,
        store: Arc<dyn ArticleStore>,
        source: Arc<dyn ArticleSource>,
        graph: Option<Arc<dyn GraphBuilder>>,
        completion: Arc<dyn CompletionClient>,
        doi: Arc<dyn DoiLookup>,
    ) -> Self {
        let articles = ArticleService::new(
            store.clone(),
            source,
            graph.clone(),
            completion.clone(),
            &config.graph_builder,
        );
        let advanced = AdvancedSearch::new(
            store.clone(),
            graph,
            completion,
            config.advanced_search.clone(),
        );

        Self {
            config: Arc::new(config),
            store,
            articles: Arc::new(articles),
            advanced: Arc::new(advanced),
            doi,
        }
    }

    /// Connect the store and build every external client from configuration
    pub async fn from_config(config: AppConfig) -> Result<Self> {
        let store: Arc<dyn ArticleStore> = if config.uses_memory_store() {
            info!("Using in-memory article store");
            Arc::new(MemoryStore::new())
        } else {
            info!("Connecting to database...");
            let pool = DbPool::new(&config.database).await?;
            if config.database.run_migrations {
                pool.migrate().await?;
                info!("Database migrations applied");
            }
            Arc::new(Repository::new(pool))
        };

        let completion: Arc<dyn CompletionClient> =
            if config.llm.api_key.as_deref() == Some(MOCK_API_KEY) {
                info!("Using mock completion client");
                Arc::new(MockCompletion)
            } else {
                Arc::new(OpenAiCompletion::new(config.llm.clone())?)
            };

        let graph: Option<Arc<dyn GraphBuilder>> =
            match GraphBuilderClient::from_config(&config.graph_builder)? {
                Some(client) => Some(Arc::new(client)),
                None => {
                    warn!("graph_builder.base_url not set; advanced search and graph indexing disabled");
                    None
                }
            };

        let source = Arc::new(CapesScraper::new(config.scraper.clone())?);
        let doi = Arc::new(DoiClient::new(config.doi.clone())?);

        Ok(Self::new(config, store, source, graph, completion, doi))
    }
}
