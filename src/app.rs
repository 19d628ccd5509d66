//! Application assembly.
//!
//! One explicit value owns the engines and shared state, built at startup
//! and threaded through the HTTP handlers and CLI commands.

use anyhow::Result;
use std::sync::Arc;

use crate::config::Config;
use crate::db;
use crate::embedder::EmbeddingClient;
use crate::indexer::Indexer;
use crate::jobs::JobController;
use crate::keyword_index::KeywordIndex;
use crate::metrics::Metrics;
use crate::rerank::LlmGateway;
use crate::searcher::Searcher;
use crate::vector_index::VectorIndex;

#[derive(Clone)]
pub struct App {
    pub config: Arc<Config>,
    pub embedder: Arc<EmbeddingClient>,
    pub vectors: Arc<VectorIndex>,
    pub keywords: Arc<KeywordIndex>,
    pub searcher: Arc<Searcher>,
    pub indexer: Arc<Indexer>,
    pub jobs: Arc<JobController>,
    pub metrics: Arc<Metrics>,
}

impl App {
    /// Connect both databases, ensure schemas, and wire the engines.
    pub async fn build(config: Config) -> Result<Self> {
        let config = Arc::new(config);
        let metrics = Arc::new(Metrics::new()?);

        let embedder = Arc::new(
            EmbeddingClient::new(&config.embedding)?
                .with_latency_histogram(metrics.embedding_seconds.clone()),
        );

        let vector_pool = db::connect(&config.storage.vector_db_path).await?;
        let keyword_pool = db::connect(&config.storage.keyword_db_path).await?;
        let vectors = Arc::new(VectorIndex::new(vector_pool));
        let keywords = Arc::new(KeywordIndex::new(keyword_pool));

        let llm = Arc::new(LlmGateway::new(&config.llm)?);

        let indexer = Arc::new(Indexer::new(
            Arc::clone(&config),
            Arc::clone(&embedder),
            Arc::clone(&vectors),
            Arc::clone(&keywords),
            Arc::clone(&metrics),
        ));
        indexer.ensure_ready().await?;

        let searcher = Arc::new(Searcher::new(
            Arc::clone(&embedder),
            Arc::clone(&vectors),
            Arc::clone(&keywords),
            Arc::clone(&llm),
            Arc::clone(&config),
            Arc::clone(&metrics),
        ));

        let jobs = Arc::new(JobController::new(
            Arc::clone(&indexer),
            Arc::clone(&metrics),
        ));

        Ok(Self {
            config,
            embedder,
            vectors,
            keywords,
            searcher,
            indexer,
            jobs,
            metrics,
        })
    }
}
