use std::{sync::Arc, time::Duration};

use common::{
    storage::db::SurrealDbClient,
    utils::{config::AppConfig, embedding::EmbeddingProvider},
};
use ingestion_pipeline::{ChunkingService, Ingestor};
use query_engine::{
    CompletionBackend, ModelGateway, OpenAiBackend, QueryPipeline, QueryWorkflow,
    ResponseCache, RetrievalService,
};
use tracing::info;

#[derive(Clone)]
pub struct ApiState {
    pub db: Arc<SurrealDbClient>,
    pub config: AppConfig,
    pub ingestor: Arc<Ingestor>,
    pub pipeline: Arc<QueryPipeline>,
    pub workflow: Arc<QueryWorkflow>,
}

impl ApiState {
    /// Composition root for the query engine: wires store, embeddings, cache
    /// and gateway together from configuration.
    pub async fn new(config: &AppConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let db = Arc::new(
            SurrealDbClient::new(
                &config.surrealdb_address,
                &config.surrealdb_username,
                &config.surrealdb_password,
                &config.surrealdb_namespace,
                &config.surrealdb_database,
            )
            .await?,
        );

        db.ensure_initialized(config.embedding_dimensions as usize)
            .await?;

        let openai_client = Arc::new(async_openai::Client::with_config(
            async_openai::config::OpenAIConfig::new()
                .with_api_key(&config.openai_api_key)
                .with_api_base(&config.openai_base_url),
        ));

        let embedding_provider = Arc::new(EmbeddingProvider::from_config(
            config,
            Some(Arc::clone(&openai_client)),
        )?);
        info!(
            embedding_backend = embedding_provider.backend_label(),
            embedding_dimension = embedding_provider.dimension(),
            "Embedding provider initialized"
        );

        let chunking = ChunkingService::from_config(config)?;
        let ingestor = Arc::new(Ingestor::new(
            Arc::clone(&db),
            Arc::clone(&embedding_provider),
            chunking,
        ));

        let retrieval = Arc::new(RetrievalService::new(
            Arc::clone(&db),
            Arc::clone(&embedding_provider),
        ));

        let cache = Arc::new(ResponseCache::new(
            config.cache_max_entries,
            Duration::from_secs(config.cache_ttl_secs),
        ));
        let backend: Arc<dyn CompletionBackend> = Arc::new(OpenAiBackend::new(
            openai_client,
            config.completion_model.clone(),
        ));
        let gateway = Arc::new(ModelGateway::new(backend, cache));

        let pipeline = Arc::new(QueryPipeline::new(
            Arc::clone(&retrieval),
            Arc::clone(&gateway),
        ));
        let workflow = Arc::new(QueryWorkflow::new(retrieval, gateway));

        Ok(Self {
            db,
            config: config.clone(),
            ingestor,
            pipeline,
            workflow,
        })
    }
}
