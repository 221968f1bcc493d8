use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Clone, Copy, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackendKind {
    /// OpenAI-compatible embeddings endpoint.
    OpenAI,
    /// Deterministic bag-of-tokens embedding, useful offline and in tests.
    Hashed,
}

fn default_embedding_backend() -> EmbeddingBackendKind {
    EmbeddingBackendKind::OpenAI
}

#[derive(Clone, Deserialize, Debug)]
pub struct AppConfig {
    pub surrealdb_address: String,
    pub surrealdb_username: String,
    pub surrealdb_password: String,
    pub surrealdb_namespace: String,
    pub surrealdb_database: String,
    #[serde(default)]
    pub openai_api_key: String,
    #[serde(default = "default_base_url")]
    pub openai_base_url: String,
    #[serde(default = "default_completion_model")]
    pub completion_model: String,
    #[serde(default = "default_embedding_backend")]
    pub embedding_backend: EmbeddingBackendKind,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_embedding_dimensions")]
    pub embedding_dimensions: u32,
    #[serde(default = "default_collection_name")]
    pub collection_name: String,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_cache_max_entries")]
    pub cache_max_entries: usize,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    #[serde(default = "default_ingest_max_body_bytes")]
    pub ingest_max_body_bytes: usize,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_completion_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_embedding_dimensions() -> u32 {
    1536
}

fn default_collection_name() -> String {
    "documents".to_string()
}

fn default_chunk_size() -> usize {
    1000
}

fn default_chunk_overlap() -> usize {
    200
}

fn default_cache_ttl_secs() -> u64 {
    3600
}

fn default_cache_max_entries() -> usize {
    100
}

fn default_http_port() -> u16 {
    8080
}

fn default_ingest_max_body_bytes() -> usize {
    10 * 1024 * 1024
}

pub fn get_config() -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(Environment::default())
        .build()?;

    config.try_deserialize()
}
