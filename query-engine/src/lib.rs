pub mod cache;
pub mod gateway;
pub mod pipeline;
pub mod retrieval;
pub mod workflow;

use common::storage::types::document_chunk::ChunkMetadata;
use serde::Serialize;

pub use cache::{response_cache_key, CachedAnswer, ResponseCache};
pub use gateway::{CompletionBackend, GeneratedAnswer, ModelGateway, OpenAiBackend};
pub use pipeline::QueryPipeline;
pub use retrieval::RetrievalService;
pub use workflow::{QueryIntent, QueryWorkflow, WorkflowReply};

/// Transient copy of a stored chunk plus its relevance score. The store keeps
/// ownership of the full record; the engine only carries what prompting and
/// provenance need.
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub content: String,
    pub metadata: ChunkMetadata,
    pub score: f32,
}

/// Provenance projection exposed to callers; never carries chunk content.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceRef {
    pub filename: String,
    pub file_type: String,
    pub chunk_id: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relevance_score: Option<f32>,
}

/// Timing and volume measurements for a single query. The linear pipeline
/// fills the wall-clock fields; the classified workflow reports the intent.
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueryMetrics {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_time: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_time: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_time: Option<f64>,
    pub documents_found: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_type: Option<QueryIntent>,
}

/// Uniform result envelope. Internal failures are encoded in `error` with a
/// degraded `answer`; the engine never lets them escape as an `Err`.
#[derive(Debug, Clone, Serialize)]
pub struct AnswerResult {
    pub answer: String,
    pub question: String,
    pub sources: Vec<SourceRef>,
    pub context_used: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub metrics: QueryMetrics,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
