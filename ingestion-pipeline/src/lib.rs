pub mod chunking;
pub mod ingestor;

pub use chunking::{suggested_chunk_size, ChunkingService, PreparedChunk};
pub use ingestor::{IngestReceipt, Ingestor};
