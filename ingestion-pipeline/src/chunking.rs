use common::{
    error::AppError,
    storage::types::document_chunk::{ChunkMetadata, DocumentMeta, UNKNOWN_FILENAME},
    utils::config::AppConfig,
};
use text_splitter::{ChunkConfig, TextSplitter};
use tracing::{debug, info, warn};

/// A chunk that has been split and stamped with metadata but not yet embedded
/// or persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedChunk {
    pub content: String,
    pub metadata: ChunkMetadata,
}

/// Splits ingested text into bounded, overlapping segments.
///
/// The splitter prefers natural breakpoints (paragraphs, then lines, then
/// sentences, then words) before falling back to character cuts, so a chunk
/// only exceeds `chunk_size` when a single unsplittable token does. Sizes are
/// measured in characters.
pub struct ChunkingService {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl ChunkingService {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, AppError> {
        if chunk_size == 0 {
            return Err(AppError::Validation(
                "chunk_size must be greater than zero".into(),
            ));
        }

        if chunk_overlap >= chunk_size {
            return Err(AppError::Validation(format!(
                "chunk_overlap ({chunk_overlap}) must be smaller than chunk_size ({chunk_size})"
            )));
        }

        info!(chunk_size, chunk_overlap, "ChunkingService initialized");

        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, AppError> {
        Self::new(config.chunk_size, config.chunk_overlap)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Splits `text` and stamps each chunk with positional metadata. Missing
    /// `filename`/`file_type` are backfilled with defaults and logged, never
    /// rejected.
    pub fn split_text(
        &self,
        text: &str,
        meta: &DocumentMeta,
    ) -> Result<Vec<PreparedChunk>, AppError> {
        let chunk_config = ChunkConfig::new(self.chunk_size)
            .with_overlap(self.chunk_overlap)
            .map_err(|e| AppError::Validation(format!("invalid chunk overlap: {e}")))?;
        let splitter = TextSplitter::new(chunk_config);

        let mut pieces: Vec<String> = splitter.chunks(text).map(str::to_owned).collect();

        if pieces.is_empty() {
            pieces.push(String::new());
        }

        let total_chunks = pieces.len();
        let chunks = pieces
            .into_iter()
            .enumerate()
            .map(|(index, content)| {
                let filename = match &meta.filename {
                    Some(filename) => filename.clone(),
                    None => {
                        warn!(chunk_index = index, "chunk missing 'filename' metadata");
                        UNKNOWN_FILENAME.to_string()
                    }
                };
                let file_type = match &meta.file_type {
                    Some(file_type) => file_type.clone(),
                    None => {
                        warn!(chunk_index = index, "chunk missing 'file_type' metadata");
                        String::new()
                    }
                };

                let chunk_size = content.chars().count();
                debug!(
                    chunk_index = index,
                    filename = %filename,
                    chunk_size,
                    "prepared chunk"
                );

                PreparedChunk {
                    metadata: ChunkMetadata::new(
                        filename,
                        file_type,
                        index,
                        total_chunks,
                        chunk_size,
                        meta.page_number,
                    ),
                    content,
                }
            })
            .collect::<Vec<_>>();

        info!(chunk_count = chunks.len(), "split text into chunks");

        Ok(chunks)
    }
}

/// Advisory mapping from input length to a chunk size that tends to retrieve
/// well. A policy hook for callers; not applied automatically.
pub fn suggested_chunk_size(text_length: usize) -> usize {
    if text_length < 1000 {
        256
    } else if text_length < 5000 {
        512
    } else if text_length < 20000 {
        1024
    } else {
        2048
    }
}
