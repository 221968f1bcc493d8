use std::sync::Arc;

use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::document_chunk::{DocumentChunk, DocumentMeta},
    },
    utils::embedding::EmbeddingProvider,
};
use tracing::{debug, info};

use crate::chunking::ChunkingService;

/// Outcome of a successful ingestion: how many chunks were written and under
/// which ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReceipt {
    pub chunk_count: usize,
    pub chunk_ids: Vec<String>,
}

/// Ingestion entry point: split, embed, persist.
pub struct Ingestor {
    db: Arc<SurrealDbClient>,
    embedding: Arc<EmbeddingProvider>,
    chunking: ChunkingService,
}

impl Ingestor {
    pub fn new(
        db: Arc<SurrealDbClient>,
        embedding: Arc<EmbeddingProvider>,
        chunking: ChunkingService,
    ) -> Self {
        Self {
            db,
            embedding,
            chunking,
        }
    }

    /// Splits `text`, embeds every chunk and stores the results. Absent
    /// optional metadata never fails the request; store errors surface as
    /// `StoreUnavailable`.
    pub async fn ingest(
        &self,
        text: &str,
        meta: DocumentMeta,
    ) -> Result<IngestReceipt, AppError> {
        let text_chars = text.chars().count();
        info!(
            text_chars,
            filename = meta.filename.as_deref().unwrap_or_default(),
            "ingesting text"
        );

        let prepared = self.chunking.split_text(text, &meta)?;

        let contents: Vec<String> = prepared.iter().map(|c| c.content.clone()).collect();
        let embeddings = self.embedding.embed_batch(contents).await?;

        if embeddings.len() != prepared.len() {
            return Err(AppError::InternalError(format!(
                "embedding count mismatch: {} chunks, {} embeddings",
                prepared.len(),
                embeddings.len()
            )));
        }

        let mut chunk_ids = Vec::with_capacity(prepared.len());
        for (chunk, embedding) in prepared.into_iter().zip(embeddings) {
            let record = DocumentChunk::new(chunk.content, embedding, chunk.metadata);
            let id = record.id.clone();

            self.db
                .store_item(record)
                .await
                .map_err(|e| AppError::StoreUnavailable(e.to_string()))?;

            debug!(chunk_id = %id, "stored document chunk");
            chunk_ids.push(id);
        }

        info!(chunk_count = chunk_ids.len(), "ingestion complete");

        Ok(IngestReceipt {
            chunk_count: chunk_ids.len(),
            chunk_ids,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::storage::types::document_chunk::UNKNOWN_FILENAME;
    use uuid::Uuid;

    async fn test_ingestor() -> (Ingestor, Arc<SurrealDbClient>) {
        let db = Arc::new(
            SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
                .await
                .expect("Failed to start in-memory surrealdb"),
        );
        let embedding = Arc::new(EmbeddingProvider::new_hashed(16));
        let chunking = ChunkingService::new(50, 10).expect("valid chunking config");

        (
            Ingestor::new(Arc::clone(&db), embedding, chunking),
            db,
        )
    }

    #[tokio::test]
    async fn ingest_persists_all_chunks() {
        let (ingestor, db) = test_ingestor().await;

        let text = "The sky is blue. The grass is green. The sun is bright. \
                    Water is wet and stones are hard.";
        let receipt = ingestor
            .ingest(text, DocumentMeta::named("facts.txt"))
            .await
            .expect("ingest failed");

        assert!(receipt.chunk_count > 1);
        assert_eq!(receipt.chunk_ids.len(), receipt.chunk_count);

        let stored: Vec<DocumentChunk> = db.get_all_stored_items().await.expect("select failed");
        assert_eq!(stored.len(), receipt.chunk_count);
        for chunk in &stored {
            assert_eq!(chunk.embedding.len(), 16);
            assert_eq!(chunk.metadata.filename, "facts.txt");
        }
    }

    #[tokio::test]
    async fn ingest_backfills_missing_metadata() {
        let (ingestor, db) = test_ingestor().await;

        ingestor
            .ingest("a short note", DocumentMeta::default())
            .await
            .expect("ingest failed");

        let stored: Vec<DocumentChunk> = db.get_all_stored_items().await.expect("select failed");
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].metadata.filename, UNKNOWN_FILENAME);
        assert_eq!(stored[0].metadata.file_type, "");
    }

    #[tokio::test]
    async fn ingest_assigns_dense_chunk_indices() {
        let (ingestor, db) = test_ingestor().await;

        let text = "one two three four five six seven eight nine ten eleven \
                    twelve thirteen fourteen fifteen sixteen seventeen";
        let receipt = ingestor
            .ingest(text, DocumentMeta::named("numbers.txt"))
            .await
            .expect("ingest failed");

        let mut stored: Vec<DocumentChunk> =
            db.get_all_stored_items().await.expect("select failed");
        stored.sort_by_key(|chunk| chunk.metadata.chunk_index);

        for (expected, chunk) in stored.iter().enumerate() {
            assert_eq!(chunk.metadata.chunk_index, expected);
            assert_eq!(chunk.metadata.total_chunks, receipt.chunk_count);
        }
    }
}
