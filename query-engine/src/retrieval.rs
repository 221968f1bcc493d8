use std::sync::Arc;

use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::{
            document_chunk::{ChunkMetadata, DocumentChunk},
            StoredObject,
        },
    },
    utils::embedding::EmbeddingProvider,
};
use serde::Deserialize;
use tracing::{debug, info};

use crate::{RetrievedChunk, SourceRef};

/// Context rendered when retrieval comes back empty.
pub const EMPTY_CONTEXT_SENTINEL: &str = "No relevant information found.";

/// HNSW search width for the KNN operator.
const KNN_EF: usize = 40;

/// Issues similarity queries against the vector store and shapes the results
/// for prompting and provenance.
pub struct RetrievalService {
    db: Arc<SurrealDbClient>,
    embedding: Arc<EmbeddingProvider>,
}

#[derive(Debug, Deserialize)]
struct ChunkDistanceRow {
    content: String,
    metadata: ChunkMetadata,
    distance: f32,
}

impl RetrievalService {
    pub fn new(db: Arc<SurrealDbClient>, embedding: Arc<EmbeddingProvider>) -> Self {
        Self { db, embedding }
    }

    /// Returns up to `k` chunks scoring at or above `score_threshold`,
    /// ordered by descending relevance. Store errors surface as
    /// `StoreUnavailable` and are not retried here.
    pub async fn search(
        &self,
        query: &str,
        k: usize,
        score_threshold: f32,
    ) -> Result<Vec<RetrievedChunk>, AppError> {
        let preview: String = query.chars().take(120).collect();
        info!(query = %preview.replace('\n', " "), top_k = k, "searching for relevant chunks");

        let embedding = self
            .embedding
            .embed(query)
            .await
            .map_err(|e| AppError::InternalError(format!("failed to embed query: {e}")))?;

        let query_text = format!(
            "SELECT content, metadata, vector::distance::knn() AS distance FROM {} WHERE embedding <|{},{}|> {:?} ORDER BY distance",
            DocumentChunk::table_name(),
            k,
            KNN_EF,
            embedding
        );

        let rows: Vec<ChunkDistanceRow> = self
            .db
            .client
            .query(query_text)
            .await
            .map_err(|e| AppError::StoreUnavailable(e.to_string()))?
            .take(0)
            .map_err(|e| AppError::StoreUnavailable(e.to_string()))?;

        let documents: Vec<RetrievedChunk> = rows
            .into_iter()
            .map(|row| RetrievedChunk {
                content: row.content,
                metadata: row.metadata,
                score: distance_to_score(row.distance),
            })
            .filter(|document| document.score >= score_threshold)
            .take(k)
            .collect();

        for document in &documents {
            debug!(
                filename = %document.metadata.filename,
                score = document.score,
                "retrieved chunk"
            );
        }

        info!(found = documents.len(), "retrieval complete");

        Ok(documents)
    }
}

/// SurrealDB's cosine KNN reports distance (lower is better); the engine's
/// contract is a similarity score in [0, 1] with higher better. The
/// conversion is pinned here so a backend change has one place to touch.
fn distance_to_score(distance: f32) -> f32 {
    if !distance.is_finite() {
        return 0.0;
    }
    (1.0 - distance).clamp(0.0, 1.0)
}

/// Renders retrieved chunks as a numbered, source-labeled context block.
pub fn format_context(documents: &[RetrievedChunk]) -> String {
    if documents.is_empty() {
        return EMPTY_CONTEXT_SENTINEL.to_string();
    }

    let parts: Vec<String> = documents
        .iter()
        .enumerate()
        .map(|(i, document)| {
            let mut header = format!("[Source {}: {}", i + 1, document.metadata.filename);
            if document.score > 0.0 {
                header.push_str(&format!(" - relevance: {:.2}", document.score));
            }
            header.push(']');

            format!("{header}\n{}\n", document.content)
        })
        .collect();

    parts.join("\n---\n")
}

/// Projects retrieved chunks to their provenance entries, in context order.
pub fn sources(documents: &[RetrievedChunk]) -> Vec<SourceRef> {
    documents
        .iter()
        .map(|document| SourceRef {
            filename: document.metadata.filename.clone(),
            file_type: document.metadata.file_type.clone(),
            chunk_id: document.metadata.chunk_index,
            relevance_score: Some(document.score),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    const DIM: usize = 32;

    async fn seeded_service(texts: &[(&str, &str)]) -> RetrievalService {
        let db = Arc::new(
            SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
                .await
                .expect("Failed to start in-memory surrealdb"),
        );
        db.ensure_initialized(DIM).await.expect("init failed");

        let embedding = Arc::new(EmbeddingProvider::new_hashed(DIM));

        for (index, (content, filename)) in texts.iter().enumerate() {
            let vector = embedding.embed(content).await.expect("embed failed");
            let chunk = DocumentChunk::new(
                (*content).to_string(),
                vector,
                ChunkMetadata::new(
                    (*filename).to_string(),
                    "txt".to_string(),
                    index,
                    texts.len(),
                    content.chars().count(),
                    None,
                ),
            );
            db.store_item(chunk).await.expect("store failed");
        }

        RetrievalService::new(db, embedding)
    }

    fn chunk_with_score(content: &str, filename: &str, index: usize, score: f32) -> RetrievedChunk {
        RetrievedChunk {
            content: content.to_string(),
            metadata: ChunkMetadata::new(
                filename.to_string(),
                "txt".to_string(),
                index,
                1,
                content.chars().count(),
                None,
            ),
            score,
        }
    }

    #[tokio::test]
    async fn search_ranks_closest_chunk_first() {
        let service = seeded_service(&[
            ("the sky is blue today", "sky.txt"),
            ("cats purr loudly indoors", "cats.txt"),
        ])
        .await;

        let results = service
            .search("what color is the sky", 4, 0.0)
            .await
            .expect("search failed");

        assert!(!results.is_empty());
        assert_eq!(results[0].metadata.filename, "sky.txt");
        for pair in results.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[tokio::test]
    async fn search_filters_below_threshold() {
        let service = seeded_service(&[
            ("the sky is blue today", "sky.txt"),
            ("cats purr loudly indoors", "cats.txt"),
        ])
        .await;

        let results = service
            .search("the sky is blue today", 4, 0.5)
            .await
            .expect("search failed");

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].metadata.filename, "sky.txt");
        assert!(results[0].score >= 0.5);
    }

    #[tokio::test]
    async fn search_caps_results_at_k() {
        let service = seeded_service(&[
            ("blue sky one", "a.txt"),
            ("blue sky two", "b.txt"),
            ("blue sky three", "c.txt"),
        ])
        .await;

        let results = service
            .search("blue sky", 2, 0.0)
            .await
            .expect("search failed");

        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn search_on_empty_collection_returns_nothing() {
        let service = seeded_service(&[]).await;

        let results = service
            .search("anything at all", 4, 0.0)
            .await
            .expect("search failed");

        assert!(results.is_empty());
    }

    #[test]
    fn distance_conversion_is_clamped() {
        assert_eq!(distance_to_score(0.0), 1.0);
        assert_eq!(distance_to_score(1.0), 0.0);
        assert_eq!(distance_to_score(2.0), 0.0);
        assert_eq!(distance_to_score(f32::NAN), 0.0);
        assert!((distance_to_score(0.25) - 0.75).abs() < 1e-6);
    }

    #[test]
    fn empty_context_uses_sentinel() {
        assert_eq!(format_context(&[]), EMPTY_CONTEXT_SENTINEL);
    }

    #[test]
    fn context_renders_numbered_sources() {
        let documents = vec![
            chunk_with_score("The sky is blue.", "a.txt", 0, 0.9012),
            chunk_with_score("Grass is green.", "b.txt", 1, 0.5),
        ];

        let context = format_context(&documents);

        assert!(context.starts_with("[Source 1: a.txt - relevance: 0.90]\nThe sky is blue.\n"));
        assert!(context.contains("\n---\n"));
        assert!(context.contains("[Source 2: b.txt - relevance: 0.50]\nGrass is green.\n"));
    }

    #[test]
    fn context_omits_relevance_for_zero_scores() {
        let documents = vec![chunk_with_score("Plain text.", "plain.txt", 0, 0.0)];

        let context = format_context(&documents);

        assert!(context.starts_with("[Source 1: plain.txt]\n"));
        assert!(!context.contains("relevance"));
    }

    #[test]
    fn sources_project_metadata_only() {
        let documents = vec![chunk_with_score("Secret content.", "a.txt", 3, 0.8)];

        let refs = sources(&documents);

        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].filename, "a.txt");
        assert_eq!(refs[0].file_type, "txt");
        assert_eq!(refs[0].chunk_id, 3);
        assert_eq!(refs[0].relevance_score, Some(0.8));
        assert!(serde_json::to_string(&refs[0])
            .unwrap()
            .find("Secret content")
            .is_none());
    }
}
