use chrono::Utc;
use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

/// Fallback used when an ingest request carries no filename.
pub const UNKNOWN_FILENAME: &str = "Unknown";

/// Caller-supplied metadata on an ingest request. Every field is optional;
/// absent values are backfilled with defaults during chunking instead of
/// rejecting the request.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DocumentMeta {
    pub filename: Option<String>,
    pub file_type: Option<String>,
    pub page_number: Option<u32>,
}

impl DocumentMeta {
    pub fn named(filename: impl Into<String>) -> Self {
        Self {
            filename: Some(filename.into()),
            ..Self::default()
        }
    }
}

/// Positional and provenance metadata stamped onto every stored chunk.
///
/// Required fields are resolved once, at construction; readers never need to
/// re-check for absent keys.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ChunkMetadata {
    pub filename: String,
    pub file_type: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub chunk_size: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_number: Option<u32>,
}

impl ChunkMetadata {
    pub fn new(
        filename: String,
        file_type: String,
        chunk_index: usize,
        total_chunks: usize,
        chunk_size: usize,
        page_number: Option<u32>,
    ) -> Self {
        Self {
            filename,
            file_type,
            chunk_index,
            total_chunks,
            chunk_size,
            page_number,
        }
    }
}

stored_object!(DocumentChunk, "document_chunk", {
    content: String,
    embedding: Vec<f32>,
    metadata: ChunkMetadata
});

impl DocumentChunk {
    pub fn new(content: String, embedding: Vec<f32>, metadata: ChunkMetadata) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            content,
            embedding,
            metadata,
        }
    }

    /// Number of stored chunks, used by the collection stats endpoint.
    pub async fn count(db: &SurrealDbClient) -> Result<usize, AppError> {
        #[derive(serde::Deserialize)]
        struct CountRow {
            count: usize,
        }

        let query = format!("SELECT count() FROM {} GROUP ALL", Self::table_name());
        let rows: Vec<CountRow> = db.client.query(query).await?.take(0)?;

        Ok(rows.first().map_or(0, |row| row.count))
    }

    pub async fn delete_by_filename(
        filename: &str,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        let query = format!(
            "DELETE {} WHERE metadata.filename = $filename",
            Self::table_name()
        );
        db.client
            .query(query)
            .bind(("filename", filename.to_owned()))
            .await?;

        Ok(())
    }
}
