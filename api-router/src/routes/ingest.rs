use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use common::storage::types::document_chunk::DocumentMeta;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{api_state::ApiState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    pub text: String,
    #[serde(default)]
    pub metadata: Option<DocumentMeta>,
}

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub status: String,
    pub chunks_added: usize,
    pub chunk_ids: Vec<String>,
}

pub async fn ingest_text(
    State(state): State<ApiState>,
    Json(request): Json<IngestRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if request.text.trim().is_empty() {
        return Err(ApiError::ValidationError(
            "text must not be empty".to_string(),
        ));
    }

    info!(
        text_bytes = request.text.len(),
        has_metadata = request.metadata.is_some(),
        "received ingestion request"
    );

    let receipt = state
        .ingestor
        .ingest(&request.text, request.metadata.unwrap_or_default())
        .await?;

    Ok((
        StatusCode::OK,
        Json(IngestResponse {
            status: "success".to_string(),
            chunks_added: receipt.chunk_count,
            chunk_ids: receipt.chunk_ids,
        }),
    ))
}
