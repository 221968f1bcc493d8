use axum::{extract::State, response::IntoResponse, Json};
use common::storage::types::document_chunk::DocumentChunk;
use serde::Serialize;

use crate::{api_state::ApiState, error::ApiError};

#[derive(Debug, Serialize)]
pub struct CollectionStats {
    pub name: String,
    pub document_count: usize,
}

pub async fn collection_stats(
    State(state): State<ApiState>,
) -> Result<impl IntoResponse, ApiError> {
    let document_count = DocumentChunk::count(&state.db).await?;

    Ok(Json(CollectionStats {
        name: state.config.collection_name.clone(),
        document_count,
    }))
}
