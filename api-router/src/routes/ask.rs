use axum::{extract::State, response::IntoResponse, Json};
use query_engine::{AnswerResult, QueryMetrics, WorkflowReply};
use serde::Deserialize;
use tracing::info;

use crate::{api_state::ApiState, error::ApiError};

#[derive(Debug, Clone, Deserialize)]
pub struct AskRequest {
    pub question: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default)]
    pub score_threshold: f32,
}

fn default_top_k() -> usize {
    4
}

fn default_temperature() -> f32 {
    0.7
}

impl AskRequest {
    /// Parameter bounds are enforced here, before anything reaches the
    /// engine.
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.question.trim().is_empty() {
            return Err(ApiError::ValidationError(
                "question must not be empty".to_string(),
            ));
        }

        if !(1..=10).contains(&self.top_k) {
            return Err(ApiError::ValidationError(
                "top_k must be between 1 and 10".to_string(),
            ));
        }

        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ApiError::ValidationError(
                "temperature must be between 0.0 and 2.0".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.score_threshold) {
            return Err(ApiError::ValidationError(
                "score_threshold must be between 0.0 and 1.0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Linear retrieve-then-generate path.
pub async fn ask_question(
    State(state): State<ApiState>,
    Json(request): Json<AskRequest>,
) -> Result<impl IntoResponse, ApiError> {
    request.validate()?;

    info!(top_k = request.top_k, "received ask request");

    let result = state
        .pipeline
        .ask(
            &request.question,
            request.top_k,
            request.temperature,
            request.score_threshold,
        )
        .await;

    Ok(Json(result))
}

/// Intent-classifying workflow path; `score_threshold` is not used here.
pub async fn ask_classified(
    State(state): State<ApiState>,
    Json(request): Json<AskRequest>,
) -> Result<impl IntoResponse, ApiError> {
    request.validate()?;

    info!(top_k = request.top_k, "received classified ask request");

    let reply = state
        .workflow
        .process(&request.question, request.top_k, request.temperature)
        .await;

    Ok(Json(reply_to_result(reply)))
}

fn reply_to_result(reply: WorkflowReply) -> AnswerResult {
    let documents_found = reply.sources.len();

    AnswerResult {
        answer: reply.answer,
        question: reply.question,
        sources: reply.sources,
        context_used: reply.context_used,
        model: None,
        metrics: QueryMetrics {
            documents_found,
            query_type: Some(reply.query_type),
            ..QueryMetrics::default()
        },
        error: reply.error,
    }
}
