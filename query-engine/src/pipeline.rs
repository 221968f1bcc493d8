use std::{sync::Arc, time::Instant};

use common::error::AppError;
use tracing::{error, info};

use crate::{
    gateway::ModelGateway,
    retrieval::{self, RetrievalService},
    AnswerResult, QueryMetrics,
};

/// Answer returned when retrieval finds nothing; the model is not invoked.
pub const NO_INFO_ANSWER: &str =
    "I couldn't find any relevant information in the database to answer your question.";

/// Linear retrieve-then-generate orchestration, used when intent
/// classification is not wanted. Reports wall-clock timings for both stages.
pub struct QueryPipeline {
    retrieval: Arc<RetrievalService>,
    gateway: Arc<ModelGateway>,
}

impl QueryPipeline {
    pub fn new(retrieval: Arc<RetrievalService>, gateway: Arc<ModelGateway>) -> Self {
        Self { retrieval, gateway }
    }

    /// Always returns an envelope: failures are folded into `error` with an
    /// apology answer and whatever timing was captured before the failure.
    pub async fn ask(
        &self,
        question: &str,
        top_k: usize,
        temperature: f32,
        score_threshold: f32,
    ) -> AnswerResult {
        let started = Instant::now();

        let preview: String = question.chars().take(100).collect();
        info!(
            question = %preview.replace('\n', " "),
            top_k,
            temperature,
            "processing question"
        );

        let search_started = Instant::now();
        let documents = match self
            .retrieval
            .search(question, top_k, score_threshold)
            .await
        {
            Ok(documents) => documents,
            Err(err) => return failure_result(question, &err, None, started),
        };
        let search_time = search_started.elapsed().as_secs_f64();

        info!(
            search_time,
            found = documents.len(),
            "search completed"
        );

        if documents.is_empty() {
            return AnswerResult {
                answer: NO_INFO_ANSWER.to_string(),
                question: question.to_string(),
                sources: Vec::new(),
                context_used: false,
                model: None,
                metrics: QueryMetrics {
                    search_time: Some(search_time),
                    generation_time: Some(0.0),
                    total_time: Some(started.elapsed().as_secs_f64()),
                    documents_found: 0,
                    ..QueryMetrics::default()
                },
                error: None,
            };
        }

        let context = retrieval::format_context(&documents);
        let sources = retrieval::sources(&documents);

        info!(
            context_chars = context.len(),
            source_count = sources.len(),
            "context formatted"
        );

        let generation_started = Instant::now();
        let generated = match self
            .gateway
            .generate_answer(question, &context, temperature)
            .await
        {
            Ok(generated) => generated,
            Err(err) => return failure_result(question, &err, Some(search_time), started),
        };
        let generation_time = generation_started.elapsed().as_secs_f64();

        let total_time = started.elapsed().as_secs_f64();
        info!(generation_time, total_time, "question processed successfully");

        AnswerResult {
            answer: generated.answer,
            question: question.to_string(),
            context_used: true,
            model: Some(generated.model),
            metrics: QueryMetrics {
                search_time: Some(search_time),
                generation_time: Some(generation_time),
                total_time: Some(total_time),
                documents_found: documents.len(),
                context_length: Some(context.chars().count()),
                ..QueryMetrics::default()
            },
            sources,
            error: None,
        }
    }
}

fn failure_result(
    question: &str,
    err: &AppError,
    search_time: Option<f64>,
    started: Instant,
) -> AnswerResult {
    error!(error = %err, "query pipeline failed");

    AnswerResult {
        answer: format!("I encountered an error while processing your question: {err}"),
        question: question.to_string(),
        sources: Vec::new(),
        context_used: false,
        model: None,
        metrics: QueryMetrics {
            search_time,
            total_time: Some(started.elapsed().as_secs_f64()),
            documents_found: 0,
            ..QueryMetrics::default()
        },
        error: Some(err.to_string()),
    }
}
