mod state;

use std::{fmt, sync::Arc};

use common::error::AppError;
use serde::Serialize;
use state_machines::core::GuardError;
use tracing::{debug, error, info};

use crate::{
    gateway::ModelGateway,
    retrieval::{self, RetrievalService},
    RetrievedChunk, SourceRef,
};

/// Intent derived from the question text; drives which workflow path runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryIntent {
    Greeting,
    Search,
    Question,
}

impl fmt::Display for QueryIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryIntent::Greeting => write!(f, "greeting"),
            QueryIntent::Search => write!(f, "search"),
            QueryIntent::Question => write!(f, "question"),
        }
    }
}

const GREETING_KEYWORDS: &[&str] = &["hello", "hey"];
const SEARCH_KEYWORDS: &[&str] = &["find", "search", "show", "list"];

/// Case-insensitive substring routing; greeting keywords win over search
/// keywords, anything else is a question.
pub fn classify(query: &str) -> QueryIntent {
    let lowered = query.to_lowercase();

    if GREETING_KEYWORDS.iter().any(|kw| lowered.contains(kw)) {
        return QueryIntent::Greeting;
    }

    if SEARCH_KEYWORDS.iter().any(|kw| lowered.contains(kw)) {
        return QueryIntent::Search;
    }

    QueryIntent::Question
}

pub const GREETING_ANSWER: &str = "Hello! I'm a RAG-powered assistant. \
I can help you find information in the uploaded documents. \
Just ask me a question!";

const NO_DOCUMENTS_ANSWER: &str = "No documents found matching your query.";

/// Result envelope of the classified workflow. Always produced; per-node
/// failures are folded into `error` with a degraded `answer`.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowReply {
    pub answer: String,
    pub question: String,
    pub query_type: QueryIntent,
    pub sources: Vec<SourceRef>,
    pub context_used: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Mutable state threaded through the workflow nodes.
struct WorkflowCtx {
    query: String,
    top_k: usize,
    temperature: f32,
    intent: QueryIntent,
    documents: Vec<RetrievedChunk>,
    context: String,
    sources: Vec<SourceRef>,
    answer: String,
    error: Option<String>,
}

impl WorkflowCtx {
    fn new(query: &str, top_k: usize, temperature: f32) -> Self {
        Self {
            query: query.to_string(),
            top_k,
            temperature,
            intent: QueryIntent::Question,
            documents: Vec::new(),
            context: String::new(),
            sources: Vec::new(),
            answer: String::new(),
            error: None,
        }
    }
}

/// Intent-classifying query workflow.
///
/// The node sequence is enforced by the typestate machine in
/// [`state`]: each event is only callable from the state it belongs to, so an
/// out-of-order driver does not compile.
pub struct QueryWorkflow {
    retrieval: Arc<RetrievalService>,
    gateway: Arc<ModelGateway>,
}

impl QueryWorkflow {
    pub fn new(retrieval: Arc<RetrievalService>, gateway: Arc<ModelGateway>) -> Self {
        Self { retrieval, gateway }
    }

    /// Runs the query through the intent-matched path. Never returns an
    /// error: failures degrade into the reply envelope.
    pub async fn process(&self, query: &str, top_k: usize, temperature: f32) -> WorkflowReply {
        let preview: String = query.chars().take(50).collect();
        info!(query = %preview.replace('\n', " "), "processing query through workflow");

        let mut ctx = WorkflowCtx::new(query, top_k, temperature);

        match self.drive(&mut ctx).await {
            Ok(()) => WorkflowReply {
                answer: ctx.answer,
                question: query.to_string(),
                query_type: ctx.intent,
                sources: ctx.sources,
                context_used: !ctx.context.is_empty(),
                error: ctx.error,
            },
            Err(err) => {
                error!(error = %err, "query workflow failed");
                WorkflowReply {
                    answer: format!("Error processing query: {err}"),
                    question: query.to_string(),
                    query_type: ctx.intent,
                    sources: Vec::new(),
                    context_used: false,
                    error: Some(err.to_string()),
                }
            }
        }
    }

    async fn drive(&self, ctx: &mut WorkflowCtx) -> Result<(), AppError> {
        let machine = state::routing();

        ctx.intent = classify(&ctx.query);
        info!(query_type = %ctx.intent, "query routed");

        match ctx.intent {
            QueryIntent::Greeting => {
                let machine = machine
                    .greet()
                    .map_err(|(_, guard)| map_guard_error("greet", &guard))?;
                greeting_node(ctx);
                let _machine = machine
                    .finish()
                    .map_err(|(_, guard)| map_guard_error("finish", &guard))?;
            }
            QueryIntent::Search => {
                let machine = machine
                    .search()
                    .map_err(|(_, guard)| map_guard_error("search", &guard))?;
                self.search_node(ctx).await;
                let machine = machine
                    .list()
                    .map_err(|(_, guard)| map_guard_error("list", &guard))?;
                listing_node(ctx);
                let _machine = machine
                    .finish()
                    .map_err(|(_, guard)| map_guard_error("finish", &guard))?;
            }
            QueryIntent::Question => {
                let machine = machine
                    .search()
                    .map_err(|(_, guard)| map_guard_error("search", &guard))?;
                self.search_node(ctx).await;
                let machine = machine
                    .format()
                    .map_err(|(_, guard)| map_guard_error("format", &guard))?;
                format_context_node(ctx);
                let machine = machine
                    .generate()
                    .map_err(|(_, guard)| map_guard_error("generate", &guard))?;
                self.generate_answer_node(ctx).await;
                let _machine = machine
                    .finish()
                    .map_err(|(_, guard)| map_guard_error("finish", &guard))?;
            }
        }

        Ok(())
    }

    /// Shared by the search and question paths. Retrieval failure degrades to
    /// an empty document set instead of aborting the workflow.
    async fn search_node(&self, ctx: &mut WorkflowCtx) {
        match self.retrieval.search(&ctx.query, ctx.top_k, 0.0).await {
            Ok(documents) => {
                info!(found = documents.len(), "search node complete");
                ctx.documents = documents;
            }
            Err(err) => {
                error!(error = %err, "search node failed");
                ctx.error = Some(err.to_string());
                ctx.documents = Vec::new();
            }
        }
    }

    /// Calls the gateway; failure substitutes an apologetic answer and never
    /// propagates past this node.
    async fn generate_answer_node(&self, ctx: &mut WorkflowCtx) {
        match self
            .gateway
            .generate_answer(&ctx.query, &ctx.context, ctx.temperature)
            .await
        {
            Ok(generated) => {
                info!("answer generated");
                ctx.answer = generated.answer;
            }
            Err(err) => {
                error!(error = %err, "generate answer node failed");
                ctx.error = Some(err.to_string());
                ctx.answer = format!("Error generating answer: {err}");
            }
        }
    }
}

fn format_context_node(ctx: &mut WorkflowCtx) {
    ctx.context = retrieval::format_context(&ctx.documents);
    ctx.sources = retrieval::sources(&ctx.documents);
    debug!(context_chars = ctx.context.len(), "context formatted");
}

fn greeting_node(ctx: &mut WorkflowCtx) {
    ctx.answer = GREETING_ANSWER.to_string();
    ctx.sources.clear();
    ctx.context.clear();
    info!("greeting response generated");
}

/// Renders a human-readable listing of the matched documents with truncated
/// excerpts.
fn listing_node(ctx: &mut WorkflowCtx) {
    if ctx.documents.is_empty() {
        ctx.answer = NO_DOCUMENTS_ANSWER.to_string();
    } else {
        let entries: Vec<String> = ctx
            .documents
            .iter()
            .enumerate()
            .map(|(i, document)| {
                let excerpt: String = document.content.chars().take(200).collect();
                format!(
                    "{}. {} (relevance: {:.2})\n   {}...",
                    i + 1,
                    document.metadata.filename,
                    document.score,
                    excerpt
                )
            })
            .collect();

        ctx.answer = format!("Found documents:\n\n{}", entries.join("\n\n"));
    }

    info!("search results formatted");
}

fn map_guard_error(event: &str, guard: &GuardError) -> AppError {
    AppError::InternalError(format!(
        "invalid query workflow transition during {event}: {guard:?}"
    ))
}
