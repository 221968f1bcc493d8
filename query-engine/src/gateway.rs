use std::sync::Arc;

use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestSystemMessage, ChatCompletionRequestUserMessage,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use common::error::AppError;
use tracing::{debug, info};

use crate::cache::{response_cache_key, CachedAnswer, ResponseCache};

/// Instructions for grounded answering: answer from the context, decline when
/// the context is insufficient.
pub const ANSWER_SYSTEM_PROMPT: &str = "You are a helpful AI assistant. \
Use the following context to answer the user's question. \
If you cannot find the answer in the context, say so honestly. \
Do not make up information.";

pub fn build_user_message(context: &str, question: &str) -> String {
    format!("Context:\n{context}\n\nQuestion: {question}\n\nAnswer:")
}

/// Seam to the model-serving collaborator: one completion call at a
/// caller-chosen temperature.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(
        &self,
        system: &str,
        user: &str,
        temperature: f32,
    ) -> Result<String, AppError>;

    fn model_name(&self) -> &str;
}

/// Chat-completions backend for OpenAI-compatible endpoints.
pub struct OpenAiBackend {
    client: Arc<Client<OpenAIConfig>>,
    model: String,
}

impl OpenAiBackend {
    pub fn new(client: Arc<Client<OpenAIConfig>>, model: String) -> Self {
        Self { client, model }
    }
}

#[async_trait]
impl CompletionBackend for OpenAiBackend {
    async fn complete(
        &self,
        system: &str,
        user: &str,
        temperature: f32,
    ) -> Result<String, AppError> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .temperature(temperature)
            .messages([
                ChatCompletionRequestSystemMessage::from(system).into(),
                ChatCompletionRequestUserMessage::from(user).into(),
            ])
            .build()
            .map_err(|e| AppError::GenerationUnavailable(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| AppError::GenerationUnavailable(e.to_string()))?;

        response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| {
                AppError::GenerationUnavailable("no content in model response".into())
            })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// The answer a gateway call produced, cached or fresh.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedAnswer {
    pub answer: String,
    pub model: String,
    pub temperature: f32,
}

/// Owns the prompt template and the response cache in front of the completion
/// backend. Backend failures surface as `GenerationUnavailable` and are not
/// retried here.
pub struct ModelGateway {
    backend: Arc<dyn CompletionBackend>,
    cache: Arc<ResponseCache>,
}

impl ModelGateway {
    pub fn new(backend: Arc<dyn CompletionBackend>, cache: Arc<ResponseCache>) -> Self {
        Self { backend, cache }
    }

    pub async fn generate_answer(
        &self,
        question: &str,
        context: &str,
        temperature: f32,
    ) -> Result<GeneratedAnswer, AppError> {
        let preview: String = question.chars().take(50).collect();
        info!(question = %preview, "generating answer");

        let key = response_cache_key(question, context, temperature);

        if let Some(cached) = self.cache.get(&key).await {
            info!(
                key_prefix = key.get(..8).unwrap_or(&key),
                "answer served from cache"
            );
            return Ok(GeneratedAnswer {
                answer: cached.answer,
                model: cached.model,
                temperature: cached.temperature,
            });
        }

        let user_message = build_user_message(context, question);
        let text = self
            .backend
            .complete(ANSWER_SYSTEM_PROMPT, &user_message, temperature)
            .await?;

        let answer = text.trim().to_string();
        debug!(answer_chars = answer.len(), "answer generated");

        let model = self.backend.model_name().to_string();
        self.cache
            .insert(
                key,
                CachedAnswer {
                    answer: answer.clone(),
                    model: model.clone(),
                    temperature,
                },
            )
            .await;

        Ok(GeneratedAnswer {
            answer,
            model,
            temperature,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    use super::*;

    struct MockBackend {
        reply: String,
        calls: AtomicUsize,
        fail: bool,
    }

    impl MockBackend {
        fn answering(reply: &str) -> Self {
            Self {
                reply: reply.to_string(),
                calls: AtomicUsize::new(0),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                reply: String::new(),
                calls: AtomicUsize::new(0),
                fail: true,
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CompletionBackend for MockBackend {
        async fn complete(
            &self,
            _system: &str,
            _user: &str,
            _temperature: f32,
        ) -> Result<String, AppError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(AppError::GenerationUnavailable(
                    "connection refused".into(),
                ));
            }
            Ok(self.reply.clone())
        }

        fn model_name(&self) -> &str {
            "mock-model"
        }
    }

    fn gateway(backend: Arc<MockBackend>) -> ModelGateway {
        let cache = Arc::new(ResponseCache::new(16, Duration::from_secs(60)));
        ModelGateway::new(backend, cache)
    }

    #[tokio::test]
    async fn repeated_question_hits_the_cache() {
        let backend = Arc::new(MockBackend::answering("The sky is blue."));
        let gateway = gateway(Arc::clone(&backend));

        let first = gateway
            .generate_answer("What color is the sky?", "ctx", 0.0)
            .await
            .unwrap();
        let second = gateway
            .generate_answer("What color is the sky?", "ctx", 0.0)
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test]
    async fn near_identical_temperatures_share_a_key() {
        let backend = Arc::new(MockBackend::answering("answer"));
        let gateway = gateway(Arc::clone(&backend));

        gateway.generate_answer("q", "c", 0.7).await.unwrap();
        let hit = gateway.generate_answer("q", "c", 0.7004).await.unwrap();

        // The cached entry keeps the temperature of the original call.
        assert_eq!(hit.temperature, 0.7);
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test]
    async fn different_temperature_misses_the_cache() {
        let backend = Arc::new(MockBackend::answering("answer"));
        let gateway = gateway(Arc::clone(&backend));

        gateway.generate_answer("q", "c", 0.0).await.unwrap();
        gateway.generate_answer("q", "c", 1.0).await.unwrap();

        assert_eq!(backend.call_count(), 2);
    }

    #[tokio::test]
    async fn whitespace_in_answer_is_trimmed() {
        let backend = Arc::new(MockBackend::answering("  padded answer \n"));
        let gateway = gateway(backend);

        let generated = gateway.generate_answer("q", "c", 0.5).await.unwrap();
        assert_eq!(generated.answer, "padded answer");
        assert_eq!(generated.model, "mock-model");
    }

    #[tokio::test]
    async fn backend_failure_surfaces_as_generation_unavailable() {
        let backend = Arc::new(MockBackend::failing());
        let gateway = gateway(Arc::clone(&backend));

        let err = gateway
            .generate_answer("q", "c", 0.5)
            .await
            .expect_err("expected failure");

        assert!(matches!(err, AppError::GenerationUnavailable(_)));
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test]
    async fn failures_are_not_cached() {
        let backend = Arc::new(MockBackend::failing());
        let gateway = gateway(Arc::clone(&backend));

        let _ = gateway.generate_answer("q", "c", 0.5).await;
        let _ = gateway.generate_answer("q", "c", 0.5).await;

        assert_eq!(backend.call_count(), 2);
    }
}
