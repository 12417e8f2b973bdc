//! Language Model adapter
//!
//! Bridges the LlmBackend trait to the core LanguageModel trait, and owns the
//! structured-output path: native JSON mode when the backend supports it,
//! text extraction otherwise, schema validation always.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use outreach_core::{
    FinishReason as CoreFinishReason, GenerateRequest, GenerateResponse, LanguageModel, Result,
    TokenUsage,
};

use crate::backend::{FinishReason as BackendFinishReason, GenerationOptions, LlmBackend};
use crate::structured::{parse_structured, SchemaValidator};

/// Adapter that wraps an LlmBackend to implement the core LanguageModel trait.
///
/// # Example
///
/// ```ignore
/// let backend = OllamaBackend::new(config)?;
/// let llm: Arc<dyn LanguageModel> = Arc::new(LanguageModelAdapter::new(backend));
/// ```
pub struct LanguageModelAdapter {
    backend: Arc<dyn LlmBackend>,
    model_name: String,
    /// Ask the backend for native JSON on structured calls
    json_mode: bool,
}

impl LanguageModelAdapter {
    pub fn new<B: LlmBackend + 'static>(backend: B) -> Self {
        let model_name = backend.model_name().to_string();
        Self {
            backend: Arc::new(backend),
            model_name,
            json_mode: true,
        }
    }

    pub fn from_arc(backend: Arc<dyn LlmBackend>) -> Self {
        let model_name = backend.model_name().to_string();
        Self {
            backend,
            model_name,
            json_mode: true,
        }
    }

    pub fn with_json_mode(mut self, json_mode: bool) -> Self {
        self.json_mode = json_mode;
        self
    }

    fn options(request: &GenerateRequest, json_mode: bool) -> GenerationOptions {
        GenerationOptions {
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            json_mode,
        }
    }

    fn convert_finish_reason(reason: BackendFinishReason) -> CoreFinishReason {
        match reason {
            BackendFinishReason::Stop => CoreFinishReason::Stop,
            BackendFinishReason::Length => CoreFinishReason::Length,
            BackendFinishReason::Error => CoreFinishReason::Error,
        }
    }
}

#[async_trait]
impl LanguageModel for LanguageModelAdapter {
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse> {
        let options = Self::options(&request, request.json_mode);
        let result = self.backend.generate(&request.messages, options).await?;

        tracing::debug!(
            model = %self.model_name,
            completion_tokens = result.completion_tokens,
            total_time_ms = result.total_time_ms,
            "Generation complete"
        );

        Ok(GenerateResponse {
            text: result.text,
            finish_reason: Self::convert_finish_reason(result.finish_reason),
            usage: Some(TokenUsage::new(result.prompt_tokens, result.completion_tokens)),
        })
    }

    async fn generate_structured(&self, request: GenerateRequest, schema: &Value) -> Result<Value> {
        let validator = SchemaValidator::new(schema)?;
        let options = Self::options(&request, self.json_mode || request.json_mode);
        let result = self.backend.generate(&request.messages, options).await?;

        match parse_structured(&result.text, &validator) {
            Ok(value) => Ok(value),
            Err(e) => {
                tracing::warn!(model = %self.model_name, error = %e, "Structured output rejected");
                Err(e.into())
            }
        }
    }

    async fn is_available(&self) -> bool {
        self.backend.is_available().await
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::GenerationResult;
    use crate::LlmError;
    use outreach_core::{Error, Message};
    use parking_lot::Mutex;
    use serde_json::json;

    struct MockBackend {
        response: String,
        last_options: Mutex<Option<GenerationOptions>>,
    }

    impl MockBackend {
        fn new(response: &str) -> Self {
            Self {
                response: response.to_string(),
                last_options: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl LlmBackend for MockBackend {
        async fn generate(
            &self,
            _messages: &[Message],
            options: GenerationOptions,
        ) -> std::result::Result<GenerationResult, LlmError> {
            *self.last_options.lock() = Some(options);
            Ok(GenerationResult {
                text: self.response.clone(),
                prompt_tokens: 20,
                completion_tokens: 10,
                total_time_ms: 100,
                finish_reason: BackendFinishReason::Stop,
            })
        }

        async fn is_available(&self) -> bool {
            true
        }

        fn model_name(&self) -> &str {
            "mock-model"
        }
    }

    struct DownBackend;

    #[async_trait]
    impl LlmBackend for DownBackend {
        async fn generate(
            &self,
            _messages: &[Message],
            _options: GenerationOptions,
        ) -> std::result::Result<GenerationResult, LlmError> {
            Err(LlmError::Network("connection refused".to_string()))
        }

        async fn is_available(&self) -> bool {
            false
        }

        fn model_name(&self) -> &str {
            "down"
        }
    }

    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {"interest": {"type": "string"}},
            "required": ["interest"]
        })
    }

    #[tokio::test]
    async fn test_adapter_generate() {
        let adapter = LanguageModelAdapter::new(MockBackend::new("Hello, world!"));
        let request = GenerateRequest::new("You are helpful").with_user_message("Hi");

        let response = adapter.generate(request).await.unwrap();
        assert_eq!(response.text, "Hello, world!");
        assert_eq!(response.finish_reason, CoreFinishReason::Stop);
        assert_eq!(response.usage.map(|u| u.total_tokens), Some(30));
    }

    #[tokio::test]
    async fn test_structured_scrapes_prose() {
        let backend = Arc::new(MockBackend::new(
            "Here you go: {\"interest\": \"high\"} thanks",
        ));
        let adapter = LanguageModelAdapter::from_arc(backend.clone());

        let value = adapter
            .generate_structured(GenerateRequest::new("Classify"), &schema())
            .await
            .unwrap();
        assert_eq!(value["interest"], "high");
        let options = *backend.last_options.lock();
        assert!(options.map(|o| o.json_mode).unwrap_or(false));
    }

    #[tokio::test]
    async fn test_structured_invalid_output() {
        let adapter = LanguageModelAdapter::new(MockBackend::new("{\"mood\": \"good\"}"));
        let err = adapter
            .generate_structured(GenerateRequest::new("Classify"), &schema())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::GenerationInvalid(_)));
    }

    #[tokio::test]
    async fn test_unreachable_backend_maps_to_unavailable() {
        let adapter = LanguageModelAdapter::new(DownBackend);
        assert!(!adapter.is_available().await);

        let err = adapter
            .generate(GenerateRequest::new("Hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::GenerationUnavailable(_)));
    }
}
