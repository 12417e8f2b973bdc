//! Language Model trait

use async_trait::async_trait;
use serde_json::Value;

use crate::{GenerateRequest, GenerateResponse, Result};

/// Generation capability
///
/// Implementations:
/// - `LanguageModelAdapter` in `outreach-llm` (Ollama, OpenAI-compatible)
/// - scripted mocks in tests
///
/// # Example
///
/// ```ignore
/// let request = GenerateRequest::new(persona_prompt)
///     .with_user_message("How much does it cost?");
/// let response = llm.generate(request).await?;
/// ```
#[async_trait]
pub trait LanguageModel: Send + Sync + 'static {
    /// Generate free text
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse>;

    /// Generate a JSON value that validates against `schema`.
    ///
    /// Errors with `GenerationInvalid` when the output cannot be parsed or
    /// fails validation, `GenerationUnavailable` when the provider is down.
    async fn generate_structured(&self, request: GenerateRequest, schema: &Value) -> Result<Value>;

    /// Whether the provider is reachable
    async fn is_available(&self) -> bool;

    /// Model name for logging
    fn model_name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    struct MockLlm;

    #[async_trait]
    impl LanguageModel for MockLlm {
        async fn generate(&self, _request: GenerateRequest) -> Result<GenerateResponse> {
            Ok(GenerateResponse::text("Mock response"))
        }

        async fn generate_structured(
            &self,
            _request: GenerateRequest,
            _schema: &Value,
        ) -> Result<Value> {
            Err(Error::GenerationInvalid("not structured".to_string()))
        }

        async fn is_available(&self) -> bool {
            true
        }

        fn model_name(&self) -> &str {
            "mock-llm"
        }
    }

    #[tokio::test]
    async fn test_mock_llm() {
        let llm = MockLlm;
        assert!(llm.is_available().await);
        assert_eq!(llm.model_name(), "mock-llm");

        let request = GenerateRequest::new("Test").with_user_message("Hello");
        let response = llm.generate(request).await.unwrap();
        assert_eq!(response.text, "Mock response");

        let err = llm
            .generate_structured(GenerateRequest::default(), &serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::GenerationInvalid(_)));
    }
}
