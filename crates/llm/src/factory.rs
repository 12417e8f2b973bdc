//! LLM Factory
//!
//! Creates a `LanguageModel` from the `llm` settings section.
//!
//! ## Example
//! ```ignore
//! let llm = LlmFactory::create(&settings.llm)?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use outreach_config::{LlmConfig, LlmProvider};
use outreach_core::LanguageModel;

use crate::{
    adapter::LanguageModelAdapter,
    backend::{BackendConfig, LlmBackend, OllamaBackend, OpenAIBackend, OpenAIConfig},
    LlmError,
};

/// Factory for creating LLM backends
pub struct LlmFactory;

impl LlmFactory {
    /// Create a LanguageModel from config
    pub fn create(config: &LlmConfig) -> Result<Arc<dyn LanguageModel>, LlmError> {
        let backend = Self::create_backend(config)?;
        tracing::info!(
            provider = ?config.provider,
            model = %config.model,
            endpoint = %config.endpoint,
            "Language model configured"
        );
        Ok(Arc::new(
            LanguageModelAdapter::from_arc(backend).with_json_mode(config.json_mode),
        ))
    }

    /// Create the raw backend
    pub fn create_backend(config: &LlmConfig) -> Result<Arc<dyn LlmBackend>, LlmError> {
        let timeout = Duration::from_millis(config.timeout_ms);
        match config.provider {
            LlmProvider::Ollama => {
                let backend = OllamaBackend::new(BackendConfig {
                    model: config.model.clone(),
                    endpoint: config.endpoint.clone(),
                    max_tokens: config.max_tokens,
                    temperature: config.temperature,
                    timeout,
                    ..Default::default()
                })?;
                Ok(Arc::new(backend))
            }
            LlmProvider::OpenAi => {
                let api_key = config
                    .api_key
                    .clone()
                    .or_else(|| std::env::var("OPENAI_API_KEY").ok())
                    .unwrap_or_default();
                let backend = OpenAIBackend::new(OpenAIConfig {
                    endpoint: config.endpoint.clone(),
                    api_key,
                    model: config.model.clone(),
                    max_tokens: config.max_tokens,
                    temperature: config.temperature,
                    timeout,
                })?;
                Ok(Arc::new(backend))
            }
        }
    }
}
