//! Generation capability for the call orchestrator
//!
//! Features:
//! - Backend support (Ollama, OpenAI-compatible)
//! - Adapter implementing the core `LanguageModel` trait
//! - Structured output: JSON extraction and schema validation, kept here so
//!   no other crate handles raw model text
//! - Prompt assembly with context-window trimming

pub mod adapter;
pub mod backend;
pub mod factory;
pub mod prompt;
pub mod structured;

pub use adapter::LanguageModelAdapter;
pub use backend::{
    BackendConfig, GenerationOptions, GenerationResult, LlmBackend, OllamaBackend, OpenAIBackend,
    OpenAIConfig,
};
pub use factory::LlmFactory;
pub use prompt::PromptBuilder;
pub use structured::{extract_json, SchemaValidator};

use thiserror::Error;

/// LLM errors
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("API error: {0}")]
    Api(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Schema violation: {0}")]
    Schema(String),

    #[error("Timeout")]
    Timeout,

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl LlmError {
    /// Whether the provider could not be reached at all
    pub fn is_unavailable(&self) -> bool {
        matches!(self, LlmError::Network(_) | LlmError::Timeout | LlmError::Api(_))
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout
        } else {
            LlmError::Network(err.to_string())
        }
    }
}

impl From<LlmError> for outreach_core::Error {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::Network(_) | LlmError::Timeout | LlmError::Api(_) => {
                outreach_core::Error::GenerationUnavailable(err.to_string())
            }
            LlmError::InvalidResponse(_) | LlmError::Schema(_) => {
                outreach_core::Error::GenerationInvalid(err.to_string())
            }
            LlmError::Configuration(msg) => outreach_core::Error::Config(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_mapping() {
        let err: outreach_core::Error = LlmError::Timeout.into();
        assert!(matches!(err, outreach_core::Error::GenerationUnavailable(_)));

        let err: outreach_core::Error = LlmError::Schema("missing interest".into()).into();
        assert!(matches!(err, outreach_core::Error::GenerationInvalid(_)));
    }
}
