//! Error types shared across the workspace
//!
//! The first five variants are the call-handling taxonomy. Only
//! `GenerationUnavailable` (during session initialization) and
//! `MalformedWebhook` are allowed to cut a call short; every other variant is
//! absorbed by a fallback somewhere up the stack.

use thiserror::Error;

/// Result alias using the core error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The generation capability could not be reached at all
    #[error("Generation unavailable: {0}")]
    GenerationUnavailable(String),

    /// The capability responded but the output failed sanitization/validation
    #[error("Generation invalid: {0}")]
    GenerationInvalid(String),

    /// Lead/task/company data could not be read
    #[error("Context lookup failed: {0}")]
    ContextLookupFailed(String),

    /// Write-back of classification, notes or follow-ups failed
    #[error("Persistence failed: {0}")]
    PersistenceFailed(String),

    /// Webhook without a call identifier
    #[error("Malformed webhook: {0}")]
    MalformedWebhook(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether this error must terminate the call instead of being absorbed
    pub fn is_call_fatal(&self) -> bool {
        matches!(
            self,
            Error::GenerationUnavailable(_) | Error::MalformedWebhook(_)
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_fatal_variants() {
        assert!(Error::GenerationUnavailable("down".into()).is_call_fatal());
        assert!(Error::MalformedWebhook("no CallId".into()).is_call_fatal());
        assert!(!Error::GenerationInvalid("bad".into()).is_call_fatal());
        assert!(!Error::ContextLookupFailed("lead".into()).is_call_fatal());
        assert!(!Error::PersistenceFailed("task".into()).is_call_fatal());
    }

    #[test]
    fn test_display() {
        let err = Error::ContextLookupFailed("lead L1".to_string());
        assert_eq!(err.to_string(), "Context lookup failed: lead L1");
    }
}
