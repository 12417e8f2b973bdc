//! Conversation layer for outbound sales calls
//!
//! Features:
//! - Conversation engine: persona resolution, greeting and per-turn replies
//! - Response sanitizer for spoken output
//! - Intent classification into classification deltas
//! - Explicit retry policies per call site
//! - Canned fallbacks, goodbyes and reprompts
//! - Insight and follow-up scheduling after the call

pub mod engine;
pub mod fallback;
pub mod intent;
pub mod retry;
pub mod sanitizer;
pub mod scheduler;

pub use engine::{CallContext, ConversationEngine, EngineConfig, EngineDeps, Persona};
pub use fallback::{fallback_greeting, goodbye, select_fallback, FallbackKind};
pub use intent::IntentClassifier;
pub use retry::{Backoff, RetryPolicy};
pub use sanitizer::{ResponseSanitizer, SanitizeError};
pub use scheduler::{CallSnapshot, FollowUpScheduler};

use thiserror::Error;

/// Agent errors
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Generation unavailable: {0}")]
    Unavailable(String),

    #[error("Sanitizer rejected output: {0}")]
    Sanitize(#[from] SanitizeError),

    #[error("Greeting does not mention {0}")]
    MissingCompanyName(String),

    #[error("Core error: {0}")]
    Core(#[from] outreach_core::Error),
}

impl From<AgentError> for outreach_core::Error {
    fn from(err: AgentError) -> Self {
        match err {
            AgentError::Unavailable(msg) => outreach_core::Error::GenerationUnavailable(msg),
            AgentError::Sanitize(e) => outreach_core::Error::GenerationInvalid(e.to_string()),
            AgentError::MissingCompanyName(name) => {
                outreach_core::Error::GenerationInvalid(format!("greeting missing {}", name))
            }
            AgentError::Core(e) => e,
        }
    }
}
