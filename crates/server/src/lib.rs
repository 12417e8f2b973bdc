//! Outreach Server
//!
//! Telephony webhook endpoints for outbound sales calls, plus health,
//! metrics and session introspection.

pub mod http;
pub mod metrics;
pub mod session;
pub mod state;
pub mod twiml;
pub mod voice;

pub use http::create_router;
pub use crate::metrics::{init_metrics, metrics_handler};
pub use session::{CallSession, InMemorySessionRegistry, SessionRegistry, SessionSummary, SharedSession};
pub use state::AppState;
pub use twiml::{Gather, VoiceResponse};

use thiserror::Error;

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Session error: {0}")]
    Session(String),

    #[error("Session capacity reached ({0} active calls)")]
    Capacity(usize),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Markup rendering failed: {0}")]
    Render(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<ServerError> for axum::http::StatusCode {
    fn from(err: ServerError) -> Self {
        match err {
            ServerError::Session(_) => axum::http::StatusCode::NOT_FOUND,
            ServerError::Capacity(_) => axum::http::StatusCode::SERVICE_UNAVAILABLE,
            ServerError::InvalidRequest(_) => axum::http::StatusCode::BAD_REQUEST,
            ServerError::Render(_) => axum::http::StatusCode::INTERNAL_SERVER_ERROR,
            ServerError::Internal(_) => axum::http::StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ServerError> for outreach_core::Error {
    fn from(err: ServerError) -> Self {
        match err {
            ServerError::InvalidRequest(msg) => outreach_core::Error::MalformedWebhook(msg),
            other => outreach_core::Error::Internal(other.to_string()),
        }
    }
}

impl From<quick_xml::Error> for ServerError {
    fn from(err: quick_xml::Error) -> Self {
        ServerError::Render(err.to_string())
    }
}

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        ServerError::Render(err.to_string())
    }
}
