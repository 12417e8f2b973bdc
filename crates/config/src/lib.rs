//! Configuration management for the outbound call orchestrator
//!
//! Supports loading configuration from:
//! - YAML/TOML files (`config/default`, `config/{env}`)
//! - Environment variables (`OUTREACH__` prefix, `__` separator)
//! - A standalone phrase file for [`PromptsConfig`]

pub mod constants;
pub mod prompts;
pub mod settings;

pub use prompts::{render_template, PromptsConfig};
pub use settings::{
    load_settings, load_settings_from, BackoffKind, ConversationConfig, CorsConfig, LlmConfig, LlmProvider,
    ObservabilityConfig, PersistenceConfig, RuntimeEnvironment, ServerConfig, Settings,
    TelephonyConfig,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}
