//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::constants::{defaults, endpoints, retry, sessions, turns};
use crate::{ConfigError, PromptsConfig};

/// Runtime environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeEnvironment {
    /// Relaxed validation, warnings only
    #[default]
    Development,
    Staging,
    /// All validations enforced
    Production,
}

impl RuntimeEnvironment {
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    pub fn is_strict(&self) -> bool {
        matches!(self, Self::Production | Self::Staging)
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub environment: RuntimeEnvironment,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub conversation: ConversationConfig,

    #[serde(default)]
    pub telephony: TelephonyConfig,

    #[serde(default)]
    pub persistence: PersistenceConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,

    #[serde(default)]
    pub prompts: PromptsConfig,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_server()?;
        self.validate_llm()?;
        self.validate_conversation()?;
        self.prompts.validate()?;
        Ok(())
    }

    fn validate_server(&self) -> Result<(), ConfigError> {
        let server = &self.server;

        if server.port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.port".to_string(),
                message: "Port cannot be 0".to_string(),
            });
        }

        if server.max_sessions == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.max_sessions".to_string(),
                message: "Max sessions must be at least 1".to_string(),
            });
        }

        if server.request_timeout_ms < turns::MIN_REQUEST_TIMEOUT_MS {
            return Err(ConfigError::InvalidValue {
                field: "server.request_timeout_ms".to_string(),
                message: format!(
                    "Must be at least {}, got {}",
                    turns::MIN_REQUEST_TIMEOUT_MS,
                    server.request_timeout_ms
                ),
            });
        }

        if self.environment.is_production() && server.public_base_url.is_none() {
            tracing::warn!(
                "server.public_base_url is not set in production; gather actions will use \
                 relative URLs"
            );
        }

        if self.environment.is_production() && server.cors.enabled && server.cors.origins.is_empty()
        {
            tracing::warn!(
                "CORS is enabled in production but no origins are configured. \
                 This may block legitimate requests."
            );
        }

        Ok(())
    }

    fn validate_llm(&self) -> Result<(), ConfigError> {
        let llm = &self.llm;

        if llm.model.trim().is_empty() {
            return Err(ConfigError::MissingField("llm.model".to_string()));
        }

        if !(0.0..=2.0).contains(&llm.temperature) {
            return Err(ConfigError::InvalidValue {
                field: "llm.temperature".to_string(),
                message: format!("Must be between 0.0 and 2.0, got {}", llm.temperature),
            });
        }

        if llm.provider == LlmProvider::OpenAi
            && llm.api_key.is_none()
            && self.environment.is_strict()
        {
            return Err(ConfigError::MissingField("llm.api_key".to_string()));
        }

        Ok(())
    }

    fn validate_conversation(&self) -> Result<(), ConfigError> {
        let conv = &self.conversation;

        for (field, value) in [
            ("conversation.greeting_attempts", conv.greeting_attempts),
            ("conversation.generation_attempts", conv.generation_attempts),
            ("conversation.classification_attempts", conv.classification_attempts),
        ] {
            if value == 0 || value > retry::MAX_ATTEMPTS {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    message: format!("Must be between 1 and {}, got {}", retry::MAX_ATTEMPTS, value),
                });
            }
        }

        if !(retry::MIN_BACKOFF_MS..=retry::MAX_BACKOFF_MS).contains(&conv.backoff_ms) {
            return Err(ConfigError::InvalidValue {
                field: "conversation.backoff_ms".to_string(),
                message: format!(
                    "Must be between {} and {}, got {}",
                    retry::MIN_BACKOFF_MS,
                    retry::MAX_BACKOFF_MS,
                    conv.backoff_ms
                ),
            });
        }

        if self.llm.timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "llm.timeout_ms".to_string(),
                message: "Must be greater than 0".to_string(),
            });
        }

        // Every attempt may run to the LLM timeout; all of it must fit the turn budget
        let budget = self.server.turn_budget_ms();
        let worst_reply = conv.worst_case_ms(conv.classification_attempts, self.llm.timeout_ms)
            + conv.worst_case_ms(conv.generation_attempts, self.llm.timeout_ms);
        if worst_reply > budget {
            return Err(ConfigError::InvalidValue {
                field: "conversation.generation_attempts".to_string(),
                message: format!(
                    "Worst-case reply {}ms (llm.timeout_ms {} per attempt plus backoff) exceeds \
                     the {}ms turn budget under server.request_timeout_ms {}",
                    worst_reply, self.llm.timeout_ms, budget, self.server.request_timeout_ms
                ),
            });
        }

        // Cold start: availability check, then the greeting attempts
        let worst_greeting =
            self.llm.timeout_ms + conv.worst_case_ms(conv.greeting_attempts, self.llm.timeout_ms);
        if worst_greeting > budget {
            return Err(ConfigError::InvalidValue {
                field: "conversation.greeting_attempts".to_string(),
                message: format!(
                    "Worst-case greeting {}ms exceeds the {}ms turn budget under \
                     server.request_timeout_ms {}",
                    worst_greeting, budget, self.server.request_timeout_ms
                ),
            });
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Absolute base for gather `action` URLs; relative when unset
    #[serde(default)]
    pub public_base_url: Option<String>,

    /// Must stay below the carrier's response window
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    /// Idle sessions older than this are swept
    #[serde(default = "default_session_timeout")]
    pub session_timeout_secs: u64,

    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,

    #[serde(default)]
    pub cors: CorsConfig,
}

impl ServerConfig {
    /// Time a turn may spend on generation before falling back
    pub fn turn_budget_ms(&self) -> u64 {
        self.request_timeout_ms
            .saturating_sub(turns::RESPONSE_MARGIN_MS)
    }

    /// Hard stop for a whole webhook, inside the HTTP timeout layer
    pub fn response_deadline_ms(&self) -> u64 {
        self.request_timeout_ms
            .saturating_sub(turns::HARD_STOP_MARGIN_MS)
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_request_timeout_ms() -> u64 {
    14_000
}

fn default_max_sessions() -> usize {
    sessions::MAX_SESSIONS
}

fn default_session_timeout() -> u64 {
    sessions::IDLE_TIMEOUT_SECS
}

fn default_cleanup_interval() -> u64 {
    sessions::CLEANUP_INTERVAL_SECS
}

fn default_true() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_base_url: None,
            request_timeout_ms: default_request_timeout_ms(),
            max_sessions: default_max_sessions(),
            session_timeout_secs: default_session_timeout(),
            cleanup_interval_secs: default_cleanup_interval(),
            cors: CorsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            origins: Vec::new(),
        }
    }
}

/// Generation provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    #[default]
    Ollama,
    #[serde(alias = "open_ai")]
    OpenAi,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub provider: LlmProvider,

    #[serde(default = "default_llm_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_llm_model")]
    pub model: String,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Per-request HTTP timeout
    #[serde(default = "default_llm_timeout_ms")]
    pub timeout_ms: u64,

    /// Request JSON output natively for structured calls
    #[serde(default = "default_true")]
    pub json_mode: bool,
}

fn default_llm_endpoint() -> String {
    endpoints::OLLAMA_DEFAULT.to_string()
}

fn default_llm_model() -> String {
    "llama3.1:8b".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    120
}

fn default_llm_timeout_ms() -> u64 {
    2_000
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::default(),
            endpoint: default_llm_endpoint(),
            model: default_llm_model(),
            api_key: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_ms: default_llm_timeout_ms(),
            json_mode: true,
        }
    }
}

/// Backoff shape between generation attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    #[default]
    Fixed,
    Linear,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationConfig {
    #[serde(default = "default_greeting_attempts")]
    pub greeting_attempts: u32,

    #[serde(default = "default_generation_attempts")]
    pub generation_attempts: u32,

    #[serde(default = "default_classification_attempts")]
    pub classification_attempts: u32,

    #[serde(default)]
    pub backoff: BackoffKind,

    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,

    /// No-input webhooks tolerated before the closing message
    #[serde(default = "default_max_no_input_retries")]
    pub max_no_input_retries: u32,

    #[serde(default = "default_company_name")]
    pub default_company_name: String,

    #[serde(default = "default_agent_name")]
    pub default_agent_name: String,

    /// Knowledge-base excerpts added to each reply prompt
    #[serde(default = "default_knowledge_excerpts")]
    pub knowledge_excerpts: usize,
}

impl ConversationConfig {
    /// Sum of the waits between `attempts` tries
    pub fn total_backoff_ms(&self, attempts: u32) -> u64 {
        let retries = u64::from(attempts.saturating_sub(1));
        match self.backoff {
            BackoffKind::Fixed => self.backoff_ms * retries,
            BackoffKind::Linear => self.backoff_ms * retries * (retries + 1) / 2,
        }
    }

    /// Longest a call site can take when every attempt hits the LLM timeout
    pub fn worst_case_ms(&self, attempts: u32, llm_timeout_ms: u64) -> u64 {
        u64::from(attempts) * llm_timeout_ms + self.total_backoff_ms(attempts)
    }
}

fn default_greeting_attempts() -> u32 {
    retry::GREETING_ATTEMPTS
}

fn default_generation_attempts() -> u32 {
    retry::REPLY_ATTEMPTS
}

fn default_classification_attempts() -> u32 {
    retry::CLASSIFICATION_ATTEMPTS
}

fn default_backoff_ms() -> u64 {
    retry::BACKOFF_MS
}

fn default_max_no_input_retries() -> u32 {
    turns::MAX_NO_INPUT_RETRIES
}

fn default_company_name() -> String {
    defaults::COMPANY_NAME.to_string()
}

fn default_agent_name() -> String {
    defaults::AGENT_NAME.to_string()
}

fn default_knowledge_excerpts() -> usize {
    defaults::KNOWLEDGE_EXCERPTS
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            greeting_attempts: default_greeting_attempts(),
            generation_attempts: default_generation_attempts(),
            classification_attempts: default_classification_attempts(),
            backoff: BackoffKind::default(),
            backoff_ms: default_backoff_ms(),
            max_no_input_retries: default_max_no_input_retries(),
            default_company_name: default_company_name(),
            default_agent_name: default_agent_name(),
            knowledge_excerpts: default_knowledge_excerpts(),
        }
    }
}

/// Voice markup parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelephonyConfig {
    #[serde(default = "default_voice")]
    pub voice: String,

    #[serde(default = "default_language")]
    pub language: String,

    /// Carrier speech end-pointing ("auto" or seconds)
    #[serde(default = "default_speech_timeout")]
    pub speech_timeout: String,

    #[serde(default = "default_gather_timeout")]
    pub gather_timeout_secs: u32,

    /// Emit a `Record` verb on the greeting
    #[serde(default)]
    pub record_calls: bool,
}

fn default_voice() -> String {
    "Polly.Joanna".to_string()
}

fn default_language() -> String {
    "en-US".to_string()
}

fn default_speech_timeout() -> String {
    "auto".to_string()
}

fn default_gather_timeout() -> u32 {
    turns::GATHER_TIMEOUT_SECS
}

impl Default for TelephonyConfig {
    fn default() -> Self {
        Self {
            voice: default_voice(),
            language: default_language(),
            speech_timeout: default_speech_timeout(),
            gather_timeout_secs: default_gather_timeout(),
            record_calls: false,
        }
    }
}

/// Persistence configuration for ScyllaDB
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Enable ScyllaDB persistence (false = in-memory only)
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_scylla_hosts")]
    pub scylla_hosts: Vec<String>,

    #[serde(default = "default_scylla_keyspace")]
    pub keyspace: String,

    #[serde(default = "default_replication_factor")]
    pub replication_factor: u8,
}

fn default_scylla_hosts() -> Vec<String> {
    vec![endpoints::SCYLLA_DEFAULT.to_string()]
}

fn default_scylla_keyspace() -> String {
    "outreach".to_string()
}

fn default_replication_factor() -> u8 {
    1
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            scylla_hosts: default_scylla_hosts(),
            keyspace: default_scylla_keyspace(),
            replication_factor: default_replication_factor(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_json: bool,

    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
            metrics_enabled: true,
        }
    }
}

/// Load settings from `config/default`, `config/{env}` and `OUTREACH__*`
/// environment variables, in increasing precedence.
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    load_settings_from("config", env)
}

/// Same as [`load_settings`] with an explicit config directory
pub fn load_settings_from(dir: &str, env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    builder = builder.add_source(File::with_name(&format!("{}/default", dir)).required(false));

    if let Some(env_name) = env {
        builder =
            builder.add_source(File::with_name(&format!("{}/{}", dir, env_name)).required(false));
    }

    builder = builder.add_source(
        Environment::with_prefix("OUTREACH")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;

    settings.validate()?;

    Ok(settings)
}
