//! Centralized defaults shared across crates

/// Service endpoints (defaults for local development)
pub mod endpoints {
    /// Ollama LLM endpoint
    pub const OLLAMA_DEFAULT: &str = "http://localhost:11434";

    /// OpenAI-compatible endpoint
    pub const OPENAI_DEFAULT: &str = "https://api.openai.com/v1";

    /// ScyllaDB contact point
    pub const SCYLLA_DEFAULT: &str = "127.0.0.1:9042";
}

/// Generation retry budgets per call site
pub mod retry {
    pub const GREETING_ATTEMPTS: u32 = 3;
    pub const REPLY_ATTEMPTS: u32 = 3;
    pub const CLASSIFICATION_ATTEMPTS: u32 = 2;

    /// Default fixed backoff between attempts
    pub const BACKOFF_MS: u64 = 750;

    /// Backoff must stay inside the carrier's response window
    pub const MIN_BACKOFF_MS: u64 = 100;
    pub const MAX_BACKOFF_MS: u64 = 2_000;
    pub const MAX_ATTEMPTS: u32 = 5;
}

/// Spoken reply bounds enforced by the sanitizer
pub mod reply {
    pub const MIN_CHARS: usize = 10;
    pub const MAX_CHARS: usize = 200;
}

/// Turn controller limits
pub mod turns {
    /// No-input webhooks tolerated before the closing message
    pub const MAX_NO_INPUT_RETRIES: u32 = 2;

    /// Seconds the carrier waits for speech before posting an empty result
    pub const GATHER_TIMEOUT_SECS: u32 = 5;

    /// Reserved at the end of the request window for fallback, markup and persistence
    pub const RESPONSE_MARGIN_MS: u64 = 1_000;

    /// Hard stop before the request timeout; the apology path runs after it
    pub const HARD_STOP_MARGIN_MS: u64 = 250;

    pub const MIN_REQUEST_TIMEOUT_MS: u64 = 2_000;
}

/// Session registry limits
pub mod sessions {
    pub const MAX_SESSIONS: usize = 1_000;
    pub const IDLE_TIMEOUT_SECS: u64 = 900;
    pub const CLEANUP_INTERVAL_SECS: u64 = 60;
}

/// Fallback naming when no company context resolves
pub mod defaults {
    pub const COMPANY_NAME: &str = "our company";
    pub const AGENT_NAME: &str = "Alex";
    pub const KNOWLEDGE_EXCERPTS: usize = 3;
}
