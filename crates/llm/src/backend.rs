//! LLM Backend implementations
//!
//! Two HTTP backends share one trait: Ollama's `/api/chat` and any
//! OpenAI-compatible `/chat/completions` endpoint. Both can be asked for a
//! JSON object natively (`format: "json"` / `response_format`), which the
//! structured-output path uses before falling back to text extraction.
//!
//! Backends do not retry; attempt budgets belong to the caller.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use outreach_core::{Message, Role};

use crate::LlmError;

/// Backend connection settings
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Model name/ID
    pub model: String,
    /// API endpoint
    pub endpoint: String,
    /// Maximum tokens to generate
    pub max_tokens: u32,
    pub temperature: f32,
    /// Request timeout
    pub timeout: Duration,
    /// Keep the model loaded between calls ("5m", "-1", "0")
    pub keep_alive: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            model: "llama3.1:8b".to_string(),
            endpoint: "http://localhost:11434".to_string(),
            max_tokens: 120,
            temperature: 0.7,
            timeout: Duration::from_secs(2),
            keep_alive: "5m".to_string(),
        }
    }
}

/// Per-request overrides
#[derive(Debug, Clone, Copy, Default)]
pub struct GenerationOptions {
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    /// Request a JSON object
    pub json_mode: bool,
}

/// LLM generation result
#[derive(Debug, Clone)]
pub struct GenerationResult {
    pub text: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_time_ms: u64,
    pub finish_reason: FinishReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    Length,
    Error,
}

/// LLM Backend trait
#[async_trait]
pub trait LlmBackend: Send + Sync {
    async fn generate(
        &self,
        messages: &[Message],
        options: GenerationOptions,
    ) -> Result<GenerationResult, LlmError>;

    async fn is_available(&self) -> bool;

    fn model_name(&self) -> &str;
}

/// Ollama backend
#[derive(Clone)]
pub struct OllamaBackend {
    client: Client,
    config: BackendConfig,
}

impl OllamaBackend {
    pub fn new(config: BackendConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/api{}", self.config.endpoint.trim_end_matches('/'), path)
    }

    fn build_request(&self, messages: &[Message], options: GenerationOptions) -> OllamaChatRequest {
        OllamaChatRequest {
            model: self.config.model.clone(),
            messages: messages.iter().map(OllamaMessage::from).collect(),
            stream: false,
            format: options.json_mode.then(|| "json".to_string()),
            options: Some(OllamaOptions {
                temperature: Some(options.temperature.unwrap_or(self.config.temperature)),
                num_predict: Some(options.max_tokens.unwrap_or(self.config.max_tokens) as i32),
            }),
            keep_alive: Some(self.config.keep_alive.clone()),
        }
    }
}

#[async_trait]
impl LlmBackend for OllamaBackend {
    async fn generate(
        &self,
        messages: &[Message],
        options: GenerationOptions,
    ) -> Result<GenerationResult, LlmError> {
        let start = Instant::now();
        let request = self.build_request(messages, options);

        let response = self
            .client
            .post(self.api_url("/chat"))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error = response.text().await.unwrap_or_default();
            if status.is_server_error() {
                return Err(LlmError::Network(format!("Server error {}: {}", status, error)));
            }
            return Err(LlmError::Api(format!("HTTP {}: {}", status, error)));
        }

        let result: OllamaChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        Ok(GenerationResult {
            text: result.message.content,
            prompt_tokens: result.prompt_eval_count.unwrap_or(0) as u32,
            completion_tokens: result.eval_count.unwrap_or(0) as u32,
            total_time_ms: start.elapsed().as_millis() as u64,
            finish_reason: if result.done {
                FinishReason::Stop
            } else {
                FinishReason::Length
            },
        })
    }

    async fn is_available(&self) -> bool {
        self.client
            .get(self.api_url("/tags"))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

// Ollama API types
#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    keep_alive: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    content: String,
}

impl From<&Message> for OllamaMessage {
    fn from(msg: &Message) -> Self {
        Self {
            role: msg.role.as_str().to_string(),
            content: msg.content.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: OllamaMessage,
    done: bool,
    #[serde(default)]
    eval_count: Option<u64>,
    #[serde(default)]
    prompt_eval_count: Option<u64>,
}

/// Configuration for OpenAI-compatible backends
#[derive(Debug, Clone)]
pub struct OpenAIConfig {
    /// API endpoint (https://api.openai.com/v1, vLLM, LiteLLM, ...)
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout: Duration,
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            model: "gpt-4o-mini".to_string(),
            max_tokens: 120,
            temperature: 0.7,
            timeout: Duration::from_secs(2),
        }
    }
}

impl OpenAIConfig {
    pub fn openai(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            ..Default::default()
        }
    }

    /// Local OpenAI-compatible server (vLLM, llama.cpp, ...)
    pub fn local(endpoint: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: "not-needed".to_string(),
            model: model.into(),
            ..Default::default()
        }
    }
}

/// OpenAI-compatible backend
pub struct OpenAIBackend {
    config: OpenAIConfig,
    client: Client,
}

impl OpenAIBackend {
    pub fn new(config: OpenAIConfig) -> Result<Self, LlmError> {
        let is_local = config.endpoint.starts_with("http://localhost")
            || config.endpoint.starts_with("http://127.0.0.1");
        if config.api_key.is_empty() && !is_local {
            return Err(LlmError::Configuration(
                "API key required for remote endpoints".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.config.endpoint.trim_end_matches('/'))
    }

    fn build_headers(&self) -> reqwest::header::HeaderMap {
        use reqwest::header::HeaderValue;

        let mut headers = reqwest::header::HeaderMap::new();
        let auth_value = format!("Bearer {}", self.config.api_key);
        if let Ok(val) = HeaderValue::from_str(&auth_value) {
            headers.insert(reqwest::header::AUTHORIZATION, val);
        }
        headers.insert(
            reqwest::header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers
    }

    fn build_request(&self, messages: &[Message], options: GenerationOptions) -> OpenAIChatRequest {
        OpenAIChatRequest {
            model: self.config.model.clone(),
            messages: messages
                .iter()
                .map(|m| OpenAIMessage {
                    role: match m.role {
                        Role::System => "system".to_string(),
                        Role::User => "user".to_string(),
                        Role::Assistant => "assistant".to_string(),
                    },
                    content: m.content.clone(),
                })
                .collect(),
            max_tokens: Some(options.max_tokens.unwrap_or(self.config.max_tokens)),
            temperature: Some(options.temperature.unwrap_or(self.config.temperature)),
            response_format: options.json_mode.then(|| ResponseFormat {
                kind: "json_object".to_string(),
            }),
        }
    }
}

#[async_trait]
impl LlmBackend for OpenAIBackend {
    async fn generate(
        &self,
        messages: &[Message],
        options: GenerationOptions,
    ) -> Result<GenerationResult, LlmError> {
        let start = Instant::now();
        let request = self.build_request(messages, options);

        let response = self
            .client
            .post(self.chat_url())
            .headers(self.build_headers())
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            if status.is_server_error() {
                return Err(LlmError::Network(format!("Server error {}: {}", status, error_text)));
            }
            return Err(LlmError::Api(format!("HTTP {}: {}", status, error_text)));
        }

        let response: OpenAIChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        let choice = response
            .choices
            .first()
            .ok_or_else(|| LlmError::InvalidResponse("No choices in response".to_string()))?;

        let (prompt_tokens, completion_tokens) = response
            .usage
            .map(|u| (u.prompt_tokens, u.completion_tokens))
            .unwrap_or((0, 0));

        Ok(GenerationResult {
            text: choice.message.content.clone(),
            prompt_tokens,
            completion_tokens,
            total_time_ms: start.elapsed().as_millis() as u64,
            finish_reason: match choice.finish_reason.as_deref() {
                Some("length") => FinishReason::Length,
                Some("content_filter") => FinishReason::Error,
                _ => FinishReason::Stop,
            },
        })
    }

    async fn is_available(&self) -> bool {
        let url = format!("{}/models", self.config.endpoint.trim_end_matches('/'));
        self.client
            .get(&url)
            .headers(self.build_headers())
            .timeout(self.config.timeout)
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

// OpenAI API types
#[derive(Debug, Serialize)]
struct OpenAIChatRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAIMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OpenAIChatResponse {
    choices: Vec<OpenAIChoice>,
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIUsage {
    completion_tokens: u32,
    prompt_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_conversion() {
        let msg = Message::user("Hello");
        let ollama_msg: OllamaMessage = (&msg).into();
        assert_eq!(ollama_msg.role, "user");
        assert_eq!(ollama_msg.content, "Hello");
    }

    #[test]
    fn test_ollama_json_mode_serialization() {
        let backend = OllamaBackend::new(BackendConfig::default()).unwrap();
        let messages = vec![Message::system("Classify"), Message::user("too expensive")];

        let plain = backend.build_request(&messages, GenerationOptions::default());
        let json = serde_json::to_string(&plain).unwrap();
        assert!(!json.contains("\"format\""));
        assert!(json.contains("keep_alive"));

        let structured = backend.build_request(
            &messages,
            GenerationOptions {
                json_mode: true,
                ..Default::default()
            },
        );
        let json = serde_json::to_string(&structured).unwrap();
        assert!(json.contains("\"format\":\"json\""));
    }

    #[test]
    fn test_ollama_options_override() {
        let backend = OllamaBackend::new(BackendConfig::default()).unwrap();
        let request = backend.build_request(
            &[Message::user("hi")],
            GenerationOptions {
                max_tokens: Some(40),
                temperature: Some(0.1),
                json_mode: false,
            },
        );
        let options = request.options.unwrap();
        assert_eq!(options.num_predict, Some(40));
        assert_eq!(options.temperature, Some(0.1));
    }

    #[test]
    fn test_openai_backend_creation() {
        let config = OpenAIConfig::local("http://localhost:8000/v1", "test");
        assert!(OpenAIBackend::new(config).is_ok());

        assert!(OpenAIBackend::new(OpenAIConfig::default()).is_err());

        let config = OpenAIConfig::openai("sk-xxx", "gpt-4o-mini");
        assert!(OpenAIBackend::new(config).is_ok());
    }

    #[test]
    fn test_openai_chat_url_and_response_format() {
        let backend = OpenAIBackend::new(OpenAIConfig::openai("sk-xxx", "gpt-4o-mini")).unwrap();
        assert_eq!(backend.chat_url(), "https://api.openai.com/v1/chat/completions");

        let request = backend.build_request(
            &[Message::user("Hello")],
            GenerationOptions {
                json_mode: true,
                ..Default::default()
            },
        );
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("\"response_format\":{\"type\":\"json_object\"}"));
        assert!(json.contains("max_tokens"));
    }
}
