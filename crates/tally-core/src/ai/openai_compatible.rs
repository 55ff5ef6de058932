//! OpenAI-compatible backend implementation
//!
//! Works with the OpenAI API and any server that implements the chat
//! completions endpoint (vLLM, LocalAI, llama-server, ...).
//!
//! # Configuration
//!
//! Environment variables:
//! - `OPENAI_API_BASE`: Base URL (default: https://api.openai.com; a trailing `/v1` is accepted)
//! - `OPENAI_API_KEY`: API key (required when talking to the default host)
//! - `OPENAI_MODEL`: Model name (default: gpt-4o-mini)

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};

use super::{http_client, AIBackend, GenerationParams, DEFAULT_TIMEOUT};

/// Hosted OpenAI API base
pub const DEFAULT_OPENAI_BASE: &str = "https://api.openai.com";

const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Whether a key has the `sk-...` / `sk-proj-...` shape the hosted API issues
pub fn looks_like_openai_key(key: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^sk(-proj)?-[A-Za-z0-9_-]{20,}$").expect("valid regex"))
        .is_match(key)
}

/// Strip trailing slashes and an optional `/v1` suffix
fn normalize_base(base_url: &str) -> String {
    let trimmed = base_url.trim().trim_end_matches('/');
    trimmed
        .strip_suffix("/v1")
        .unwrap_or(trimmed)
        .trim_end_matches('/')
        .to_string()
}

/// OpenAI-compatible backend
///
/// Posts one user message to `{base}/v1/chat/completions`.
#[derive(Clone)]
pub struct OpenAICompatibleBackend {
    http_client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl OpenAICompatibleBackend {
    /// Create a new OpenAI-compatible backend
    pub fn new(base_url: &str, model: &str) -> Self {
        Self {
            http_client: http_client(DEFAULT_TIMEOUT),
            base_url: normalize_base(base_url),
            model: model.to_string(),
            api_key: None,
        }
    }

    /// Create with an API key
    pub fn with_api_key(base_url: &str, model: &str, api_key: &str) -> Self {
        Self {
            api_key: Some(api_key.to_string()),
            ..Self::new(base_url, model)
        }
    }

    /// Create a new instance with a different request timeout
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        Self {
            http_client: http_client(timeout),
            ..self.clone()
        }
    }

    /// Create from environment variables
    ///
    /// Returns None when no key is set for the default host, or when the key
    /// for the default host is not shaped like an OpenAI key.
    pub fn from_env() -> Option<Self> {
        let base = std::env::var("OPENAI_API_BASE")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_OPENAI_BASE.to_string());
        let model = std::env::var("OPENAI_MODEL")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let api_key = std::env::var("OPENAI_API_KEY")
            .ok()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());

        let hosted = normalize_base(&base) == DEFAULT_OPENAI_BASE;
        match api_key {
            Some(key) if hosted && !looks_like_openai_key(&key) => {
                warn!("OPENAI_API_KEY does not look like an OpenAI key (sk-... or sk-proj-...)");
                None
            }
            Some(key) => Some(Self::with_api_key(&base, &model, &key)),
            None if hosted => None,
            None => Some(Self::new(&base, &model)),
        }
    }

    /// Make a chat completion request
    async fn chat_completion(&self, prompt: &str, params: &GenerationParams) -> Result<String> {
        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            temperature: Some(params.temperature),
            max_tokens: Some(params.max_tokens),
            stream: false,
        };

        let mut req_builder = self
            .http_client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .json(&request);

        if let Some(ref api_key) = self.api_key {
            req_builder = req_builder.header("Authorization", format!("Bearer {}", api_key));
        }

        let response = req_builder.send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::from_status(status, body));
        }

        let chat_response: ChatCompletionResponse = response.json().await?;

        match chat_response.choices.into_iter().next() {
            Some(choice) => Ok(choice.message.content.unwrap_or_default()),
            None => {
                warn!(model = %self.model, "Chat completion returned no choices");
                Ok(String::new())
            }
        }
    }
}

/// OpenAI chat completion request
#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

/// Chat message
#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

/// OpenAI chat completion response
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

/// Chat completion choice
#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

/// Chat response message
#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl AIBackend for OpenAICompatibleBackend {
    async fn complete(&self, prompt: &str, params: &GenerationParams) -> Result<String> {
        let response = self.chat_completion(prompt, params).await?;
        debug!(model = %self.model, "OpenAI-compatible response: {}", response);
        Ok(response)
    }

    async fn health_check(&self) -> bool {
        let mut req = self.http_client.get(format!("{}/v1/models", self.base_url));
        if let Some(ref api_key) = self.api_key {
            req = req.header("Authorization", format!("Bearer {}", api_key));
        }
        match req.send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn host(&self) -> &str {
        &self.base_url
    }
}
