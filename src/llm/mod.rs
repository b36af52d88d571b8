pub mod openai;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Reply used when the provider answers without any message content.
pub const EMPTY_COMPLETION: &str = "AI is not responding right now.";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub model: String,
    pub temperature: f32,
}

impl ChatRequest {
    /// A single-turn exchange: one system prompt, one user message.
    pub fn single_turn(
        model: impl Into<String>,
        system_prompt: impl Into<String>,
        user_message: impl Into<String>,
        temperature: f32,
    ) -> Self {
        Self {
            messages: vec![
                ChatMessage::system(system_prompt),
                ChatMessage::user(user_message),
            ],
            model: model.into(),
            temperature,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChatResponse {
    pub content: String,
    pub model: String,
}

/// Anything that can turn a chat request into generated text.
#[async_trait]
pub trait ChatCompleter: Send + Sync {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError>;

    /// Model used when the caller does not pick one.
    fn default_model(&self) -> &str;
}

/// OpenAI-compatible hosted provider (Groq by default).
#[derive(Debug, Clone)]
pub struct Provider {
    client: reqwest::Client,
    config: openai::OpenAiConfig,
}

impl Provider {
    pub fn new(config: openai::OpenAiConfig, timeout: Duration) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl ChatCompleter for Provider {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        openai::chat(&self.client, &self.config, request).await
    }

    fn default_model(&self) -> &str {
        &self.config.model
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },
    #[error("Parse error: {0}")]
    Parse(String),
}
