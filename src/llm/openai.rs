use super::{ChatRequest, ChatResponse, LlmError, EMPTY_COMPLETION};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

#[derive(Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAiMessage<'a>>,
    temperature: f32,
}

#[derive(Serialize)]
struct OpenAiMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: Option<OpenAiReply>,
}

#[derive(Deserialize)]
struct OpenAiReply {
    content: Option<String>,
}

pub async fn chat(
    client: &Client,
    config: &OpenAiConfig,
    request: &ChatRequest,
) -> Result<ChatResponse, LlmError> {
    let messages = request
        .messages
        .iter()
        .map(|m| OpenAiMessage {
            role: &m.role,
            content: &m.content,
        })
        .collect();

    let body = OpenAiRequest {
        model: &request.model,
        messages,
        temperature: request.temperature,
    };

    let mut req = client
        .post(format!(
            "{}/chat/completions",
            config.base_url.trim_end_matches('/')
        ))
        .header("Content-Type", "application/json")
        .json(&body);

    if !config.api_key.is_empty() {
        req = req.header("Authorization", format!("Bearer {}", config.api_key));
    }

    debug!(model = %request.model, "Sending chat completion request");
    let resp = req.send().await?;

    if !resp.status().is_success() {
        let status = resp.status().as_u16();
        let text = resp.text().await.unwrap_or_default();
        warn!(status, "Chat completion request rejected by provider");
        return Err(LlmError::Api {
            status,
            message: text,
        });
    }

    let data: OpenAiResponse = resp
        .json()
        .await
        .map_err(|e| LlmError::Parse(e.to_string()))?;
    let content = data
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message)
        .and_then(|m| m.content)
        .filter(|c| !c.trim().is_empty())
        .unwrap_or_else(|| EMPTY_COMPLETION.to_string());

    Ok(ChatResponse {
        content,
        model: request.model.clone(),
    })
}
