use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::chat::{ChatReply, EMPTY_INPUT_REPLY};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ChatBody {
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatPayload {
    pub reply: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_url: Option<String>,
}

impl IntoResponse for ChatReply {
    fn into_response(self) -> Response {
        let (status, payload) = match self {
            ChatReply::EmptyInput => (
                StatusCode::BAD_REQUEST,
                ChatPayload {
                    reply: EMPTY_INPUT_REPLY.to_string(),
                    kind: None,
                    file_url: None,
                },
            ),
            ChatReply::Failed { text } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ChatPayload {
                    reply: text,
                    kind: None,
                    file_url: None,
                },
            ),
            ChatReply::File { text, file_url } => (
                StatusCode::OK,
                ChatPayload {
                    reply: text,
                    kind: Some("file"),
                    file_url,
                },
            ),
            ChatReply::Faq { text } | ChatReply::NotFound { text } | ChatReply::Ai { text } => (
                StatusCode::OK,
                ChatPayload {
                    reply: text,
                    kind: Some("text"),
                    file_url: None,
                },
            ),
        };
        (status, Json(payload)).into_response()
    }
}

/// Public chat endpoint. A missing or unreadable body counts as an empty message.
pub async fn chat_handler(
    State(state): State<Arc<AppState>>,
    body: Result<Json<ChatBody>, JsonRejection>,
) -> ChatReply {
    let message = match body {
        Ok(Json(body)) => body.message.unwrap_or_default(),
        Err(rejection) => {
            debug!("Unreadable chat body: {rejection}");
            String::new()
        }
    };
    state.chat.resolve(&message).await
}
