use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::auth::AuthError;
use crate::config::ConfigError;
use crate::db::StoreError;
use crate::llm::LlmError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Upload failed: {0}")]
    Upload(#[from] std::io::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::BadRequest(message) => (StatusCode::BAD_REQUEST, message.clone()),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            AppError::Auth(AuthError::Unauthenticated | AuthError::InvalidCredential(_)) => {
                (StatusCode::UNAUTHORIZED, self.to_string())
            }
            AppError::Auth(AuthError::Forbidden) => (StatusCode::FORBIDDEN, self.to_string()),
            AppError::Store(StoreError::Duplicate("username")) => {
                (StatusCode::BAD_REQUEST, "Username already exists".to_string())
            }
            AppError::Store(StoreError::NotFound) => {
                (StatusCode::NOT_FOUND, "Record not found".to_string())
            }
            AppError::Auth(_) | AppError::Store(_) | AppError::Upload(_) => {
                error!("Request failed: {self}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        (status, Json(json!({ "message": message }))).into_response()
    }
}

/// Failures that stop the server from starting or running.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Store(#[from] StoreError),

    #[error("AI provider setup failed: {0}")]
    Provider(#[from] LlmError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
