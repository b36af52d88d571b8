use std::sync::Arc;

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use crate::auth;
use crate::db::models::Role;
use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RegisterBody {
    pub username: Option<String>,
    pub password: Option<String>,
    pub role: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginBody {
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub message: &'static str,
    pub token: String,
    pub role: Role,
    pub username: String,
}

fn required(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

pub async fn register_handler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RegisterBody>,
) -> Result<Json<Value>, AppError> {
    let (Some(username), Some(password), Some(role)) = (
        required(body.username),
        body.password.filter(|p| !p.is_empty()),
        required(body.role),
    ) else {
        return Err(AppError::BadRequest("All fields are required".into()));
    };
    let role: Role = role
        .parse()
        .map_err(|_| AppError::BadRequest("Role must be admin, faculty or student".into()))?;

    let password_hash = auth::hash_password_blocking(password).await?;
    let name = username.clone();
    state
        .db
        .call(move |db| db.create_user(&name, &password_hash, role))
        .await?;
    info!(%username, %role, "Registered user");

    Ok(Json(json!({ "message": format!("{role} registered successfully!") })))
}

pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<LoginBody>,
) -> Result<Json<LoginResponse>, AppError> {
    let (Some(username), Some(password)) = (
        required(body.username),
        body.password.filter(|p| !p.is_empty()),
    ) else {
        return Err(AppError::BadRequest(
            "Username and password required".into(),
        ));
    };

    let session = auth::login(&state.db, &state.tokens, &username, &password).await?;
    info!(username = %session.username, role = %session.role, "Login successful");

    Ok(Json(LoginResponse {
        message: "Login successful",
        token: session.token,
        role: session.role,
        username: session.username,
    }))
}
