use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::{json, Value};
use tracing::info;

use crate::auth::{AuthUser, Operation};
use crate::db::models::{Faq, FaqInput};
use crate::db::StoreError;
use crate::error::AppError;
use crate::state::AppState;

pub async fn list_handler(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Faq>>, AppError> {
    Ok(Json(state.db.call(|db| db.list_faqs()).await?))
}

pub async fn create_handler(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(input): Json<FaqInput>,
) -> Result<Json<Value>, AppError> {
    let identity = user.require(Operation::CreateFaq)?;
    let input = input.normalized();
    let (Some(question), Some(answer)) = (input.question, input.answer) else {
        return Err(AppError::BadRequest(
            "Both question and answer required".into(),
        ));
    };

    let category = input.category;
    let faq = state
        .db
        .call(move |db| db.create_faq(&question, &answer, category.as_deref()))
        .await?;
    info!(faq_id = %faq.id, by = %identity.subject_id, "FAQ added");
    Ok(Json(json!({ "message": "FAQ added successfully!", "faq": faq })))
}

pub async fn update_handler(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(input): Json<FaqInput>,
) -> Result<Json<Value>, AppError> {
    let identity = user.require(Operation::UpdateFaq)?;
    let input = input.normalized();
    let faq = state
        .db
        .call(move |db| db.update_faq(&id, &input))
        .await
        .map_err(not_found)?;
    info!(faq_id = %faq.id, by = %identity.subject_id, "FAQ updated");
    Ok(Json(json!({ "message": "FAQ updated successfully!", "faq": faq })))
}

pub async fn delete_handler(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let identity = user.require(Operation::DeleteFaq)?;
    let target = id.clone();
    state
        .db
        .call(move |db| db.delete_faq(&target))
        .await
        .map_err(not_found)?;
    info!(faq_id = %id, by = %identity.subject_id, "FAQ deleted");
    Ok(Json(json!({ "message": "FAQ deleted successfully!" })))
}

fn not_found(e: StoreError) -> AppError {
    match e {
        StoreError::NotFound => AppError::NotFound("FAQ"),
        other => other.into(),
    }
}

impl FaqInput {
    /// Trim every field and drop the blank ones.
    fn normalized(self) -> Self {
        let clean = |v: Option<String>| v.map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        Self {
            question: clean(self.question),
            answer: clean(self.answer),
            category: clean(self.category),
        }
    }
}
