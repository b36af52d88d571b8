use std::sync::Arc;

use axum::{
    extract::{Multipart, Path, State},
    Json,
};
use serde_json::{json, Value};
use tracing::info;

use super::uploads::{self, UploadForm};
use crate::auth::{AuthUser, Operation};
use crate::db::models::{Notice, NoticeInput};
use crate::db::StoreError;
use crate::error::AppError;
use crate::state::AppState;

pub async fn list_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Notice>>, AppError> {
    Ok(Json(state.db.call(|db| db.list_notices()).await?))
}

pub async fn create_handler(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    multipart: Multipart,
) -> Result<Json<Value>, AppError> {
    let identity = user.require(Operation::CreateNotice)?;
    let form = UploadForm::read(multipart).await?;
    let (Some(title), Some(description)) = (form.field("title"), form.field("description"))
    else {
        return Err(AppError::BadRequest(
            "Title and description required".into(),
        ));
    };

    let file_url = match &form.file {
        Some(file) => Some(uploads::save(&state.config.upload_dir, file).await?),
        None => None,
    };
    let category = form.field("type");
    let stored = file_url.clone();
    let created = state
        .db
        .call(move |db| {
            db.create_notice(&title, &description, category.as_deref(), stored.as_deref())
        })
        .await;
    let notice =
        uploads::discard_on_error(&state.config.upload_dir, file_url.as_deref(), created).await?;

    info!(notice_id = %notice.id, by = %identity.subject_id, "Notice added");
    Ok(Json(json!({ "message": "Notice added successfully!", "notice": notice })))
}

pub async fn update_handler(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
    multipart: Multipart,
) -> Result<Json<Value>, AppError> {
    let identity = user.require(Operation::UpdateNotice)?;
    let form = UploadForm::read(multipart).await?;

    let file_url = match &form.file {
        Some(file) => Some(uploads::save(&state.config.upload_dir, file).await?),
        None => None,
    };
    let input = NoticeInput {
        title: form.field("title"),
        description: form.field("description"),
        category: form.field("type"),
        file_url: file_url.clone(),
    };
    let updated = state
        .db
        .call(move |db| db.update_notice(&id, &input))
        .await;
    let (before, notice) =
        uploads::discard_on_error(&state.config.upload_dir, file_url.as_deref(), updated)
            .await
            .map_err(not_found)?;
    if file_url.is_some() {
        uploads::remove(&state.config.upload_dir, before.file_url.as_deref()).await;
    }

    info!(notice_id = %notice.id, by = %identity.subject_id, "Notice updated");
    Ok(Json(json!({ "message": "Notice updated successfully!", "notice": notice })))
}

pub async fn delete_handler(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let identity = user.require(Operation::DeleteNotice)?;
    let target = id.clone();
    let notice = state
        .db
        .call(move |db| db.delete_notice(&target))
        .await
        .map_err(not_found)?;
    uploads::remove(&state.config.upload_dir, notice.file_url.as_deref()).await;

    info!(notice_id = %id, by = %identity.subject_id, "Notice deleted");
    Ok(Json(json!({ "message": "Notice deleted successfully!" })))
}

fn not_found(e: StoreError) -> AppError {
    match e {
        StoreError::NotFound => AppError::NotFound("Notice"),
        other => other.into(),
    }
}
