use std::sync::Arc;

use axum::{
    extract::{Multipart, Path, State},
    Json,
};
use serde_json::{json, Value};
use tracing::info;

use super::uploads::{self, UploadForm};
use crate::auth::{AuthUser, Operation};
use crate::db::models::{Timetable, TimetableInput};
use crate::db::StoreError;
use crate::error::AppError;
use crate::state::AppState;

pub async fn list_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Timetable>>, AppError> {
    Ok(Json(state.db.call(|db| db.list_timetables()).await?))
}

pub async fn create_handler(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    multipart: Multipart,
) -> Result<Json<Value>, AppError> {
    let identity = user.require(Operation::CreateTimetable)?;
    let form = UploadForm::read(multipart).await?;
    let (Some(title), Some(branch), Some(semester)) = (
        form.field("title"),
        form.field("branch"),
        form.field("semester"),
    ) else {
        return Err(AppError::BadRequest(
            "Title, branch, and semester required".into(),
        ));
    };

    let file_url = match &form.file {
        Some(file) => Some(uploads::save(&state.config.upload_dir, file).await?),
        None => None,
    };
    let course = form.field("course");
    let stored = file_url.clone();
    let created = state
        .db
        .call(move |db| {
            db.create_timetable(
                &title,
                course.as_deref(),
                &branch,
                &semester,
                stored.as_deref(),
            )
        })
        .await;
    let timetable =
        uploads::discard_on_error(&state.config.upload_dir, file_url.as_deref(), created).await?;

    info!(timetable_id = %timetable.id, by = %identity.subject_id, "Timetable added");
    Ok(Json(json!({ "message": "Timetable added successfully!", "timetable": timetable })))
}

pub async fn update_handler(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
    multipart: Multipart,
) -> Result<Json<Value>, AppError> {
    let identity = user.require(Operation::UpdateTimetable)?;
    let form = UploadForm::read(multipart).await?;

    let file_url = match &form.file {
        Some(file) => Some(uploads::save(&state.config.upload_dir, file).await?),
        None => None,
    };
    let input = TimetableInput {
        title: form.field("title"),
        course: form.field("course"),
        branch: form.field("branch"),
        semester: form.field("semester"),
        file_url: file_url.clone(),
    };
    let updated = state
        .db
        .call(move |db| db.update_timetable(&id, &input))
        .await;
    let (before, timetable) =
        uploads::discard_on_error(&state.config.upload_dir, file_url.as_deref(), updated)
            .await
            .map_err(not_found)?;
    if file_url.is_some() {
        uploads::remove(&state.config.upload_dir, before.file_url.as_deref()).await;
    }

    info!(timetable_id = %timetable.id, by = %identity.subject_id, "Timetable updated");
    Ok(Json(json!({ "message": "Timetable updated successfully!", "timetable": timetable })))
}

pub async fn delete_handler(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let identity = user.require(Operation::DeleteTimetable)?;
    let target = id.clone();
    let timetable = state
        .db
        .call(move |db| db.delete_timetable(&target))
        .await
        .map_err(not_found)?;
    uploads::remove(&state.config.upload_dir, timetable.file_url.as_deref()).await;

    info!(timetable_id = %id, by = %identity.subject_id, "Timetable deleted");
    Ok(Json(json!({ "message": "Timetable deleted successfully!" })))
}

fn not_found(e: StoreError) -> AppError {
    match e {
        StoreError::NotFound => AppError::NotFound("Timetable"),
        other => other.into(),
    }
}
