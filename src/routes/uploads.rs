//! Multipart form parsing and storage of attached files.
//!
//! Stored files live directly inside the upload directory and are referenced
//! as `/uploads/<name>`; nothing outside that directory is ever written or
//! removed.

use std::collections::HashMap;
use std::path::Path;

use axum::body::Bytes;
use axum::extract::Multipart;
use tracing::{info, warn};

use crate::db::StoreError;
use crate::error::AppError;

pub const UPLOAD_PREFIX: &str = "/uploads/";

pub struct UploadedFile {
    pub filename: String,
    pub bytes: Bytes,
}

/// Text fields plus the optional `file` part of a multipart form.
#[derive(Default)]
pub struct UploadForm {
    fields: HashMap<String, String>,
    pub file: Option<UploadedFile>,
}

impl UploadForm {
    pub async fn read(mut multipart: Multipart) -> Result<Self, AppError> {
        let mut form = UploadForm::default();
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| AppError::BadRequest(format!("Malformed form data: {e}")))?
        {
            let name = field.name().unwrap_or_default().to_string();
            if name == "file" {
                let filename = field.file_name().unwrap_or("upload").to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("Malformed file part: {e}")))?;
                if !bytes.is_empty() {
                    form.file = Some(UploadedFile { filename, bytes });
                }
            } else {
                let value = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("Malformed form field: {e}")))?;
                form.fields.insert(name, value);
            }
        }
        Ok(form)
    }

    /// A trimmed, non-empty text field.
    pub fn field(&self, name: &str) -> Option<String> {
        self.fields
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }

    #[cfg(test)]
    pub fn with_fields(fields: &[(&str, &str)]) -> Self {
        Self {
            fields: fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            file: None,
        }
    }
}

/// Write an uploaded file and return its public `/uploads/...` path.
pub async fn save(upload_dir: &Path, file: &UploadedFile) -> Result<String, AppError> {
    let stored_name = format!("{}-{}", uuid::Uuid::new_v4(), sanitize(&file.filename));
    tokio::fs::write(upload_dir.join(&stored_name), &file.bytes).await?;
    info!(file = %stored_name, size = file.bytes.len(), "Stored upload");
    Ok(format!("{UPLOAD_PREFIX}{stored_name}"))
}

/// Delete a previously stored upload. Failures are logged, not returned.
pub async fn remove(upload_dir: &Path, file_url: Option<&str>) {
    let Some(name) = file_url.and_then(stored_name) else {
        return;
    };
    if let Err(e) = tokio::fs::remove_file(upload_dir.join(name)).await {
        warn!(file = %name, "Failed to remove upload: {e}");
    }
}

/// Pass a store result through, deleting the upload saved for it when the
/// record could not be written.
pub async fn discard_on_error<T>(
    upload_dir: &Path,
    file_url: Option<&str>,
    result: Result<T, StoreError>,
) -> Result<T, StoreError> {
    if result.is_err() {
        remove(upload_dir, file_url).await;
    }
    result
}

/// The file name inside the upload directory, if `file_url` points there.
fn stored_name(file_url: &str) -> Option<&str> {
    let name = file_url.strip_prefix(UPLOAD_PREFIX)?;
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && !name.contains(['/', '\\'])
        && name != "..";
    valid.then_some(name)
}

fn sanitize(filename: &str) -> String {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_strips_paths_and_odd_characters() {
        assert_eq!(sanitize("../../etc/passwd"), "passwd");
        assert_eq!(sanitize("C:\\docs\\Sem 3 (final).pdf"), "Sem_3__final_.pdf");
        assert_eq!(sanitize(".hidden"), "hidden");
        assert_eq!(sanitize(""), "upload");
    }

    #[test]
    fn test_stored_name_rejects_foreign_paths() {
        assert_eq!(stored_name("/uploads/abc-notice.pdf"), Some("abc-notice.pdf"));
        assert_eq!(stored_name("/uploads/../secret"), None);
        assert_eq!(stored_name("/etc/passwd"), None);
        assert_eq!(stored_name("/uploads/"), None);
    }

    #[tokio::test]
    async fn test_save_and_remove_stay_inside_upload_dir() {
        let dir = tempfile::tempdir().unwrap();
        let file = UploadedFile {
            filename: "Semester 3.pdf".into(),
            bytes: Bytes::from_static(b"%PDF-1.4"),
        };

        let url = save(dir.path(), &file).await.unwrap();
        assert!(url.starts_with(UPLOAD_PREFIX));
        assert!(url.ends_with("-Semester_3.pdf"));

        let name = stored_name(&url).unwrap();
        let on_disk = dir.path().join(name);
        assert_eq!(std::fs::read(&on_disk).unwrap(), b"%PDF-1.4");

        remove(dir.path(), Some(&url)).await;
        assert!(!on_disk.exists());
    }

    #[tokio::test]
    async fn test_failed_write_discards_fresh_upload() {
        let dir = tempfile::tempdir().unwrap();
        let file = UploadedFile {
            filename: "notice.pdf".into(),
            bytes: Bytes::from_static(b"%PDF-1.4"),
        };
        let url = save(dir.path(), &file).await.unwrap();
        let on_disk = dir.path().join(stored_name(&url).unwrap());

        let kept = discard_on_error(dir.path(), Some(&url), Ok::<_, StoreError>(7)).await;
        assert_eq!(kept.unwrap(), 7);
        assert!(on_disk.exists());

        let failed =
            discard_on_error::<()>(dir.path(), Some(&url), Err(StoreError::Poisoned)).await;
        assert!(matches!(failed, Err(StoreError::Poisoned)));
        assert!(!on_disk.exists());
    }

    #[test]
    fn test_field_trims_and_drops_blanks() {
        let form = UploadForm::with_fields(&[("title", "  Exam notice "), ("type", "   ")]);
        assert_eq!(form.field("title").as_deref(), Some("Exam notice"));
        assert_eq!(form.field("type"), None);
        assert_eq!(form.field("missing"), None);
    }
}
