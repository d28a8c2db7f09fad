use axum::{
    extract::{multipart::MultipartError, Multipart, Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::errors::AppError;
use crate::files::{
    allowed_extension, content_type_for, stored_file_name, MAX_UPLOAD_BYTES,
};
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedReport {
    pub file_name: String,
    pub file_path: String,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub message: String,
    pub report: UploadedReport,
}

struct UploadedFile {
    original_name: String,
    extension: String,
    data: Bytes,
}

fn too_large() -> AppError {
    AppError::PayloadTooLarge("File exceeds the 10MB limit".to_string())
}

/// Bodies cut off by `DefaultBodyLimit` surface here as 413 multipart errors.
fn multipart_error(e: MultipartError, context: &str) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return too_large();
    }
    AppError::Validation(format!("{context}: {}", e.body_text()))
}

/// Reads the `file` field, enforcing the extension allow list and size cap.
async fn read_report_field(multipart: &mut Multipart) -> Result<UploadedFile, AppError> {
    let invalid = || AppError::Validation("No file uploaded or invalid file type".to_string());

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, "Malformed multipart body"))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let original_name = field.file_name().ok_or_else(invalid)?.to_string();
        let extension = allowed_extension(&original_name).ok_or_else(|| {
            AppError::Validation(
                "Only PDF, DOC, DOCX, TXT, JPG, JPEG, and PNG files are allowed".to_string(),
            )
        })?;

        let mut buf = BytesMut::new();
        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|e| multipart_error(e, "File upload error"))?
        {
            if buf.len() + chunk.len() > MAX_UPLOAD_BYTES {
                return Err(too_large());
            }
            buf.extend_from_slice(&chunk);
        }

        return Ok(UploadedFile {
            original_name,
            extension,
            data: buf.freeze(),
        });
    }

    Err(invalid())
}

/// POST /api/files/upload-report/:user_id
///
/// Attaches a report file to a student and marks their report generated.
pub async fn handle_upload_report(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(user_id): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let user_id = Uuid::parse_str(&user_id)
        .map_err(|_| AppError::Validation("Invalid user ID".to_string()))?;

    let file = read_report_field(&mut multipart).await?;

    if state.store.get_user(user_id).await?.is_none() {
        return Err(AppError::NotFound("Student not found".to_string()));
    }

    let uploaded_at = Utc::now();
    let stored_name = stored_file_name(&file.original_name, uploaded_at.timestamp_millis());
    state
        .reports
        .put(&stored_name, file.data, content_type_for(&file.extension))
        .await?;
    state
        .store
        .attach_report(user_id, &stored_name, uploaded_at)
        .await?;

    info!(
        "Report {stored_name} uploaded for user {user_id} by {}",
        auth.user_id
    );

    Ok(Json(UploadResponse {
        message: "Report uploaded successfully".to_string(),
        report: UploadedReport {
            file_name: file.original_name,
            file_path: stored_name,
            uploaded_at,
        },
    }))
}

/// GET /api/files/download/:file_path
///
/// Only the student whose `reportPath` matches may download the file.
pub async fn handle_download(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(file_path): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let user = state.store.get_user(auth.user_id).await?;
    let owns_file = user
        .as_ref()
        .and_then(|u| u.report_path.as_deref())
        .is_some_and(|p| p == file_path);
    if !owns_file {
        return Err(AppError::Forbidden(
            "You are not authorized to access this file".to_string(),
        ));
    }

    serve_attachment(&state, &file_path).await
}

/// Streams a stored report back as a download.
pub(crate) async fn serve_attachment(
    state: &AppState,
    file_path: &str,
) -> Result<impl IntoResponse, AppError> {
    let data = state
        .reports
        .get(file_path)
        .await?
        .ok_or_else(|| AppError::NotFound("File not found".to_string()))?;

    let content_type = allowed_extension(file_path)
        .map(|ext| content_type_for(&ext))
        .unwrap_or("application/octet-stream");
    let disposition = format!("attachment; filename=\"{file_path}\"");

    Ok((
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        data,
    ))
}
