use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::errors::AppError;
use crate::files::handlers::serve_attachment;
use crate::models::user::{UserRow, UserStatus};
use crate::state::AppState;

/// One row of the staff student table.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentSummary {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub age: Option<String>,
    pub standard: Option<String>,
    pub status: UserStatus,
    pub report_path: Option<String>,
    pub report_uploaded_at: Option<DateTime<Utc>>,
}

impl From<UserRow> for StudentSummary {
    fn from(user: UserRow) -> Self {
        let status = user.status();
        Self {
            id: user.id,
            first_name: user.first_name,
            last_name: user.last_name,
            email: user.email,
            age: user.age,
            standard: user.standard,
            status,
            report_path: user.report_path,
            report_uploaded_at: user.report_uploaded_at,
        }
    }
}

/// GET /api/admin/students
pub async fn handle_list_students(
    State(state): State<AppState>,
    _auth: AuthUser,
) -> Result<Json<Vec<StudentSummary>>, AppError> {
    let students = state.store.list_users().await?;
    Ok(Json(students.into_iter().map(StudentSummary::from).collect()))
}

/// GET /api/admin/download-report/:report_path
///
/// Serves any student's report, but only names some student actually holds.
pub async fn handle_download_report(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(report_path): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let owner = state
        .store
        .find_user_by_report_path(&report_path)
        .await?
        .ok_or_else(|| AppError::NotFound("Report not found".to_string()))?;

    info!(
        "Report {report_path} of user {} downloaded by {}",
        owner.id, auth.user_id
    );
    serve_attachment(&state, &report_path).await
}
