use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::auth::AuthUser;
use crate::errors::AppError;
use crate::models::questionnaire::QuestionnaireRow;
use crate::questionnaire::orchestrator::{RawAnswer, ReportStatus};
use crate::state::AppState;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct SubmitAnswersRequest {
    pub answers: Option<Vec<RawAnswer>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitAnswersResponse {
    pub message: String,
    pub task_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveProgressRequest {
    pub current_question: i32,
    #[serde(default)]
    pub answers: Map<String, Value>,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/questionnaire/submit-answers
///
/// Answers `202 Accepted` as soon as report generation is dispatched; progress
/// is then visible through `report-status`.
pub async fn handle_submit_answers(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(request): Json<SubmitAnswersRequest>,
) -> Result<(StatusCode, Json<SubmitAnswersResponse>), AppError> {
    let answers = request
        .answers
        .ok_or_else(|| AppError::Validation("answers are required".to_string()))?;

    let task_id = state
        .orchestrator
        .submit_answers(auth.user_id, &answers)
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitAnswersResponse {
            message: "Report generation started".to_string(),
            task_id,
        }),
    ))
}

/// GET /api/questionnaire/report-status
pub async fn handle_report_status(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<ReportStatus>, AppError> {
    Ok(Json(state.orchestrator.get_status(auth.user_id).await?))
}

/// GET /api/questionnaire/get-answers
pub async fn handle_get_answers(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<QuestionnaireRow>, AppError> {
    Ok(Json(state.orchestrator.get_answers(auth.user_id).await?))
}

/// POST /api/questionnaire/save-progress
pub async fn handle_save_progress(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(request): Json<SaveProgressRequest>,
) -> Result<Json<QuestionnaireRow>, AppError> {
    let saved = state
        .orchestrator
        .save_progress(auth.user_id, request.current_question, request.answers)
        .await?;
    Ok(Json(saved))
}

/// DELETE /api/questionnaire/poll-tasks/:task_id
pub async fn handle_revoke_poll(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(task_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let revoked = state.orchestrator.revoke_poll(auth.user_id, &task_id).await?;
    Ok(Json(json!({ "taskId": task_id, "revoked": revoked })))
}
