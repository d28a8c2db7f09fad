use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};
use tracing::info;

use crate::auth::AuthUser;
use crate::errors::AppError;
use crate::models::marks::MarksRow;
use crate::state::AppState;
use crate::store::MarksEntry;

/// GET /api/marks/marks
pub async fn handle_list_marks(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<MarksRow>>, AppError> {
    Ok(Json(state.store.list_marks(auth.user_id).await?))
}

/// POST /api/marks/bulk
///
/// Body: `[{ standard, subjects: [...] }]`. Each standard is inserted or has
/// its subjects replaced.
pub async fn handle_bulk_marks(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(entries): Json<Vec<MarksEntry>>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    if let Some(bad) = entries.iter().find(|e| !e.subjects.is_array()) {
        return Err(AppError::Validation(format!(
            "subjects for standard {} must be an array",
            bad.standard
        )));
    }

    state.store.upsert_marks(auth.user_id, &entries).await?;
    info!(
        "Saved marks for {} standards (user {})",
        entries.len(),
        auth.user_id
    );

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "All marks saved successfully" })),
    ))
}
