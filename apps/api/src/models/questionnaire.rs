use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct QuestionnaireRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub student_name: String,
    pub age: String,
    pub academic_info: String,
    pub interests: String,
    /// questionId → answer
    pub answers: Value,
    /// trait → score (0–100)
    pub skill_scores: Value,
    pub current_question: i32,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
