use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PollTaskState {
    Pending,
    Completed,
    Failed,
    Revoked,
}

impl PollTaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PollTaskState::Pending => "pending",
            PollTaskState::Completed => "completed",
            PollTaskState::Failed => "failed",
            PollTaskState::Revoked => "revoked",
        }
    }
}

/// One outstanding report-generation job at the assessment service.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PollTaskRow {
    pub task_id: String,
    pub user_id: Uuid,
    pub attempts: i32,
    pub max_attempts: i32,
    pub state: String,
    pub next_due_at: DateTime<Utc>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PollTaskRow {
    pub fn is_pending(&self) -> bool {
        self.state == PollTaskState::Pending.as_str()
    }
}
