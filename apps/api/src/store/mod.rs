//! Persistence seam. Handlers, the orchestrator and the poll scheduler only
//! see these traits; `AppState` carries `Arc<dyn ...>` so the Postgres backend
//! can be swapped for the in-memory one in tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::models::marks::MarksRow;
use crate::models::poll_task::{PollTaskRow, PollTaskState};
use crate::models::questionnaire::QuestionnaireRow;
use crate::models::user::{UserRow, UserStatus};

#[cfg(test)]
pub mod memory;
pub mod postgres;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Questionnaire already submitted")]
    AlreadyCompleted,
}

/// Student details forwarded to the assessment service and copied onto the
/// questionnaire record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentProfile {
    pub student_name: String,
    pub age: String,
    pub academic_info: String,
    pub interests: String,
}

impl StudentProfile {
    pub fn from_user(user: &UserRow) -> Self {
        Self {
            student_name: user.full_name(),
            age: user.age.clone().unwrap_or_default(),
            academic_info: format!("{} Grade", user.standard.as_deref().unwrap_or_default()),
            interests: user.interests.clone().unwrap_or_default(),
        }
    }
}

/// Payload for both the progress and the completion write of a questionnaire.
#[derive(Debug, Clone)]
pub struct QuestionnaireWrite {
    pub user_id: Uuid,
    pub profile: StudentProfile,
    pub answers: Value,
    pub skill_scores: Value,
    pub current_question: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarksEntry {
    pub standard: i32,
    pub subjects: Value,
}

#[async_trait]
pub trait AssessmentStore: Send + Sync {
    async fn get_user(&self, user_id: Uuid) -> Result<Option<UserRow>, StoreError>;

    /// Every student, newest first.
    async fn list_users(&self) -> Result<Vec<UserRow>, StoreError>;

    async fn find_user_by_report_path(
        &self,
        report_path: &str,
    ) -> Result<Option<UserRow>, StoreError>;

    /// Unconditional write (submission path).
    async fn set_user_status(&self, user_id: Uuid, status: UserStatus) -> Result<(), StoreError>;

    /// Compare-and-set from `from` to `to`. When `report_path` is given it is
    /// written along with the status. Returns whether the write applied.
    async fn transition_user_status(
        &self,
        user_id: Uuid,
        from: UserStatus,
        to: UserStatus,
        report_path: Option<&str>,
    ) -> Result<bool, StoreError>;

    /// Records a manually uploaded report and marks it generated.
    async fn attach_report(
        &self,
        user_id: Uuid,
        report_path: &str,
        uploaded_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn get_questionnaire(&self, user_id: Uuid)
        -> Result<Option<QuestionnaireRow>, StoreError>;

    /// Upserts an incomplete questionnaire. Fails with `AlreadyCompleted` if
    /// the stored record is complete.
    async fn save_progress(&self, write: &QuestionnaireWrite)
        -> Result<QuestionnaireRow, StoreError>;

    /// Inserts or upgrades the record to `completed = true`. Fails with
    /// `AlreadyCompleted` if it already was.
    async fn complete_questionnaire(
        &self,
        write: &QuestionnaireWrite,
    ) -> Result<QuestionnaireRow, StoreError>;

    async fn list_marks(&self, user_id: Uuid) -> Result<Vec<MarksRow>, StoreError>;

    /// Upsert keyed by (user, standard); replaces subjects of existing rows.
    async fn upsert_marks(&self, user_id: Uuid, entries: &[MarksEntry]) -> Result<(), StoreError>;
}

/// Durable poll task table. Every mutation after creation only applies to
/// `pending` rows, so a terminal task can never be revived.
#[async_trait]
pub trait PollTaskStore: Send + Sync {
    async fn insert_poll_task(
        &self,
        task_id: &str,
        user_id: Uuid,
        max_attempts: i32,
        due_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn get_poll_task(&self, task_id: &str) -> Result<Option<PollTaskRow>, StoreError>;

    /// Atomically takes up to `limit` pending tasks due at `now` and pushes
    /// their due time to `lease_until` so no other scheduler picks them up.
    async fn claim_due_poll_tasks(
        &self,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<PollTaskRow>, StoreError>;

    /// Earliest due time among pending tasks.
    async fn next_poll_due_at(&self) -> Result<Option<DateTime<Utc>>, StoreError>;

    async fn reschedule_poll_task(
        &self,
        task_id: &str,
        attempts: i32,
        due_at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Moves a pending task to a terminal state. Returns false if it was no
    /// longer pending.
    async fn finish_poll_task(
        &self,
        task_id: &str,
        state: PollTaskState,
        last_error: Option<&str>,
    ) -> Result<bool, StoreError>;
}
