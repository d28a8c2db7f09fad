//! In-memory store used by unit and router tests.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::marks::MarksRow;
use crate::models::poll_task::{PollTaskRow, PollTaskState};
use crate::models::questionnaire::QuestionnaireRow;
use crate::models::user::{UserRow, UserStatus};
use crate::store::{AssessmentStore, MarksEntry, PollTaskStore, QuestionnaireWrite, StoreError};

#[derive(Default)]
pub struct MemoryStore {
    users: RwLock<HashMap<Uuid, UserRow>>,
    questionnaires: RwLock<HashMap<Uuid, QuestionnaireRow>>,
    marks: RwLock<Vec<MarksRow>>,
    poll_tasks: RwLock<HashMap<String, PollTaskRow>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a student and returns its id.
    pub async fn add_user(&self, first_name: &str, last_name: &str) -> Uuid {
        let id = Uuid::new_v4();
        let now = Utc::now();
        self.users.write().await.insert(
            id,
            UserRow {
                id,
                first_name: first_name.to_string(),
                last_name: last_name.to_string(),
                email: format!("{}@example.com", first_name.to_lowercase()),
                age: Some("15".to_string()),
                standard: Some("10".to_string()),
                interests: Some("robotics".to_string()),
                status: None,
                report_path: None,
                report_uploaded_at: None,
                created_at: now,
                updated_at: now,
            },
        );
        id
    }

    pub async fn user_status(&self, user_id: Uuid) -> UserStatus {
        self.users
            .read()
            .await
            .get(&user_id)
            .map(|u| u.status())
            .unwrap_or_default()
    }

    fn upsert_questionnaire(
        map: &mut HashMap<Uuid, QuestionnaireRow>,
        write: &QuestionnaireWrite,
        completed: bool,
    ) -> Result<QuestionnaireRow, StoreError> {
        let now = Utc::now();
        match map.get_mut(&write.user_id) {
            Some(existing) if existing.completed => Err(StoreError::AlreadyCompleted),
            Some(existing) => {
                if completed {
                    existing.student_name = write.profile.student_name.clone();
                    existing.age = write.profile.age.clone();
                    existing.academic_info = write.profile.academic_info.clone();
                    existing.interests = write.profile.interests.clone();
                    existing.skill_scores = write.skill_scores.clone();
                    existing.completed = true;
                }
                existing.answers = write.answers.clone();
                existing.current_question = write.current_question;
                existing.updated_at = now;
                Ok(existing.clone())
            }
            None => {
                let row = QuestionnaireRow {
                    id: Uuid::new_v4(),
                    user_id: write.user_id,
                    student_name: write.profile.student_name.clone(),
                    age: write.profile.age.clone(),
                    academic_info: write.profile.academic_info.clone(),
                    interests: write.profile.interests.clone(),
                    answers: write.answers.clone(),
                    skill_scores: write.skill_scores.clone(),
                    current_question: write.current_question,
                    completed,
                    created_at: now,
                    updated_at: now,
                };
                map.insert(write.user_id, row.clone());
                Ok(row)
            }
        }
    }
}

#[async_trait]
impl AssessmentStore for MemoryStore {
    async fn get_user(&self, user_id: Uuid) -> Result<Option<UserRow>, StoreError> {
        Ok(self.users.read().await.get(&user_id).cloned())
    }

    async fn list_users(&self) -> Result<Vec<UserRow>, StoreError> {
        let mut users: Vec<UserRow> = self.users.read().await.values().cloned().collect();
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(users)
    }

    async fn find_user_by_report_path(
        &self,
        report_path: &str,
    ) -> Result<Option<UserRow>, StoreError> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| u.report_path.as_deref() == Some(report_path))
            .cloned())
    }

    async fn set_user_status(&self, user_id: Uuid, status: UserStatus) -> Result<(), StoreError> {
        if let Some(user) = self.users.write().await.get_mut(&user_id) {
            user.status = Some(status.as_str().to_string());
            user.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn transition_user_status(
        &self,
        user_id: Uuid,
        from: UserStatus,
        to: UserStatus,
        report_path: Option<&str>,
    ) -> Result<bool, StoreError> {
        let mut users = self.users.write().await;
        match users.get_mut(&user_id) {
            Some(user) if user.status() == from => {
                user.status = Some(to.as_str().to_string());
                if let Some(path) = report_path {
                    user.report_path = Some(path.to_string());
                }
                user.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn attach_report(
        &self,
        user_id: Uuid,
        report_path: &str,
        uploaded_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        if let Some(user) = self.users.write().await.get_mut(&user_id) {
            user.report_path = Some(report_path.to_string());
            user.status = Some(UserStatus::ReportGenerated.as_str().to_string());
            user.report_uploaded_at = Some(uploaded_at);
            user.updated_at = uploaded_at;
        }
        Ok(())
    }

    async fn get_questionnaire(
        &self,
        user_id: Uuid,
    ) -> Result<Option<QuestionnaireRow>, StoreError> {
        Ok(self.questionnaires.read().await.get(&user_id).cloned())
    }

    async fn save_progress(
        &self,
        write: &QuestionnaireWrite,
    ) -> Result<QuestionnaireRow, StoreError> {
        let mut map = self.questionnaires.write().await;
        Self::upsert_questionnaire(&mut map, write, false)
    }

    async fn complete_questionnaire(
        &self,
        write: &QuestionnaireWrite,
    ) -> Result<QuestionnaireRow, StoreError> {
        let mut map = self.questionnaires.write().await;
        Self::upsert_questionnaire(&mut map, write, true)
    }

    async fn list_marks(&self, user_id: Uuid) -> Result<Vec<MarksRow>, StoreError> {
        let mut rows: Vec<MarksRow> = self
            .marks
            .read()
            .await
            .iter()
            .filter(|m| m.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by_key(|m| m.standard);
        Ok(rows)
    }

    async fn upsert_marks(&self, user_id: Uuid, entries: &[MarksEntry]) -> Result<(), StoreError> {
        let mut marks = self.marks.write().await;
        for entry in entries {
            let now = Utc::now();
            match marks
                .iter_mut()
                .find(|m| m.user_id == user_id && m.standard == entry.standard)
            {
                Some(row) => {
                    row.subjects = entry.subjects.clone();
                    row.created_at = now;
                }
                None => marks.push(MarksRow {
                    id: Uuid::new_v4(),
                    user_id,
                    standard: entry.standard,
                    subjects: entry.subjects.clone(),
                    created_at: now,
                }),
            }
        }
        Ok(())
    }
}

#[async_trait]
impl PollTaskStore for MemoryStore {
    async fn insert_poll_task(
        &self,
        task_id: &str,
        user_id: Uuid,
        max_attempts: i32,
        due_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let now = Utc::now();
        self.poll_tasks
            .write()
            .await
            .entry(task_id.to_string())
            .or_insert_with(|| PollTaskRow {
                task_id: task_id.to_string(),
                user_id,
                attempts: 0,
                max_attempts,
                state: PollTaskState::Pending.as_str().to_string(),
                next_due_at: due_at,
                last_error: None,
                created_at: now,
                updated_at: now,
            });
        Ok(())
    }

    async fn get_poll_task(&self, task_id: &str) -> Result<Option<PollTaskRow>, StoreError> {
        Ok(self.poll_tasks.read().await.get(task_id).cloned())
    }

    async fn claim_due_poll_tasks(
        &self,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<PollTaskRow>, StoreError> {
        let mut tasks = self.poll_tasks.write().await;
        let mut due: Vec<&mut PollTaskRow> = tasks
            .values_mut()
            .filter(|t| t.is_pending() && t.next_due_at <= now)
            .collect();
        due.sort_by_key(|t| t.next_due_at);

        let mut claimed = Vec::new();
        for task in due.into_iter().take(limit.max(0) as usize) {
            task.next_due_at = lease_until;
            claimed.push(task.clone());
        }
        Ok(claimed)
    }

    async fn next_poll_due_at(&self) -> Result<Option<DateTime<Utc>>, StoreError> {
        Ok(self
            .poll_tasks
            .read()
            .await
            .values()
            .filter(|t| t.is_pending())
            .map(|t| t.next_due_at)
            .min())
    }

    async fn reschedule_poll_task(
        &self,
        task_id: &str,
        attempts: i32,
        due_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        match self.poll_tasks.write().await.get_mut(task_id) {
            Some(task) if task.is_pending() => {
                task.attempts = attempts;
                task.next_due_at = due_at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn finish_poll_task(
        &self,
        task_id: &str,
        state: PollTaskState,
        last_error: Option<&str>,
    ) -> Result<bool, StoreError> {
        match self.poll_tasks.write().await.get_mut(task_id) {
            Some(task) if task.is_pending() => {
                task.state = state.as_str().to_string();
                task.last_error = last_error.map(str::to_string);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
