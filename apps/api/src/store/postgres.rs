use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use crate::models::marks::MarksRow;
use crate::models::poll_task::{PollTaskRow, PollTaskState};
use crate::models::questionnaire::QuestionnaireRow;
use crate::models::user::{UserRow, UserStatus};
use crate::store::{AssessmentStore, MarksEntry, PollTaskStore, QuestionnaireWrite, StoreError};

/// PostgreSQL-backed store. Schema lives in `migrations/`.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AssessmentStore for PgStore {
    async fn get_user(&self, user_id: Uuid) -> Result<Option<UserRow>, StoreError> {
        Ok(
            sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn list_users(&self) -> Result<Vec<UserRow>, StoreError> {
        Ok(
            sqlx::query_as::<_, UserRow>("SELECT * FROM users ORDER BY created_at DESC")
                .fetch_all(&self.pool)
                .await?,
        )
    }

    async fn find_user_by_report_path(
        &self,
        report_path: &str,
    ) -> Result<Option<UserRow>, StoreError> {
        Ok(
            sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE report_path = $1 LIMIT 1")
                .bind(report_path)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn set_user_status(&self, user_id: Uuid, status: UserStatus) -> Result<(), StoreError> {
        sqlx::query("UPDATE users SET status = $1, updated_at = now() WHERE id = $2")
            .bind(status.as_str())
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn transition_user_status(
        &self,
        user_id: Uuid,
        from: UserStatus,
        to: UserStatus,
        report_path: Option<&str>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET status = $1,
                report_path = COALESCE($2, report_path),
                updated_at = now()
            WHERE id = $3 AND COALESCE(status, 'Pending') = $4
            "#,
        )
        .bind(to.as_str())
        .bind(report_path)
        .bind(user_id)
        .bind(from.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn attach_report(
        &self,
        user_id: Uuid,
        report_path: &str,
        uploaded_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE users
            SET report_path = $1,
                status = $2,
                report_uploaded_at = $3,
                updated_at = now()
            WHERE id = $4
            "#,
        )
        .bind(report_path)
        .bind(UserStatus::ReportGenerated.as_str())
        .bind(uploaded_at)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_questionnaire(
        &self,
        user_id: Uuid,
    ) -> Result<Option<QuestionnaireRow>, StoreError> {
        Ok(sqlx::query_as::<_, QuestionnaireRow>(
            "SELECT * FROM questionnaires WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn save_progress(
        &self,
        write: &QuestionnaireWrite,
    ) -> Result<QuestionnaireRow, StoreError> {
        // The conditional DO UPDATE returns no row when the record is complete.
        let row = sqlx::query_as::<_, QuestionnaireRow>(
            r#"
            INSERT INTO questionnaires
                (user_id, student_name, age, academic_info, interests,
                 answers, skill_scores, current_question, completed)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, FALSE)
            ON CONFLICT (user_id) DO UPDATE
            SET answers = EXCLUDED.answers,
                current_question = EXCLUDED.current_question,
                updated_at = now()
            WHERE questionnaires.completed = FALSE
            RETURNING *
            "#,
        )
        .bind(write.user_id)
        .bind(&write.profile.student_name)
        .bind(&write.profile.age)
        .bind(&write.profile.academic_info)
        .bind(&write.profile.interests)
        .bind(&write.answers)
        .bind(&write.skill_scores)
        .bind(write.current_question)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or(StoreError::AlreadyCompleted)
    }

    async fn complete_questionnaire(
        &self,
        write: &QuestionnaireWrite,
    ) -> Result<QuestionnaireRow, StoreError> {
        let row = sqlx::query_as::<_, QuestionnaireRow>(
            r#"
            INSERT INTO questionnaires
                (user_id, student_name, age, academic_info, interests,
                 answers, skill_scores, current_question, completed)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, TRUE)
            ON CONFLICT (user_id) DO UPDATE
            SET student_name = EXCLUDED.student_name,
                age = EXCLUDED.age,
                academic_info = EXCLUDED.academic_info,
                interests = EXCLUDED.interests,
                answers = EXCLUDED.answers,
                skill_scores = EXCLUDED.skill_scores,
                current_question = EXCLUDED.current_question,
                completed = TRUE,
                updated_at = now()
            WHERE questionnaires.completed = FALSE
            RETURNING *
            "#,
        )
        .bind(write.user_id)
        .bind(&write.profile.student_name)
        .bind(&write.profile.age)
        .bind(&write.profile.academic_info)
        .bind(&write.profile.interests)
        .bind(&write.answers)
        .bind(&write.skill_scores)
        .bind(write.current_question)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or(StoreError::AlreadyCompleted)
    }

    async fn list_marks(&self, user_id: Uuid) -> Result<Vec<MarksRow>, StoreError> {
        Ok(sqlx::query_as::<_, MarksRow>(
            "SELECT * FROM marks WHERE user_id = $1 ORDER BY standard ASC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn upsert_marks(&self, user_id: Uuid, entries: &[MarksEntry]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        for entry in entries {
            sqlx::query(
                r#"
                INSERT INTO marks (user_id, standard, subjects, created_at)
                VALUES ($1, $2, $3, now())
                ON CONFLICT (user_id, standard) DO UPDATE
                SET subjects = EXCLUDED.subjects,
                    created_at = now()
                "#,
            )
            .bind(user_id)
            .bind(entry.standard)
            .bind(&entry.subjects)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        debug!("Upserted {} marks rows for user {user_id}", entries.len());
        Ok(())
    }
}

#[async_trait]
impl PollTaskStore for PgStore {
    async fn insert_poll_task(
        &self,
        task_id: &str,
        user_id: Uuid,
        max_attempts: i32,
        due_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO poll_tasks (task_id, user_id, attempts, max_attempts, state, next_due_at)
            VALUES ($1, $2, 0, $3, $4, $5)
            ON CONFLICT (task_id) DO NOTHING
            "#,
        )
        .bind(task_id)
        .bind(user_id)
        .bind(max_attempts)
        .bind(PollTaskState::Pending.as_str())
        .bind(due_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_poll_task(&self, task_id: &str) -> Result<Option<PollTaskRow>, StoreError> {
        Ok(
            sqlx::query_as::<_, PollTaskRow>("SELECT * FROM poll_tasks WHERE task_id = $1")
                .bind(task_id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn claim_due_poll_tasks(
        &self,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<PollTaskRow>, StoreError> {
        // SKIP LOCKED lets several API replicas share the table.
        Ok(sqlx::query_as::<_, PollTaskRow>(
            r#"
            WITH due AS (
                SELECT task_id
                FROM poll_tasks
                WHERE state = $1 AND next_due_at <= $2
                ORDER BY next_due_at
                LIMIT $3
                FOR UPDATE SKIP LOCKED
            )
            UPDATE poll_tasks p
            SET next_due_at = $4,
                updated_at = now()
            FROM due
            WHERE p.task_id = due.task_id
            RETURNING p.*
            "#,
        )
        .bind(PollTaskState::Pending.as_str())
        .bind(now)
        .bind(limit)
        .bind(lease_until)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn next_poll_due_at(&self) -> Result<Option<DateTime<Utc>>, StoreError> {
        Ok(
            sqlx::query_scalar::<_, Option<DateTime<Utc>>>(
                "SELECT MIN(next_due_at) FROM poll_tasks WHERE state = $1",
            )
            .bind(PollTaskState::Pending.as_str())
            .fetch_one(&self.pool)
            .await?,
        )
    }

    async fn reschedule_poll_task(
        &self,
        task_id: &str,
        attempts: i32,
        due_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE poll_tasks
            SET attempts = $1, next_due_at = $2, updated_at = now()
            WHERE task_id = $3 AND state = $4
            "#,
        )
        .bind(attempts)
        .bind(due_at)
        .bind(task_id)
        .bind(PollTaskState::Pending.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn finish_poll_task(
        &self,
        task_id: &str,
        state: PollTaskState,
        last_error: Option<&str>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE poll_tasks
            SET state = $1, last_error = $2, updated_at = now()
            WHERE task_id = $3 AND state = $4
            "#,
        )
        .bind(state.as_str())
        .bind(last_error)
        .bind(task_id)
        .bind(PollTaskState::Pending.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
