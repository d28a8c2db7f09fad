use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};
use uuid::Uuid;

use crate::assessment_client::{AssessmentRequest, AssessmentService};
use crate::errors::AppError;
use crate::models::questionnaire::QuestionnaireRow;
use crate::models::user::{UserRow, UserStatus};
use crate::polling::PollHandle;
use crate::store::{AssessmentStore, QuestionnaireWrite, StoreError, StudentProfile};

/// One answered question as posted by the dashboard.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawAnswer {
    pub question_id: Value,
    pub answer: Value,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReportStatus {
    pub status: UserStatus,
    pub report_path: Option<String>,
}

/// Flattens `[{questionId, answer}]` into `{questionId: answer}`. Non-string
/// ids are keyed by their JSON text; a repeated id keeps the last answer.
pub fn answers_to_map(answers: &[RawAnswer]) -> Map<String, Value> {
    answers
        .iter()
        .map(|a| {
            let key = match &a.question_id {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (key, a.answer.clone())
        })
        .collect()
}

/// Drives a questionnaire from first answer to a generated report.
#[derive(Clone)]
pub struct Orchestrator {
    store: Arc<dyn AssessmentStore>,
    service: Arc<dyn AssessmentService>,
    polls: PollHandle,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn AssessmentStore>,
        service: Arc<dyn AssessmentService>,
        polls: PollHandle,
    ) -> Self {
        Self {
            store,
            service,
            polls,
        }
    }

    /// Persists a completed questionnaire and dispatches report generation.
    /// Returns the upstream task id once polling has been queued; does not
    /// wait for the report.
    pub async fn submit_answers(
        &self,
        user_id: Uuid,
        answers: &[RawAnswer],
    ) -> Result<String, AppError> {
        let user = self
            .store
            .get_user(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

        if let Some(existing) = self.store.get_questionnaire(user_id).await? {
            if existing.completed {
                return Err(AppError::Conflict("Questionnaire already submitted".to_string()));
            }
        }

        match self.dispatch(&user, answers).await {
            Ok(task_id) => Ok(task_id),
            // Lost a race with a concurrent submission; its status stands.
            Err(e @ AppError::Conflict(_)) => Err(e),
            Err(e) => {
                if let Err(store_err) = self.store.set_user_status(user_id, UserStatus::Error).await
                {
                    warn!("Failed to record Error status for user {user_id}: {store_err}");
                }
                Err(e)
            }
        }
    }

    async fn dispatch(&self, user: &UserRow, answers: &[RawAnswer]) -> Result<String, AppError> {
        let user_id = user.id;
        self.store
            .set_user_status(user_id, UserStatus::Analyzing)
            .await?;

        let answers = answers_to_map(answers);
        let profile = StudentProfile::from_user(user);

        // Scoring is best-effort: a failure leaves the map empty.
        let skill_scores = match self.service.calculate_scores(&answers).await {
            Ok(scores) => {
                info!("Received {} skill scores for user {user_id}", scores.len());
                scores
            }
            Err(e) => {
                warn!("Failed to get skill scores for user {user_id}: {e}");
                Default::default()
            }
        };

        let write = QuestionnaireWrite {
            user_id,
            profile: profile.clone(),
            answers: Value::Object(answers.clone()),
            skill_scores: serde_json::to_value(&skill_scores)
                .map_err(|e| AppError::Internal(e.into()))?,
            current_question: answers.len() as i32,
        };
        self.store
            .complete_questionnaire(&write)
            .await
            .map_err(conflict_or_store)?;

        let task_id = self
            .service
            .submit_assessment(&AssessmentRequest {
                profile: &profile,
                answers: &answers,
            })
            .await?;

        self.polls.enqueue(&task_id, user_id).await?;
        info!("Report generation started for user {user_id} (task {task_id})");
        Ok(task_id)
    }

    /// Upserts an unfinished questionnaire. No scoring, no polling.
    pub async fn save_progress(
        &self,
        user_id: Uuid,
        current_question: i32,
        answers: Map<String, Value>,
    ) -> Result<QuestionnaireRow, AppError> {
        if current_question < 0 {
            return Err(AppError::Validation(
                "currentQuestion must not be negative".to_string(),
            ));
        }
        let user = self
            .store
            .get_user(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

        let write = QuestionnaireWrite {
            user_id,
            profile: StudentProfile::from_user(&user),
            answers: Value::Object(answers),
            skill_scores: Value::Object(Map::new()),
            current_question,
        };
        self.store
            .save_progress(&write)
            .await
            .map_err(conflict_or_store)
    }

    pub async fn get_status(&self, user_id: Uuid) -> Result<ReportStatus, AppError> {
        let user = self
            .store
            .get_user(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
        Ok(ReportStatus {
            status: user.status(),
            report_path: user.report_path,
        })
    }

    pub async fn get_answers(&self, user_id: Uuid) -> Result<QuestionnaireRow, AppError> {
        self.store
            .get_questionnaire(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("No questionnaire found for this user".to_string()))
    }

    pub async fn revoke_poll(&self, user_id: Uuid, task_id: &str) -> Result<bool, AppError> {
        self.polls
            .revoke(task_id, user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Poll task {task_id} not found")))
    }
}

fn conflict_or_store(e: StoreError) -> AppError {
    match e {
        StoreError::AlreadyCompleted => {
            AppError::Conflict("Questionnaire already submitted".to_string())
        }
        other => AppError::Store(other),
    }
}
