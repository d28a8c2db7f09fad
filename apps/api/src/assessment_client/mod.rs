//! Assessment service client. Every call to the external scoring and report
//! service goes through the `AssessmentService` trait.
//!
//! Endpoints (relative to `ASSESSMENT_BASE_URL`):
//! - `POST /api/calculate-scores`  → `{ trait_scores }`
//! - `POST /api/submit-assessment` → `{ task_id }`
//! - `GET  /api/task-status/{id}`  → `{ status, report_url?, error? }`

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::store::StudentProfile;

/// Retries for the idempotent scoring call only. Report dispatch is never
/// retried because a second POST would start a second job.
const SCORE_MAX_RETRIES: u32 = 2;

pub type TraitScores = BTreeMap<String, f64>;

#[derive(Debug, Error)]
pub enum AssessmentError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("No task ID received from AI service")]
    MissingTaskId,
}

/// Body of `submit-assessment`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentRequest<'a> {
    #[serde(flatten)]
    pub profile: &'a StudentProfile,
    pub answers: &'a Map<String, Value>,
}

/// Snapshot returned by `task-status`. `status` is free-form upstream; only
/// `completed` and `error` carry meaning.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TaskStatus {
    #[serde(default)]
    pub status: String,
    pub report_url: Option<String>,
    pub error: Option<String>,
}

#[async_trait]
pub trait AssessmentService: Send + Sync {
    async fn calculate_scores(
        &self,
        answers: &Map<String, Value>,
    ) -> Result<TraitScores, AssessmentError>;

    /// Starts report generation and returns the upstream task id.
    async fn submit_assessment(
        &self,
        request: &AssessmentRequest<'_>,
    ) -> Result<String, AssessmentError>;

    async fn task_status(&self, task_id: &str) -> Result<TaskStatus, AssessmentError>;
}

#[derive(Debug, Serialize)]
struct ScoreRequest<'a> {
    answers: &'a Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct ScoreResponse {
    #[serde(default)]
    trait_scores: TraitScores,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    task_id: Option<String>,
}

/// reqwest-backed client for the hosted assessment service.
#[derive(Clone)]
pub struct HttpAssessmentClient {
    client: Client,
    base_url: String,
}

impl HttpAssessmentClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, AssessmentError> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            base_url: base_url.into(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/api/{}", self.base_url.trim_end_matches('/'), path)
    }

    /// Turns a non-2xx response into `AssessmentError::Api`.
    async fn check(response: reqwest::Response) -> Result<reqwest::Response, AssessmentError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(AssessmentError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl AssessmentService for HttpAssessmentClient {
    async fn calculate_scores(
        &self,
        answers: &Map<String, Value>,
    ) -> Result<TraitScores, AssessmentError> {
        let url = self.endpoint("calculate-scores");
        let body = ScoreRequest { answers };
        let mut last_error: Option<AssessmentError> = None;

        for attempt in 0..=SCORE_MAX_RETRIES {
            if attempt > 0 {
                // Exponential backoff: 500ms, 1s
                let delay = Duration::from_millis(500 * (1 << (attempt - 1)));
                warn!(
                    "Score calculation attempt {} failed, retrying after {}ms...",
                    attempt,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            let response = match self.client.post(&url).json(&body).send().await {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(AssessmentError::Http(e));
                    continue;
                }
            };

            let status = response.status();
            if status.as_u16() == 429 || status.is_server_error() {
                let message = response.text().await.unwrap_or_default();
                last_error = Some(AssessmentError::Api {
                    status: status.as_u16(),
                    message,
                });
                continue;
            }

            let parsed: ScoreResponse = Self::check(response).await?.json().await?;
            debug!("Received {} trait scores", parsed.trait_scores.len());
            return Ok(parsed.trait_scores);
        }

        Err(last_error.unwrap_or(AssessmentError::Api {
            status: 503,
            message: "score calculation retries exhausted".to_string(),
        }))
    }

    async fn submit_assessment(
        &self,
        request: &AssessmentRequest<'_>,
    ) -> Result<String, AssessmentError> {
        let response = self
            .client
            .post(self.endpoint("submit-assessment"))
            .json(request)
            .send()
            .await?;

        let parsed: SubmitResponse = Self::check(response).await?.json().await?;
        match parsed.task_id {
            Some(id) if !id.trim().is_empty() => Ok(id),
            _ => Err(AssessmentError::MissingTaskId),
        }
    }

    async fn task_status(&self, task_id: &str) -> Result<TaskStatus, AssessmentError> {
        let response = self
            .client
            .get(self.endpoint(&format!("task-status/{task_id}")))
            .send()
            .await?;

        Ok(Self::check(response).await?.json().await?)
    }
}
