//! One step of the report poll: given what the assessment service said about a
//! task and how many retries it has already consumed, decide what happens next.

use crate::assessment_client::{AssessmentError, TaskStatus};

#[derive(Debug, Clone, PartialEq)]
pub enum PollDecision {
    /// Report is ready; `report_path` is the trailing segment of its URL.
    Complete { report_path: String },
    /// Upstream reported the job failed. Not retried.
    Fail { reason: String },
    /// Inconclusive; check again with the given attempt count.
    Retry { attempts: i32 },
    /// Retry budget spent.
    GiveUp,
}

/// Transport failures and unknown statuses are treated the same as a job
/// that is still running.
pub fn decide(
    observed: &Result<TaskStatus, AssessmentError>,
    attempts: i32,
    max_attempts: i32,
) -> PollDecision {
    if let Ok(status) = observed {
        match status.status.as_str() {
            "completed" => {
                if let Some(path) = status.report_url.as_deref().and_then(report_identifier) {
                    return PollDecision::Complete { report_path: path };
                }
            }
            "error" => {
                return PollDecision::Fail {
                    reason: status
                        .error
                        .clone()
                        .unwrap_or_else(|| "report generation failed".to_string()),
                };
            }
            _ => {}
        }
    }

    if attempts < max_attempts {
        PollDecision::Retry {
            attempts: attempts + 1,
        }
    } else {
        PollDecision::GiveUp
    }
}

/// Last path segment of a report URL, ignoring trailing slashes.
/// `https://x/y/report123.pdf` → `report123.pdf`.
pub fn report_identifier(report_url: &str) -> Option<String> {
    report_url
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty() && !segment.contains(':'))
        .map(str::to_string)
}
