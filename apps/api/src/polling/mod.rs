// Report status polling.
// A submitted questionnaire leaves one row in `poll_tasks`; the scheduler keeps
// checking the assessment service until the row reaches a terminal state.

pub mod protocol;
pub mod scheduler;

use std::time::Duration;

use crate::config::Config;

pub use scheduler::{PollHandle, PollScheduler};

#[derive(Debug, Clone)]
pub struct PollPolicy {
    /// Gap between two status checks of the same task.
    pub interval: Duration,
    /// Inconclusive checks allowed before giving up.
    pub max_attempts: i32,
    /// How long a claimed task stays invisible to other scheduler passes.
    pub lease: Duration,
    /// Upper bound on scheduler sleep when nothing is due sooner.
    pub idle_wait: Duration,
    pub batch_size: i64,
    pub concurrency: usize,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_attempts: 120,
            lease: Duration::from_secs(60),
            idle_wait: Duration::from_secs(30),
            batch_size: 32,
            concurrency: 16,
        }
    }
}

impl PollPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            interval: config.poll_interval,
            max_attempts: config.poll_max_attempts,
            // A lease must outlive one upstream call plus the retry gap.
            lease: config.assessment_timeout + config.poll_interval * 2,
            concurrency: config.poll_concurrency,
            ..Self::default()
        }
    }
}
