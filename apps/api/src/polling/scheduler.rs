use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{watch, Notify, Semaphore};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::assessment_client::AssessmentService;
use crate::models::poll_task::{PollTaskRow, PollTaskState};
use crate::models::user::UserStatus;
use crate::polling::protocol::{decide, PollDecision};
use crate::polling::PollPolicy;
use crate::store::{AssessmentStore, PollTaskStore, StoreError};

/// Source of due times for poll tasks.
///
/// `Wall` reads the system clock on every call, so replicas sharing
/// `poll_tasks` agree with each other up to NTP skew. The test-only `Tokio`
/// variant pins UTC once and advances with `tokio::time`, so a paused clock
/// drives due times.
#[derive(Debug, Clone, Copy, Default)]
pub enum Clock {
    #[default]
    Wall,
    #[cfg(test)]
    Tokio {
        origin_utc: DateTime<Utc>,
        origin: tokio::time::Instant,
    },
}

impl Clock {
    #[cfg(test)]
    pub fn tokio() -> Self {
        Clock::Tokio {
            origin_utc: Utc::now(),
            origin: tokio::time::Instant::now(),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        match self {
            Clock::Wall => Utc::now(),
            #[cfg(test)]
            Clock::Tokio { origin_utc, origin } => {
                *origin_utc
                    + chrono::Duration::from_std(origin.elapsed())
                        .unwrap_or_else(|_| chrono::Duration::zero())
            }
        }
    }

    pub fn after(&self, delay: Duration) -> DateTime<Utc> {
        self.now() + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero())
    }
}

/// What a single tick did to a task.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Completed { report_path: String },
    Failed,
    TimedOut,
    Rescheduled { attempts: i32 },
    /// Task was already terminal (or revoked mid-tick); nothing written.
    Skipped,
}

/// Supervising loop over the durable poll task table.
///
/// Each pass claims due tasks (leasing them so other replicas skip them),
/// ticks each one on its own tokio task under a semaphore, then sleeps until
/// the earliest due time, a wake-up from `PollHandle`, or shutdown. Pending
/// rows left behind by a previous process are picked up on the first pass.
pub struct PollScheduler {
    users: Arc<dyn AssessmentStore>,
    tasks: Arc<dyn PollTaskStore>,
    service: Arc<dyn AssessmentService>,
    policy: PollPolicy,
    clock: Clock,
    wake: Arc<Notify>,
    permits: Arc<Semaphore>,
}

impl PollScheduler {
    pub fn new(
        users: Arc<dyn AssessmentStore>,
        tasks: Arc<dyn PollTaskStore>,
        service: Arc<dyn AssessmentService>,
        policy: PollPolicy,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(policy.concurrency.max(1)));
        Self {
            users,
            tasks,
            service,
            policy,
            clock: Clock::Wall,
            wake: Arc::new(Notify::new()),
            permits,
        }
    }

    #[cfg(test)]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn handle(&self) -> PollHandle {
        PollHandle {
            users: self.users.clone(),
            tasks: self.tasks.clone(),
            wake: self.wake.clone(),
            clock: self.clock,
            max_attempts: self.policy.max_attempts,
        }
    }

    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Poll scheduler started (interval {:?}, max attempts {})",
            self.policy.interval, self.policy.max_attempts
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let wait = match self.dispatch_due().await {
                // Every permit is busy: due tasks stay due, so only a
                // finishing tick can make progress possible.
                Ok(_) if self.permits.available_permits() == 0 => None,
                Ok(n) => {
                    if n > 0 {
                        debug!("Dispatched {n} poll ticks");
                    }
                    Some(self.time_until_next_due().await)
                }
                Err(e) => {
                    warn!("Failed to claim due poll tasks: {e}");
                    Some(self.policy.interval)
                }
            };

            let Some(wait) = wait else {
                tokio::select! {
                    _ = self.wake.notified() => {}
                    _ = shutdown.changed() => break,
                }
                continue;
            };

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = self.wake.notified() => {}
                _ = shutdown.changed() => break,
            }
        }

        info!("Poll scheduler stopped");
    }

    /// Claims as many due tasks as there are free permits and spawns a tick
    /// for each.
    async fn dispatch_due(self: &Arc<Self>) -> Result<usize, StoreError> {
        let free = self.permits.available_permits() as i64;
        if free == 0 {
            return Ok(0);
        }

        let now = self.clock.now();
        let lease_until = self.clock.after(self.policy.lease);
        let claimed = self
            .tasks
            .claim_due_poll_tasks(now, lease_until, free.min(self.policy.batch_size))
            .await?;

        let count = claimed.len();
        for task in claimed {
            let Ok(permit) = self.permits.clone().acquire_owned().await else {
                break;
            };
            let this = Arc::clone(self);
            tokio::spawn(async move {
                let _permit = permit;
                match this.tick(&task).await {
                    Ok(outcome) => debug!(task_id = %task.task_id, ?outcome, "Poll tick finished"),
                    // Lease expiry hands the task back to a later pass.
                    Err(e) => warn!(task_id = %task.task_id, "Poll tick failed: {e}"),
                }
                this.wake.notify_one();
            });
        }
        Ok(count)
    }

    async fn time_until_next_due(&self) -> Duration {
        match self.tasks.next_poll_due_at().await {
            Ok(Some(due)) => (due - self.clock.now())
                .to_std()
                .unwrap_or(Duration::ZERO)
                .min(self.policy.idle_wait),
            Ok(None) => self.policy.idle_wait,
            Err(e) => {
                warn!("Failed to read next poll due time: {e}");
                self.policy.idle_wait
            }
        }
    }

    /// Runs one status check for `task` and applies the resulting transition.
    ///
    /// The user status is written before the task is closed, so a crash in
    /// between leaves a pending task whose next tick re-derives the same
    /// (compare-and-set, hence harmless) user write.
    pub async fn tick(&self, task: &PollTaskRow) -> Result<PollOutcome, StoreError> {
        let current = match self.tasks.get_poll_task(&task.task_id).await? {
            Some(current) if current.is_pending() => current,
            _ => return Ok(PollOutcome::Skipped),
        };
        let task_id = current.task_id.as_str();
        let user_id = current.user_id;

        let observed = self.service.task_status(task_id).await;
        if let Err(e) = &observed {
            debug!(task_id, %user_id, "Status check failed, treating as inconclusive: {e}");
        }

        match decide(&observed, current.attempts, current.max_attempts) {
            PollDecision::Complete { report_path } => {
                let applied = self
                    .users
                    .transition_user_status(
                        user_id,
                        UserStatus::Analyzing,
                        UserStatus::ReportGenerated,
                        Some(&report_path),
                    )
                    .await?;
                if !self
                    .tasks
                    .finish_poll_task(task_id, PollTaskState::Completed, None)
                    .await?
                {
                    return Ok(PollOutcome::Skipped);
                }
                info!(task_id, %user_id, applied, "Report generated: {report_path}");
                Ok(PollOutcome::Completed { report_path })
            }
            PollDecision::Fail { reason } => {
                self.mark_user_failed(user_id).await?;
                if !self
                    .tasks
                    .finish_poll_task(task_id, PollTaskState::Failed, Some(&reason))
                    .await?
                {
                    return Ok(PollOutcome::Skipped);
                }
                warn!(task_id, %user_id, "Report generation failed: {reason}");
                Ok(PollOutcome::Failed)
            }
            PollDecision::Retry { attempts } => {
                let due_at = self.clock.after(self.policy.interval);
                if !self
                    .tasks
                    .reschedule_poll_task(task_id, attempts, due_at)
                    .await?
                {
                    return Ok(PollOutcome::Skipped);
                }
                debug!(task_id, attempts, "Report not ready, checking again later");
                Ok(PollOutcome::Rescheduled { attempts })
            }
            PollDecision::GiveUp => {
                self.mark_user_failed(user_id).await?;
                if !self
                    .tasks
                    .finish_poll_task(task_id, PollTaskState::Failed, Some("polling timed out"))
                    .await?
                {
                    return Ok(PollOutcome::Skipped);
                }
                warn!(
                    task_id,
                    %user_id,
                    "Polling timed out after {} attempts",
                    current.attempts
                );
                Ok(PollOutcome::TimedOut)
            }
        }
    }

    async fn mark_user_failed(&self, user_id: Uuid) -> Result<bool, StoreError> {
        self.users
            .transition_user_status(user_id, UserStatus::Analyzing, UserStatus::Error, None)
            .await
    }
}

/// Cheap, cloneable front door to the scheduler used by request handlers.
#[derive(Clone)]
pub struct PollHandle {
    users: Arc<dyn AssessmentStore>,
    tasks: Arc<dyn PollTaskStore>,
    wake: Arc<Notify>,
    clock: Clock,
    max_attempts: i32,
}

impl PollHandle {
    /// Persists a new task, due immediately, and wakes the scheduler.
    pub async fn enqueue(&self, task_id: &str, user_id: Uuid) -> Result<(), StoreError> {
        self.tasks
            .insert_poll_task(task_id, user_id, self.max_attempts, self.clock.now())
            .await?;
        self.wake.notify_one();
        info!(task_id, %user_id, "Queued report status polling");
        Ok(())
    }

    /// Stops polling `task_id` on behalf of its owner. `None` when the task
    /// does not exist or belongs to someone else; `Some(false)` when it had
    /// already finished.
    pub async fn revoke(&self, task_id: &str, user_id: Uuid) -> Result<Option<bool>, StoreError> {
        match self.tasks.get_poll_task(task_id).await? {
            Some(task) if task.user_id == user_id => {}
            _ => return Ok(None),
        }

        let revoked = self
            .tasks
            .finish_poll_task(task_id, PollTaskState::Revoked, Some("revoked"))
            .await?;
        if revoked {
            self.users
                .transition_user_status(user_id, UserStatus::Analyzing, UserStatus::Error, None)
                .await?;
            info!(task_id, %user_id, "Report polling revoked");
        }
        Ok(Some(revoked))
    }
}
