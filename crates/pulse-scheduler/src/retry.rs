//! Run-level retry policy.
//!
//! Retries reuse the same run row: counters and progress carry over so a
//! retried run resumes where the failed attempt stopped, and the history
//! shows one row per occurrence rather than one per attempt. The delay is
//! fixed (no backoff) and the budget comes from the settings singleton.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use pulse_store::JobStore;
use pulse_types::{DistributionSettings, RunStatus};

use crate::backend::{FailureNotice, NotificationSink};
use crate::error::SchedulerError;

/// What the run driver should do after a recorded failure.
#[derive(Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Budget remains: re-claim the run (from `Failed`) after the delay.
    RetryAfter(Duration),

    /// Budget exhausted: the run is terminal and the operator was notified
    /// (when notification is enabled).
    Exhausted,
}

/// Records run failures and decides between retry and giving up.
pub struct RetryCoordinator {
    store: Arc<dyn JobStore>,
    sink: Arc<dyn NotificationSink>,
}

impl RetryCoordinator {
    pub fn new(store: Arc<dyn JobStore>, sink: Arc<dyn NotificationSink>) -> Self {
        Self { store, sink }
    }

    /// Mark the run `Failed` with `message` and decide whether a retry is
    /// owed.
    ///
    /// The retry attempt itself is consumed later, at the `Failed` →
    /// `InProgress` re-claim: a run waiting out its delay is still stored
    /// below the budget, so a restart during the delay recovers it instead
    /// of reading it as terminal.
    ///
    /// Exactly one notification is emitted per run, at the moment the
    /// budget runs out; earlier failures only log.
    pub async fn handle_failure(
        &self,
        run_id: &str,
        message: &str,
        settings: &DistributionSettings,
    ) -> Result<RetryDecision, SchedulerError> {
        let mut run = self
            .store
            .get_run(run_id)?
            .ok_or_else(|| SchedulerError::RunNotFound(run_id.to_string()))?;

        run.status = RunStatus::Failed;
        run.error_message = Some(message.to_string());

        if run.retry_count < settings.retry_attempts {
            run.log(format!(
                "Attempt failed, retry {} of {} pending: {message}",
                run.retry_count + 1,
                settings.retry_attempts
            ));
            self.store.write_run(&run)?;

            let delay = Duration::from_millis(settings.retry_delay_ms);
            info!(
                run = %run.id,
                job = %run.job_id,
                retry = run.retry_count + 1,
                delay_ms = settings.retry_delay_ms,
                "Run failed, scheduling retry"
            );
            return Ok(RetryDecision::RetryAfter(delay));
        }

        run.log(format!("Retries exhausted, giving up: {message}"));
        self.store.write_run(&run)?;
        warn!(run = %run.id, job = %run.job_id, "Run failed terminally");

        if settings.notification_on_error {
            let job_name = self
                .store
                .get_job(&run.job_id)?
                .map(|j| j.name)
                .unwrap_or_else(|| run.job_id.clone());
            let notice = FailureNotice {
                job_id: run.job_id.clone(),
                job_name,
                run_id: run.id.clone(),
                scheduled_for: run.scheduled_for,
                error_message: message.to_string(),
                retry_count: run.retry_count,
                email: settings.notification_email.clone(),
            };
            // Notification delivery never alters the run's terminal state.
            if let Err(e) = self.sink.notify_failure(&notice).await {
                warn!(run = %run.id, error = %e, "Failure notification not delivered");
            }
        }

        Ok(RetryDecision::Exhausted)
    }
}
