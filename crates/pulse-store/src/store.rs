//! The `JobStore` contract.
//!
//! The scheduler, executor, retry coordinator and admin surface all speak
//! to storage through this trait. Every operation that matters for
//! correctness (run creation, status transitions, scheduled-run deletion)
//! is conditional at the store so that concurrent dispatchers or a restart
//! cannot double-execute a due time.

use chrono::{DateTime, Utc};

use pulse_types::{DistributionSettings, JobRun, JobStatus, RunStatus, ScheduledJob};

use crate::error::StoreError;

/// Filter for listing scheduled jobs.
#[derive(Debug, Clone, Default)]
pub struct JobQuery {
    pub status: Option<JobStatus>,
}

/// Filter for listing job runs. Results are ordered by ascending
/// `scheduled_for`.
#[derive(Debug, Clone, Default)]
pub struct RunQuery {
    pub job_id: Option<String>,
    pub status: Option<RunStatus>,
    pub limit: Option<usize>,
}

impl RunQuery {
    pub(crate) fn matches(&self, run: &JobRun) -> bool {
        if let Some(job_id) = &self.job_id {
            if &run.job_id != job_id {
                return false;
            }
        }
        if let Some(status) = self.status {
            if run.status != status {
                return false;
            }
        }
        true
    }
}

/// Durable storage for job definitions, run history and settings.
pub trait JobStore: Send + Sync {
    /// Insert or replace a job definition.
    fn put_job(&self, job: &ScheduledJob) -> Result<(), StoreError>;

    fn get_job(&self, job_id: &str) -> Result<Option<ScheduledJob>, StoreError>;

    fn list_jobs(&self, query: &JobQuery) -> Result<Vec<ScheduledJob>, StoreError>;

    /// Active jobs with `next_run_at <= now`, ascending by due time.
    fn due_jobs(&self, now: DateTime<Utc>) -> Result<Vec<ScheduledJob>, StoreError>;

    /// Conditionally move a job between lifecycle states.
    ///
    /// Returns false when the stored status is not `from` (lost race or
    /// stale view); the store is unchanged in that case.
    fn set_job_status(
        &self,
        job_id: &str,
        from: JobStatus,
        to: JobStatus,
    ) -> Result<bool, StoreError>;

    /// Persist the job's schedule bookkeeping after a dispatch.
    fn update_job_schedule(
        &self,
        job_id: &str,
        last_run_at: Option<DateTime<Utc>>,
        next_run_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError>;

    /// Create a run in `Scheduled` state for `(job_id, scheduled_for)`.
    ///
    /// Idempotent: returns `None` when a run for that occurrence already
    /// exists, so re-dispatch of the same due time is a no-op.
    fn create_run(
        &self,
        job_id: &str,
        scheduled_for: DateTime<Utc>,
    ) -> Result<Option<JobRun>, StoreError>;

    /// Compare-and-swap a run's status.
    ///
    /// Returns false when the stored status is not `from`. This is the
    /// claim step that makes execution exactly-once-in-flight.
    fn transition_run(
        &self,
        run_id: &str,
        from: RunStatus,
        to: RunStatus,
    ) -> Result<bool, StoreError>;

    /// Claim a `Failed` run for a retry attempt.
    ///
    /// Atomically moves the run to `InProgress` and increments its
    /// `retry_count`, so a stored `Failed` run's count only ever reflects
    /// retries that actually started executing. Returns false when the
    /// stored status is not `Failed`.
    fn claim_retry(&self, run_id: &str) -> Result<bool, StoreError>;

    /// Persist run progress (counters, log, error message).
    ///
    /// Rejected with `StoreError::Conflict` when the stored run is already
    /// `Completed`; completed runs are immutable.
    fn write_run(&self, run: &JobRun) -> Result<(), StoreError>;

    fn get_run(&self, run_id: &str) -> Result<Option<JobRun>, StoreError>;

    fn list_runs(&self, query: &RunQuery) -> Result<Vec<JobRun>, StoreError>;

    /// Runs still in `Scheduled` state, oldest due time first.
    fn pending_runs(&self, limit: usize) -> Result<Vec<JobRun>, StoreError>;

    /// Delete a run only while it is still `Scheduled`.
    ///
    /// Returns false when the run does not exist or has already been
    /// claimed, which makes the admin delete race-safe against admission.
    fn delete_run_if_scheduled(&self, run_id: &str) -> Result<bool, StoreError>;

    /// Load the settings singleton, falling back to defaults when unset.
    fn load_settings(&self) -> Result<DistributionSettings, StoreError>;

    fn save_settings(&self, settings: &DistributionSettings) -> Result<(), StoreError>;
}
