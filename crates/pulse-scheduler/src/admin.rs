//! Administrative control surface.
//!
//! Everything the portal's admin pages need: job lifecycle, run inspection,
//! scheduled-run cancellation and the settings singleton. All mutations go
//! through the store's conditional operations, so an admin acting on a
//! stale page cannot corrupt a run the scheduler just claimed.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

use pulse_recurrence::compute_next_run;
use pulse_store::{JobQuery, JobStore, RunQuery, StoreError};
use pulse_types::{
    DistributionSettings, JobPayload, JobRun, JobStatus, RecurrenceRule, ScheduledJob,
};

use crate::error::SchedulerError;

/// Admin operations over the job store.
pub struct AdminApi {
    store: Arc<dyn JobStore>,
}

impl AdminApi {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }

    /// Create a new scheduled job.
    ///
    /// The rule is validated and its first due time computed up front; a
    /// rule that can never fire (e.g. a one-shot in the past) is rejected
    /// instead of being stored as a dead job.
    pub fn create_job(
        &self,
        name: &str,
        rule: RecurrenceRule,
        payload: JobPayload,
        now: DateTime<Utc>,
    ) -> Result<ScheduledJob, SchedulerError> {
        rule.validate()?;
        let settings = self.store.load_settings()?;
        let next = compute_next_run(&rule, now, &settings.calendar())?
            .ok_or(SchedulerError::NoOccurrences(now))?;

        let mut job = ScheduledJob::new(name, rule, payload);
        job.next_run_at = Some(next);
        self.store.put_job(&job)?;
        info!(job = %job.id, name = %job.name, first_run = %next, "Created job");
        Ok(job)
    }

    pub fn get_job(&self, job_id: &str) -> Result<ScheduledJob, SchedulerError> {
        self.store
            .get_job(job_id)?
            .ok_or_else(|| SchedulerError::JobNotFound(job_id.to_string()))
    }

    pub fn list_jobs(&self, status: Option<JobStatus>) -> Result<Vec<ScheduledJob>, SchedulerError> {
        Ok(self.store.list_jobs(&JobQuery { status })?)
    }

    /// Pause an active job. Already-created runs are unaffected; only
    /// future dispatch stops. Returns false when the job was not active.
    pub fn pause_job(&self, job_id: &str) -> Result<bool, SchedulerError> {
        let paused = self
            .store
            .set_job_status(job_id, JobStatus::Active, JobStatus::Paused)
            .map_err(|e| not_found_as_job(e, job_id))?;
        if paused {
            info!(job = %job_id, "Paused job");
        }
        Ok(paused)
    }

    /// Resume a paused job.
    ///
    /// The next due time is recomputed from `now`, so occurrences missed
    /// while paused are skipped rather than fired in a burst. A job whose
    /// rule is exhausted by the time it is resumed goes straight to
    /// `Archived`.
    pub fn resume_job(&self, job_id: &str, now: DateTime<Utc>) -> Result<bool, SchedulerError> {
        let resumed = self
            .store
            .set_job_status(job_id, JobStatus::Paused, JobStatus::Active)
            .map_err(|e| not_found_as_job(e, job_id))?;
        if !resumed {
            return Ok(false);
        }

        let job = self.get_job(job_id)?;
        let settings = self.store.load_settings()?;
        match compute_next_run(&job.rule, now, &settings.calendar())? {
            Some(next) => {
                self.store
                    .update_job_schedule(job_id, job.last_run_at, Some(next))?;
                info!(job = %job_id, next_run = %next, "Resumed job");
            }
            None => {
                self.store
                    .update_job_schedule(job_id, job.last_run_at, None)?;
                self.store
                    .set_job_status(job_id, JobStatus::Active, JobStatus::Archived)?;
                info!(job = %job_id, "Resumed job has no future occurrences, archived");
            }
        }
        Ok(true)
    }

    /// Delete a run that has not started executing yet.
    ///
    /// Returns false when the run was already claimed (or gone); the
    /// deletion also clears the occurrence index, so the dispatcher will
    /// recreate the run if the job's due time still points at it.
    pub fn delete_scheduled_run(&self, run_id: &str) -> Result<bool, SchedulerError> {
        let deleted = self.store.delete_run_if_scheduled(run_id)?;
        if deleted {
            info!(run = %run_id, "Deleted scheduled run");
        }
        Ok(deleted)
    }

    pub fn get_run_details(&self, run_id: &str) -> Result<JobRun, SchedulerError> {
        self.store
            .get_run(run_id)?
            .ok_or_else(|| SchedulerError::RunNotFound(run_id.to_string()))
    }

    pub fn list_runs(&self, query: &RunQuery) -> Result<Vec<JobRun>, SchedulerError> {
        Ok(self.store.list_runs(query)?)
    }

    pub fn get_settings(&self) -> Result<DistributionSettings, SchedulerError> {
        Ok(self.store.load_settings()?)
    }

    /// Replace the settings singleton. Takes effect on the scheduler's
    /// next poll cycle.
    pub fn update_settings(&self, settings: &DistributionSettings) -> Result<(), SchedulerError> {
        settings.validate()?;
        self.store.save_settings(settings)?;
        info!("Updated distribution settings");
        Ok(())
    }
}

fn not_found_as_job(err: StoreError, job_id: &str) -> SchedulerError {
    match err {
        StoreError::NotFound(_) => SchedulerError::JobNotFound(job_id.to_string()),
        other => SchedulerError::Store(other),
    }
}
