//! Due-job dispatch.
//!
//! For every active job whose due time has arrived, create a run for that
//! occurrence (idempotently, so a concurrent dispatcher or a re-triggered
//! poll cannot double-create it) and immediately advance the job's next
//! due time. The advance happens before execution starts, so a failed run
//! never loses the job's future schedule.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use pulse_recurrence::compute_next_run;
use pulse_store::JobStore;
use pulse_types::{DistributionSettings, JobStatus, ScheduledJob};

use crate::error::SchedulerError;

/// Dispatch all due jobs. Returns the number of runs created.
pub fn dispatch_due_jobs(
    store: &Arc<dyn JobStore>,
    settings: &DistributionSettings,
    now: DateTime<Utc>,
) -> Result<usize, SchedulerError> {
    let mut created = 0;
    for job in store.due_jobs(now)? {
        match dispatch_one(store, settings, &job, now) {
            Ok(true) => created += 1,
            Ok(false) => {}
            // One broken job must not starve the rest of the cycle.
            Err(e) => warn!(job = %job.id, error = %e, "Dispatch failed"),
        }
    }
    Ok(created)
}

fn dispatch_one(
    store: &Arc<dyn JobStore>,
    settings: &DistributionSettings,
    job: &ScheduledJob,
    now: DateTime<Utc>,
) -> Result<bool, SchedulerError> {
    let Some(due_at) = job.next_run_at else {
        // Active job without a due time cannot make progress; retire it.
        warn!(job = %job.id, "Active job has no next run time, archiving");
        store.set_job_status(&job.id, JobStatus::Active, JobStatus::Archived)?;
        return Ok(false);
    };

    let created = store.create_run(&job.id, due_at)?;
    if let Some(run) = &created {
        info!(job = %job.id, run = %run.id, scheduled_for = %due_at, "Dispatched run");
    } else {
        debug!(job = %job.id, scheduled_for = %due_at, "Run already exists for occurrence");
    }

    // Advance the schedule from the occurrence just dispatched, never from
    // `now`: a job that was down for several due times catches up one
    // occurrence per cycle.
    match compute_next_run(&job.rule, due_at, &settings.calendar()) {
        Ok(Some(next)) => {
            store.update_job_schedule(&job.id, Some(now), Some(next))?;
        }
        Ok(None) => {
            info!(job = %job.id, "Recurrence exhausted, archiving job");
            store.update_job_schedule(&job.id, Some(now), None)?;
            store.set_job_status(&job.id, JobStatus::Active, JobStatus::Archived)?;
        }
        Err(e) => {
            // Rules are validated at creation; a failure here means the
            // stored rule is corrupt. Archive instead of redispatching it
            // every cycle.
            warn!(job = %job.id, error = %e, "Stored rule is invalid, archiving job");
            store.update_job_schedule(&job.id, Some(now), None)?;
            store.set_job_status(&job.id, JobStatus::Active, JobStatus::Archived)?;
        }
    }

    Ok(created.is_some())
}
