//! In-memory `JobStore` adapter.
//!
//! Backs tests and embedded use. All conditional operations happen under
//! one write lock, which gives the same atomicity the RocksDB adapter
//! provides with its writer mutex.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use pulse_types::{DistributionSettings, JobRun, JobStatus, RunStatus, ScheduledJob};

use crate::error::StoreError;
use crate::store::{JobQuery, JobStore, RunQuery};

#[derive(Default)]
struct Inner {
    jobs: HashMap<String, ScheduledJob>,
    runs: HashMap<String, JobRun>,
    /// Unique index over (job_id, scheduled_for millis).
    occurrences: HashSet<(String, i64)>,
    settings: Option<DistributionSettings>,
}

/// Thread-safe in-memory store.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl JobStore for MemoryStore {
    fn put_job(&self, job: &ScheduledJob) -> Result<(), StoreError> {
        let mut inner = self.inner.write().unwrap();
        inner.jobs.insert(job.id.clone(), job.clone());
        Ok(())
    }

    fn get_job(&self, job_id: &str) -> Result<Option<ScheduledJob>, StoreError> {
        Ok(self.inner.read().unwrap().jobs.get(job_id).cloned())
    }

    fn list_jobs(&self, query: &JobQuery) -> Result<Vec<ScheduledJob>, StoreError> {
        let inner = self.inner.read().unwrap();
        let mut jobs: Vec<ScheduledJob> = inner
            .jobs
            .values()
            .filter(|j| query.status.map_or(true, |s| j.status == s))
            .cloned()
            .collect();
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(jobs)
    }

    fn due_jobs(&self, now: DateTime<Utc>) -> Result<Vec<ScheduledJob>, StoreError> {
        let inner = self.inner.read().unwrap();
        let mut due: Vec<ScheduledJob> = inner
            .jobs
            .values()
            .filter(|j| j.status == JobStatus::Active)
            .filter(|j| j.next_run_at.is_some_and(|at| at <= now))
            .cloned()
            .collect();
        due.sort_by_key(|j| j.next_run_at);
        Ok(due)
    }

    fn set_job_status(
        &self,
        job_id: &str,
        from: JobStatus,
        to: JobStatus,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().unwrap();
        match inner.jobs.get_mut(job_id) {
            Some(job) if job.status == from => {
                job.status = to;
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(StoreError::NotFound(format!("job {}", job_id))),
        }
    }

    fn update_job_schedule(
        &self,
        job_id: &str,
        last_run_at: Option<DateTime<Utc>>,
        next_run_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().unwrap();
        let job = inner
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| StoreError::NotFound(format!("job {}", job_id)))?;
        job.last_run_at = last_run_at;
        job.next_run_at = next_run_at;
        Ok(())
    }

    fn create_run(
        &self,
        job_id: &str,
        scheduled_for: DateTime<Utc>,
    ) -> Result<Option<JobRun>, StoreError> {
        let mut inner = self.inner.write().unwrap();
        let key = (job_id.to_string(), scheduled_for.timestamp_millis());
        if inner.occurrences.contains(&key) {
            return Ok(None);
        }
        let run = JobRun::new(job_id, scheduled_for);
        inner.occurrences.insert(key);
        inner.runs.insert(run.id.clone(), run.clone());
        Ok(Some(run))
    }

    fn transition_run(
        &self,
        run_id: &str,
        from: RunStatus,
        to: RunStatus,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().unwrap();
        match inner.runs.get_mut(run_id) {
            Some(run) if run.status == from => {
                run.status = to;
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(StoreError::NotFound(format!("run {}", run_id))),
        }
    }

    fn claim_retry(&self, run_id: &str) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().unwrap();
        match inner.runs.get_mut(run_id) {
            Some(run) if run.status == RunStatus::Failed => {
                run.status = RunStatus::InProgress;
                run.retry_count += 1;
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(StoreError::NotFound(format!("run {}", run_id))),
        }
    }

    fn write_run(&self, run: &JobRun) -> Result<(), StoreError> {
        let mut inner = self.inner.write().unwrap();
        if let Some(stored) = inner.runs.get(&run.id) {
            if stored.status == RunStatus::Completed {
                return Err(StoreError::Conflict(format!(
                    "run {} is completed and immutable",
                    run.id
                )));
            }
        }
        inner.runs.insert(run.id.clone(), run.clone());
        Ok(())
    }

    fn get_run(&self, run_id: &str) -> Result<Option<JobRun>, StoreError> {
        Ok(self.inner.read().unwrap().runs.get(run_id).cloned())
    }

    fn list_runs(&self, query: &RunQuery) -> Result<Vec<JobRun>, StoreError> {
        let inner = self.inner.read().unwrap();
        let mut runs: Vec<JobRun> = inner
            .runs
            .values()
            .filter(|r| query.matches(r))
            .cloned()
            .collect();
        runs.sort_by(|a, b| a.scheduled_for.cmp(&b.scheduled_for).then(a.id.cmp(&b.id)));
        if let Some(limit) = query.limit {
            runs.truncate(limit);
        }
        Ok(runs)
    }

    fn pending_runs(&self, limit: usize) -> Result<Vec<JobRun>, StoreError> {
        self.list_runs(&RunQuery {
            status: Some(RunStatus::Scheduled),
            limit: Some(limit),
            ..Default::default()
        })
    }

    fn delete_run_if_scheduled(&self, run_id: &str) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().unwrap();
        let Some(run) = inner.runs.get(run_id) else {
            return Ok(false);
        };
        if run.status != RunStatus::Scheduled {
            return Ok(false);
        }
        let key = (run.job_id.clone(), run.scheduled_for.timestamp_millis());
        inner.occurrences.remove(&key);
        inner.runs.remove(run_id);
        Ok(true)
    }

    fn load_settings(&self) -> Result<DistributionSettings, StoreError> {
        Ok(self
            .inner
            .read()
            .unwrap()
            .settings
            .clone()
            .unwrap_or_default())
    }

    fn save_settings(&self, settings: &DistributionSettings) -> Result<(), StoreError> {
        self.inner.write().unwrap().settings = Some(settings.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pulse_types::{JobPayload, RecipientFilter, RecurrencePattern, RecurrenceRule};

    fn sample_job() -> ScheduledJob {
        let rule = RecurrenceRule {
            pattern: RecurrencePattern::Daily { interval: 1 },
            start_date: chrono::NaiveDate::from_ymd_opt(2025, 1, 6).unwrap(),
            send_time: chrono::NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            timezone: "UTC".to_string(),
            working_days_only: false,
            end_date: None,
        };
        ScheduledJob::new(
            "daily-kudos",
            rule,
            JobPayload::TokenDistribution {
                token_kind: "kudos".to_string(),
                amount: 10,
                filter: RecipientFilter::default(),
            },
        )
    }

    fn at(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 6, h, 0, 0).unwrap()
    }

    #[test]
    fn test_create_run_is_idempotent() {
        let store = MemoryStore::new();
        let job = sample_job();
        store.put_job(&job).unwrap();

        let first = store.create_run(&job.id, at(9)).unwrap();
        assert!(first.is_some());

        // Same (job, due time): no duplicate.
        let second = store.create_run(&job.id, at(9)).unwrap();
        assert!(second.is_none());

        // Different due time is a new occurrence.
        let third = store.create_run(&job.id, at(10)).unwrap();
        assert!(third.is_some());
    }

    #[test]
    fn test_transition_run_cas() {
        let store = MemoryStore::new();
        let run = store.create_run("job-1", at(9)).unwrap().unwrap();

        assert!(store
            .transition_run(&run.id, RunStatus::Scheduled, RunStatus::InProgress)
            .unwrap());
        // Second claim loses.
        assert!(!store
            .transition_run(&run.id, RunStatus::Scheduled, RunStatus::InProgress)
            .unwrap());
    }

    #[test]
    fn test_claim_retry_consumes_attempt() {
        let store = MemoryStore::new();
        let run = store.create_run("job-1", at(9)).unwrap().unwrap();

        // Only Failed runs are claimable for retry.
        assert!(!store.claim_retry(&run.id).unwrap());

        store
            .transition_run(&run.id, RunStatus::Scheduled, RunStatus::Failed)
            .unwrap();
        assert!(store.claim_retry(&run.id).unwrap());

        let claimed = store.get_run(&run.id).unwrap().unwrap();
        assert_eq!(claimed.status, RunStatus::InProgress);
        assert_eq!(claimed.retry_count, 1);

        // Second claim loses.
        assert!(!store.claim_retry(&run.id).unwrap());

        assert!(matches!(
            store.claim_retry("nope"),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_completed_run_is_immutable() {
        let store = MemoryStore::new();
        let mut run = store.create_run("job-1", at(9)).unwrap().unwrap();
        run.status = RunStatus::Completed;
        store.write_run(&run).unwrap();

        run.success_count = 99;
        let err = store.write_run(&run);
        assert!(matches!(err, Err(StoreError::Conflict(_))));
    }

    #[test]
    fn test_due_jobs_filters_and_orders() {
        let store = MemoryStore::new();
        let mut early = sample_job();
        early.next_run_at = Some(at(8));
        let mut late = sample_job();
        late.next_run_at = Some(at(9));
        let mut paused = sample_job();
        paused.next_run_at = Some(at(8));
        paused.status = JobStatus::Paused;
        let mut future = sample_job();
        future.next_run_at = Some(at(23));

        for job in [&early, &late, &paused, &future] {
            store.put_job(job).unwrap();
        }

        let due = store.due_jobs(at(10)).unwrap();
        assert_eq!(due.len(), 2);
        assert_eq!(due[0].id, early.id);
        assert_eq!(due[1].id, late.id);
    }

    #[test]
    fn test_pending_runs_oldest_first() {
        let store = MemoryStore::new();
        store.create_run("job-1", at(12)).unwrap();
        store.create_run("job-2", at(9)).unwrap();
        store.create_run("job-3", at(10)).unwrap();

        let pending = store.pending_runs(2).unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].scheduled_for, at(9));
        assert_eq!(pending[1].scheduled_for, at(10));
    }

    #[test]
    fn test_delete_run_only_while_scheduled() {
        let store = MemoryStore::new();
        let run = store.create_run("job-1", at(9)).unwrap().unwrap();

        // Claimed runs cannot be deleted.
        store
            .transition_run(&run.id, RunStatus::Scheduled, RunStatus::InProgress)
            .unwrap();
        assert!(!store.delete_run_if_scheduled(&run.id).unwrap());

        let run2 = store.create_run("job-1", at(10)).unwrap().unwrap();
        assert!(store.delete_run_if_scheduled(&run2.id).unwrap());
        assert!(store.get_run(&run2.id).unwrap().is_none());
    }

    #[test]
    fn test_set_job_status_cas() {
        let store = MemoryStore::new();
        let job = sample_job();
        store.put_job(&job).unwrap();

        assert!(store
            .set_job_status(&job.id, JobStatus::Active, JobStatus::Paused)
            .unwrap());
        // Stale view: already paused.
        assert!(!store
            .set_job_status(&job.id, JobStatus::Active, JobStatus::Paused)
            .unwrap());

        let missing = store.set_job_status("nope", JobStatus::Active, JobStatus::Paused);
        assert!(matches!(missing, Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_settings_default_and_roundtrip() {
        let store = MemoryStore::new();
        let defaults = store.load_settings().unwrap();
        assert_eq!(defaults, DistributionSettings::default());

        let mut settings = defaults;
        settings.retry_attempts = 7;
        store.save_settings(&settings).unwrap();
        assert_eq!(store.load_settings().unwrap().retry_attempts, 7);
    }
}
