//! RocksDB-backed `JobStore` adapter.
//!
//! Jobs are stored under their id, runs under time-prefixed keys (see
//! `keys`), and all values are JSON. Conditional operations take a single
//! writer mutex so the check and the write land atomically; reads go
//! straight to the database.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rocksdb::{IteratorMode, Options, WriteBatch, DB};
use tracing::{debug, info};

use pulse_types::{DistributionSettings, JobRun, JobStatus, RunStatus, ScheduledJob};

use crate::column_families::{build_cf_descriptors, CF_JOBS, CF_RUNS, CF_RUN_INDEX, CF_SETTINGS};
use crate::error::StoreError;
use crate::keys::{occurrence_key, run_id_key, RunKey};
use crate::store::{JobQuery, JobStore, RunQuery};

const SETTINGS_KEY: &[u8] = b"settings";

/// RocksDB-backed job store.
pub struct RocksStore {
    db: DB,
    /// Serializes conditional read-modify-write operations.
    write_lock: Mutex<()>,
}

impl RocksStore {
    /// Open the store at the given path, creating it if necessary.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        info!("Opening job store at {:?}", path);

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        let db = DB::open_cf_descriptors(&db_opts, path, build_cf_descriptors())?;
        Ok(Self {
            db,
            write_lock: Mutex::new(()),
        })
    }

    fn cf(&self, name: &str) -> Result<&rocksdb::ColumnFamily, StoreError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::ColumnFamilyNotFound(name.to_string()))
    }

    /// Look up a run record by id via the id index.
    fn fetch_run(&self, run_id: &str) -> Result<Option<(RunKey, JobRun)>, StoreError> {
        let index_cf = self.cf(CF_RUN_INDEX)?;
        let Some(key_bytes) = self.db.get_cf(&index_cf, run_id_key(run_id))? else {
            return Ok(None);
        };
        let key = RunKey::from_bytes(&key_bytes)?;

        let runs_cf = self.cf(CF_RUNS)?;
        let Some(value) = self.db.get_cf(&runs_cf, key.to_bytes())? else {
            return Err(StoreError::Key(format!(
                "dangling run index for {}",
                run_id
            )));
        };
        let run: JobRun = serde_json::from_slice(&value)?;
        Ok(Some((key, run)))
    }

    fn put_run_record(&self, key: &RunKey, run: &JobRun) -> Result<(), StoreError> {
        let runs_cf = self.cf(CF_RUNS)?;
        self.db
            .put_cf(&runs_cf, key.to_bytes(), serde_json::to_vec(run)?)?;
        Ok(())
    }

    /// Iterate runs in ascending due-time order, applying `filter` until
    /// `limit` matches are collected.
    fn scan_runs(
        &self,
        filter: impl Fn(&JobRun) -> bool,
        limit: Option<usize>,
    ) -> Result<Vec<JobRun>, StoreError> {
        let runs_cf = self.cf(CF_RUNS)?;
        let mut out = Vec::new();
        for item in self.db.iterator_cf(&runs_cf, IteratorMode::Start) {
            let (_, value) = item?;
            let run: JobRun = serde_json::from_slice(&value)?;
            if filter(&run) {
                out.push(run);
                if limit.is_some_and(|l| out.len() >= l) {
                    break;
                }
            }
        }
        Ok(out)
    }
}

impl JobStore for RocksStore {
    fn put_job(&self, job: &ScheduledJob) -> Result<(), StoreError> {
        let jobs_cf = self.cf(CF_JOBS)?;
        self.db
            .put_cf(&jobs_cf, job.id.as_bytes(), serde_json::to_vec(job)?)?;
        Ok(())
    }

    fn get_job(&self, job_id: &str) -> Result<Option<ScheduledJob>, StoreError> {
        let jobs_cf = self.cf(CF_JOBS)?;
        match self.db.get_cf(&jobs_cf, job_id.as_bytes())? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    fn list_jobs(&self, query: &JobQuery) -> Result<Vec<ScheduledJob>, StoreError> {
        let jobs_cf = self.cf(CF_JOBS)?;
        let mut jobs = Vec::new();
        for item in self.db.iterator_cf(&jobs_cf, IteratorMode::Start) {
            let (_, value) = item?;
            let job: ScheduledJob = serde_json::from_slice(&value)?;
            if query.status.map_or(true, |s| job.status == s) {
                jobs.push(job);
            }
        }
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(jobs)
    }

    fn due_jobs(&self, now: DateTime<Utc>) -> Result<Vec<ScheduledJob>, StoreError> {
        let mut due: Vec<ScheduledJob> = self
            .list_jobs(&JobQuery {
                status: Some(JobStatus::Active),
            })?
            .into_iter()
            .filter(|j| j.next_run_at.is_some_and(|at| at <= now))
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
        let _guard = self.write_lock.lock().unwrap();
        let mut job = self
            .get_job(job_id)?
            .ok_or_else(|| StoreError::NotFound(format!("job {}", job_id)))?;
        if job.status != from {
            return Ok(false);
        }
        job.status = to;
        self.put_job(&job)?;
        Ok(true)
    }

    fn update_job_schedule(
        &self,
        job_id: &str,
        last_run_at: Option<DateTime<Utc>>,
        next_run_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().unwrap();
        let mut job = self
            .get_job(job_id)?
            .ok_or_else(|| StoreError::NotFound(format!("job {}", job_id)))?;
        job.last_run_at = last_run_at;
        job.next_run_at = next_run_at;
        self.put_job(&job)
    }

    fn create_run(
        &self,
        job_id: &str,
        scheduled_for: DateTime<Utc>,
    ) -> Result<Option<JobRun>, StoreError> {
        let _guard = self.write_lock.lock().unwrap();

        let index_cf = self.cf(CF_RUN_INDEX)?;
        let occ_key = occurrence_key(job_id, scheduled_for.timestamp_millis());
        if self.db.get_cf(&index_cf, &occ_key)?.is_some() {
            debug!(job = %job_id, %scheduled_for, "Occurrence already dispatched, skipping");
            return Ok(None);
        }

        let run = JobRun::new(job_id, scheduled_for);
        let run_key = RunKey::new(scheduled_for.timestamp_millis(), &run.id)?;

        // Atomic write: run record + both index entries.
        let runs_cf = self.cf(CF_RUNS)?;
        let mut batch = WriteBatch::default();
        batch.put_cf(&runs_cf, run_key.to_bytes(), serde_json::to_vec(&run)?);
        batch.put_cf(&index_cf, run_id_key(&run.id), run_key.to_bytes());
        batch.put_cf(&index_cf, &occ_key, run.id.as_bytes());
        self.db.write(batch)?;

        debug!(job = %job_id, run = %run.id, %scheduled_for, "Created run");
        Ok(Some(run))
    }

    fn transition_run(
        &self,
        run_id: &str,
        from: RunStatus,
        to: RunStatus,
    ) -> Result<bool, StoreError> {
        let _guard = self.write_lock.lock().unwrap();
        let Some((key, mut run)) = self.fetch_run(run_id)? else {
            return Err(StoreError::NotFound(format!("run {}", run_id)));
        };
        if run.status != from {
            return Ok(false);
        }
        run.status = to;
        self.put_run_record(&key, &run)?;
        Ok(true)
    }

    fn claim_retry(&self, run_id: &str) -> Result<bool, StoreError> {
        let _guard = self.write_lock.lock().unwrap();
        let Some((key, mut run)) = self.fetch_run(run_id)? else {
            return Err(StoreError::NotFound(format!("run {}", run_id)));
        };
        if run.status != RunStatus::Failed {
            return Ok(false);
        }
        run.status = RunStatus::InProgress;
        run.retry_count += 1;
        self.put_run_record(&key, &run)?;
        Ok(true)
    }

    fn write_run(&self, run: &JobRun) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().unwrap();
        let Some((key, stored)) = self.fetch_run(&run.id)? else {
            return Err(StoreError::NotFound(format!("run {}", run.id)));
        };
        if stored.status == RunStatus::Completed {
            return Err(StoreError::Conflict(format!(
                "run {} is completed and immutable",
                run.id
            )));
        }
        self.put_run_record(&key, run)
    }

    fn get_run(&self, run_id: &str) -> Result<Option<JobRun>, StoreError> {
        Ok(self.fetch_run(run_id)?.map(|(_, run)| run))
    }

    fn list_runs(&self, query: &RunQuery) -> Result<Vec<JobRun>, StoreError> {
        self.scan_runs(|run| query.matches(run), query.limit)
    }

    fn pending_runs(&self, limit: usize) -> Result<Vec<JobRun>, StoreError> {
        self.scan_runs(|run| run.status == RunStatus::Scheduled, Some(limit))
    }

    fn delete_run_if_scheduled(&self, run_id: &str) -> Result<bool, StoreError> {
        let _guard = self.write_lock.lock().unwrap();
        let Some((key, run)) = self.fetch_run(run_id)? else {
            return Ok(false);
        };
        if run.status != RunStatus::Scheduled {
            return Ok(false);
        }

        let runs_cf = self.cf(CF_RUNS)?;
        let index_cf = self.cf(CF_RUN_INDEX)?;
        let mut batch = WriteBatch::default();
        batch.delete_cf(&runs_cf, key.to_bytes());
        batch.delete_cf(&index_cf, run_id_key(run_id));
        batch.delete_cf(
            &index_cf,
            occurrence_key(&run.job_id, run.scheduled_for.timestamp_millis()),
        );
        self.db.write(batch)?;
        Ok(true)
    }

    fn load_settings(&self) -> Result<DistributionSettings, StoreError> {
        let settings_cf = self.cf(CF_SETTINGS)?;
        match self.db.get_cf(&settings_cf, SETTINGS_KEY)? {
            Some(value) => Ok(serde_json::from_slice(&value)?),
            None => Ok(DistributionSettings::default()),
        }
    }

    fn save_settings(&self, settings: &DistributionSettings) -> Result<(), StoreError> {
        let settings_cf = self.cf(CF_SETTINGS)?;
        self.db
            .put_cf(&settings_cf, SETTINGS_KEY, serde_json::to_vec(settings)?)?;
        Ok(())
    }
}
