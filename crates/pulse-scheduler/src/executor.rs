//! Run execution.
//!
//! The executor claims a run via compare-and-swap, resolves the recipient
//! set through the backend, and walks it in batches. Per-recipient
//! failures are absorbed into the run's counters and log; failures of the
//! run as a whole (resolution, backend outage, persistence) abort the walk
//! with progress persisted so a retry resumes instead of re-sending.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info, warn};

use pulse_store::JobStore;
use pulse_types::{DistributionSettings, JobRun, RunStatus};

use crate::backend::{BackendError, DistributionBackend};

/// Result of an execution attempt that ran to a decision.
#[derive(Debug)]
pub enum ExecOutcome {
    /// The run finished; per-recipient errors may be recorded in its
    /// counters, but every recipient was attempted.
    Completed(JobRun),

    /// The claim CAS lost; another worker owns this run (or an admin
    /// deleted it). Nothing was executed.
    SkippedClaim,
}

/// A run-level failure. The run stays `InProgress` with its progress
/// persisted; the retry coordinator decides what happens next.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct RunError {
    pub run_id: String,
    pub message: String,
}

impl RunError {
    fn new(run_id: &str, message: impl Into<String>) -> Self {
        Self {
            run_id: run_id.to_string(),
            message: message.into(),
        }
    }
}

/// Executes claimed runs against a `DistributionBackend`.
pub struct DistributionExecutor {
    store: Arc<dyn JobStore>,
    backend: Arc<dyn DistributionBackend>,
}

impl DistributionExecutor {
    pub fn new(store: Arc<dyn JobStore>, backend: Arc<dyn DistributionBackend>) -> Self {
        Self { store, backend }
    }

    /// Claim and execute one run.
    ///
    /// `claim_from` is `Scheduled` for a first attempt and `Failed` for a
    /// retry; the CAS makes the claim exclusive either way. A retry claim
    /// also consumes one attempt from the run's budget, so a stored
    /// `Failed` run only reads as terminal once its final retry has
    /// actually executed.
    pub async fn execute(
        &self,
        run_id: &str,
        settings: &DistributionSettings,
        claim_from: RunStatus,
    ) -> Result<ExecOutcome, RunError> {
        let claimed = if claim_from == RunStatus::Failed {
            self.store.claim_retry(run_id)
        } else {
            self.store
                .transition_run(run_id, claim_from, RunStatus::InProgress)
        }
        .map_err(|e| RunError::new(run_id, e.to_string()))?;
        if !claimed {
            debug!(run = %run_id, "Run claim lost, skipping");
            return Ok(ExecOutcome::SkippedClaim);
        }

        let mut run = self
            .store
            .get_run(run_id)
            .map_err(|e| RunError::new(run_id, e.to_string()))?
            .ok_or_else(|| RunError::new(run_id, "Run disappeared after claim"))?;

        let job = self
            .store
            .get_job(&run.job_id)
            .map_err(|e| RunError::new(run_id, e.to_string()))?
            .ok_or_else(|| RunError::new(run_id, format!("Job {} not found", run.job_id)))?;

        if run.executed_at.is_none() {
            run.executed_at = Some(Utc::now());
        }
        if run.processed_count > 0 {
            run.log(format!(
                "Resuming after {} of {} recipients",
                run.processed_count, run.target_count
            ));
        }

        let recipients = match self.backend.resolve_recipients(&job.payload).await {
            Ok(recipients) => recipients,
            Err(e) => {
                self.persist_progress(&mut run, format!("Target resolution failed: {e}"));
                return Err(RunError::new(run_id, e.to_string()));
            }
        };
        // A backend whose recipient set shrank below the persisted progress
        // would desync the counters from the skip index; escalate instead.
        if (recipients.len() as u64) < run.processed_count {
            let message = format!(
                "Recipient set shrank below persisted progress ({} < {})",
                recipients.len(),
                run.processed_count
            );
            self.persist_progress(&mut run, message.clone());
            return Err(RunError::new(run_id, message));
        }
        run.target_count = recipients.len() as u64;
        run.log(format!("Resolved {} recipients", recipients.len()));
        self.store
            .write_run(&run)
            .map_err(|e| RunError::new(run_id, e.to_string()))?;

        let batch_size = settings.distribution_batch_size.max(1);
        let mut since_checkpoint = 0usize;
        for recipient in recipients.iter().skip(run.processed_count as usize) {
            match self.backend.execute_unit(&job.payload, recipient).await {
                Ok(units) => {
                    run.success_count += 1;
                    run.total_units_distributed += units;
                }
                Err(BackendError::Unit(msg)) => {
                    run.error_count += 1;
                    run.log(format!("Recipient {} failed: {msg}", recipient.id));
                }
                Err(e) => {
                    self.persist_progress(&mut run, format!("Aborting run: {e}"));
                    return Err(RunError::new(run_id, e.to_string()));
                }
            }
            run.processed_count += 1;

            since_checkpoint += 1;
            if since_checkpoint >= batch_size {
                since_checkpoint = 0;
                run.log(format!(
                    "Processed {} of {} recipients",
                    run.processed_count, run.target_count
                ));
                self.store
                    .write_run(&run)
                    .map_err(|e| RunError::new(run_id, e.to_string()))?;
            }
        }

        run.status = RunStatus::Completed;
        run.error_message = None;
        run.log(format!(
            "Completed: {} succeeded, {} failed, {} units distributed",
            run.success_count, run.error_count, run.total_units_distributed
        ));
        self.store
            .write_run(&run)
            .map_err(|e| RunError::new(run_id, e.to_string()))?;

        info!(
            run = %run.id,
            job = %run.job_id,
            succeeded = run.success_count,
            failed = run.error_count,
            units = run.total_units_distributed,
            "Run completed"
        );
        Ok(ExecOutcome::Completed(run))
    }

    /// Best-effort persistence of progress before surfacing a run-level
    /// failure. A write failure here is logged only; the counters are
    /// still in memory on the retry coordinator's reload path.
    fn persist_progress(&self, run: &mut JobRun, message: String) {
        run.log(message);
        if let Err(e) = self.store.write_run(run) {
            warn!(run = %run.id, error = %e, "Failed to persist run progress");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use pulse_store::MemoryStore;
    use pulse_types::{
        JobPayload, RecipientFilter, RecurrencePattern, RecurrenceRule, ScheduledJob,
    };

    use crate::backend::Recipient;

    struct FakeBackend {
        recipients: Vec<Recipient>,
        fail_resolution: bool,
        unit_failures: HashSet<String>,
        infra_failure_at: Option<String>,
        executed: Mutex<Vec<String>>,
    }

    impl FakeBackend {
        fn with_recipients(n: usize) -> Self {
            let recipients = (0..n)
                .map(|i| Recipient {
                    id: format!("emp-{i}"),
                    display_name: format!("Employee {i}"),
                })
                .collect();
            Self {
                recipients,
                fail_resolution: false,
                unit_failures: HashSet::new(),
                infra_failure_at: None,
                executed: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl DistributionBackend for FakeBackend {
        async fn resolve_recipients(
            &self,
            _payload: &JobPayload,
        ) -> Result<Vec<Recipient>, BackendError> {
            if self.fail_resolution {
                return Err(BackendError::Resolution("directory offline".to_string()));
            }
            Ok(self.recipients.clone())
        }

        async fn execute_unit(
            &self,
            _payload: &JobPayload,
            recipient: &Recipient,
        ) -> Result<u64, BackendError> {
            if self.infra_failure_at.as_deref() == Some(recipient.id.as_str()) {
                return Err(BackendError::Infrastructure(
                    "token store unreachable".to_string(),
                ));
            }
            if self.unit_failures.contains(&recipient.id) {
                return Err(BackendError::Unit("account closed".to_string()));
            }
            self.executed.lock().unwrap().push(recipient.id.clone());
            Ok(5)
        }
    }

    fn seed_run(store: &Arc<dyn JobStore>) -> JobRun {
        let rule = RecurrenceRule {
            pattern: RecurrencePattern::Daily { interval: 1 },
            start_date: chrono::NaiveDate::from_ymd_opt(2025, 1, 6).unwrap(),
            send_time: chrono::NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            timezone: "UTC".to_string(),
            working_days_only: false,
            end_date: None,
        };
        let job = ScheduledJob::new(
            "kudos",
            rule,
            JobPayload::TokenDistribution {
                token_kind: "kudos".to_string(),
                amount: 5,
                filter: RecipientFilter::default(),
            },
        );
        store.put_job(&job).unwrap();
        store.create_run(&job.id, Utc::now()).unwrap().unwrap()
    }

    fn executor(backend: FakeBackend) -> (DistributionExecutor, Arc<dyn JobStore>, JobRun) {
        let store: Arc<dyn JobStore> = Arc::new(MemoryStore::new());
        let run = seed_run(&store);
        let executor = DistributionExecutor::new(store.clone(), Arc::new(backend));
        (executor, store, run)
    }

    #[tokio::test]
    async fn test_successful_run() {
        let (executor, store, run) = executor(FakeBackend::with_recipients(3));
        let settings = DistributionSettings::default();

        let outcome = executor
            .execute(&run.id, &settings, RunStatus::Scheduled)
            .await
            .unwrap();
        let ExecOutcome::Completed(done) = outcome else {
            panic!("expected completion");
        };
        assert_eq!(done.status, RunStatus::Completed);
        assert_eq!(done.target_count, 3);
        assert_eq!(done.processed_count, 3);
        assert_eq!(done.success_count, 3);
        assert_eq!(done.error_count, 0);
        assert_eq!(done.total_units_distributed, 15);
        assert!(done.executed_at.is_some());

        let stored = store.get_run(&run.id).unwrap().unwrap();
        assert_eq!(stored.status, RunStatus::Completed);
    }

    #[tokio::test]
    async fn test_unit_failures_absorbed() {
        let mut backend = FakeBackend::with_recipients(10);
        backend.unit_failures.insert("emp-2".to_string());
        backend.unit_failures.insert("emp-7".to_string());
        backend.unit_failures.insert("emp-8".to_string());
        let (executor, _store, run) = executor(backend);
        let settings = DistributionSettings::default();

        let outcome = executor
            .execute(&run.id, &settings, RunStatus::Scheduled)
            .await
            .unwrap();
        let ExecOutcome::Completed(done) = outcome else {
            panic!("expected completion");
        };
        // Partial success is still a completed run.
        assert_eq!(done.status, RunStatus::Completed);
        assert_eq!(done.processed_count, 10);
        assert_eq!(done.success_count, 7);
        assert_eq!(done.error_count, 3);
        assert_eq!(done.total_units_distributed, 35);
        assert!(done
            .execution_log
            .iter()
            .any(|e| e.message.contains("emp-2")));
    }

    #[tokio::test]
    async fn test_resolution_failure_escalates() {
        let mut backend = FakeBackend::with_recipients(3);
        backend.fail_resolution = true;
        let (executor, store, run) = executor(backend);
        let settings = DistributionSettings::default();

        let err = executor
            .execute(&run.id, &settings, RunStatus::Scheduled)
            .await
            .unwrap_err();
        assert!(err.message.contains("directory offline"));

        // Run is left InProgress for the retry coordinator.
        let stored = store.get_run(&run.id).unwrap().unwrap();
        assert_eq!(stored.status, RunStatus::InProgress);
        assert_eq!(stored.processed_count, 0);
    }

    #[tokio::test]
    async fn test_lost_claim_skips() {
        let (executor, store, run) = executor(FakeBackend::with_recipients(3));
        let settings = DistributionSettings::default();

        assert!(store
            .transition_run(&run.id, RunStatus::Scheduled, RunStatus::InProgress)
            .unwrap());

        let outcome = executor
            .execute(&run.id, &settings, RunStatus::Scheduled)
            .await
            .unwrap();
        assert!(matches!(outcome, ExecOutcome::SkippedClaim));
    }

    #[tokio::test]
    async fn test_infrastructure_failure_persists_progress() {
        let mut backend = FakeBackend::with_recipients(5);
        backend.infra_failure_at = Some("emp-3".to_string());
        let (executor, store, run) = executor(backend);
        let mut settings = DistributionSettings::default();
        settings.distribution_batch_size = 2;

        let err = executor
            .execute(&run.id, &settings, RunStatus::Scheduled)
            .await
            .unwrap_err();
        assert!(err.message.contains("token store unreachable"));

        let stored = store.get_run(&run.id).unwrap().unwrap();
        assert_eq!(stored.status, RunStatus::InProgress);
        assert_eq!(stored.processed_count, 3);
        assert_eq!(stored.success_count, 3);
    }

    #[tokio::test]
    async fn test_retry_resumes_from_progress() {
        let backend = FakeBackend::with_recipients(5);
        let store: Arc<dyn JobStore> = Arc::new(MemoryStore::new());
        let mut run = seed_run(&store);

        // A prior attempt delivered to the first three recipients.
        run.status = RunStatus::Failed;
        run.target_count = 5;
        run.processed_count = 3;
        run.success_count = 3;
        run.total_units_distributed = 15;
        run.retry_count = 1;
        store.write_run(&run).unwrap();

        let backend = Arc::new(backend);
        let executor = DistributionExecutor::new(store.clone(), backend.clone());
        let settings = DistributionSettings::default();

        let outcome = executor
            .execute(&run.id, &settings, RunStatus::Failed)
            .await
            .unwrap();
        let ExecOutcome::Completed(done) = outcome else {
            panic!("expected completion");
        };
        assert_eq!(done.processed_count, 5);
        assert_eq!(done.success_count, 5);
        assert_eq!(done.total_units_distributed, 25);
        // The retry claim consumed one more attempt.
        assert_eq!(done.retry_count, 2);

        // Only the tail was re-attempted.
        let executed = backend.executed.lock().unwrap().clone();
        assert_eq!(executed, vec!["emp-3", "emp-4"]);
    }

    #[tokio::test]
    async fn test_shrunken_recipient_set_escalates() {
        let backend = FakeBackend::with_recipients(2);
        let store: Arc<dyn JobStore> = Arc::new(MemoryStore::new());
        let mut run = seed_run(&store);

        // A prior attempt got further than the backend can account for now.
        run.status = RunStatus::Failed;
        run.target_count = 5;
        run.processed_count = 3;
        run.success_count = 3;
        store.write_run(&run).unwrap();

        let backend = Arc::new(backend);
        let executor = DistributionExecutor::new(store.clone(), backend.clone());
        let settings = DistributionSettings::default();

        let err = executor
            .execute(&run.id, &settings, RunStatus::Failed)
            .await
            .unwrap_err();
        assert!(err.message.contains("shrank"));

        // Nothing was sent and the counters are untouched.
        assert!(backend.executed.lock().unwrap().is_empty());
        let stored = store.get_run(&run.id).unwrap().unwrap();
        assert_eq!(stored.status, RunStatus::InProgress);
        assert_eq!(stored.processed_count, 3);
        assert_eq!(stored.success_count, 3);
    }
}
