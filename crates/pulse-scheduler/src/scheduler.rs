//! The scheduler service.
//!
//! Owns the poll loop: each cycle re-reads the settings singleton,
//! dispatches due jobs into runs, and admits pending runs for execution up
//! to the configured concurrency cap. Each admitted run is driven by its
//! own task that holds a `FlightGuard` through execution and any retry
//! delays, so the cap bounds in-flight work, not just started work.
//!
//! On startup the service recovers runs orphaned by a previous process:
//! `InProgress` runs are demoted to `Failed` (without consuming retry
//! budget) and non-terminal `Failed` runs are re-admitted. Their persisted
//! progress makes the re-execution resume instead of re-sending.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use pulse_store::{JobStore, RunQuery};
use pulse_types::{DistributionSettings, RunStatus};

use crate::admission::{FlightGuard, InFlight};
use crate::backend::{DistributionBackend, NotificationSink};
use crate::config::SchedulerConfig;
use crate::dispatch::dispatch_due_jobs;
use crate::error::SchedulerError;
use crate::executor::{DistributionExecutor, ExecOutcome};
use crate::retry::{RetryCoordinator, RetryDecision};

/// Counters for one poll cycle.
#[derive(Debug, Default, Clone, Copy)]
pub struct PollStats {
    /// Runs created by the dispatcher this cycle.
    pub runs_dispatched: usize,
    /// Runs admitted for execution this cycle.
    pub runs_admitted: usize,
}

struct Inner {
    store: Arc<dyn JobStore>,
    executor: DistributionExecutor,
    retry: RetryCoordinator,
    config: SchedulerConfig,
    in_flight: InFlight,
    shutdown: CancellationToken,
}

/// Background service that turns job definitions into executed runs.
pub struct SchedulerService {
    inner: Arc<Inner>,
    is_running: AtomicBool,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl SchedulerService {
    pub fn new(
        store: Arc<dyn JobStore>,
        backend: Arc<dyn DistributionBackend>,
        sink: Arc<dyn NotificationSink>,
        config: SchedulerConfig,
    ) -> Self {
        let inner = Inner {
            executor: DistributionExecutor::new(store.clone(), backend),
            retry: RetryCoordinator::new(store.clone(), sink),
            store,
            config,
            in_flight: InFlight::new(),
            shutdown: CancellationToken::new(),
        };
        Self {
            inner: Arc::new(inner),
            is_running: AtomicBool::new(false),
            handle: Mutex::new(None),
        }
    }

    /// Start the poll loop. Fails when already running.
    pub fn start(&self) -> Result<(), SchedulerError> {
        if self
            .is_running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(SchedulerError::AlreadyRunning);
        }

        let inner = self.inner.clone();
        let handle = tokio::spawn(async move {
            info!(
                poll_interval_secs = inner.config.poll_interval_secs,
                "Scheduler started"
            );
            if let Err(e) = inner.recover_orphaned_runs() {
                error!(error = %e, "Startup recovery failed");
            }

            let mut ticker =
                tokio::time::interval(Duration::from_secs(inner.config.poll_interval_secs));
            loop {
                tokio::select! {
                    _ = inner.shutdown.cancelled() => {
                        info!("Scheduler stopping");
                        break;
                    }
                    _ = ticker.tick() => {
                        match inner.poll_once() {
                            Ok(stats) => {
                                if stats.runs_dispatched > 0 || stats.runs_admitted > 0 {
                                    debug!(
                                        dispatched = stats.runs_dispatched,
                                        admitted = stats.runs_admitted,
                                        "Poll cycle complete"
                                    );
                                }
                            }
                            Err(e) => error!(error = %e, "Poll cycle failed"),
                        }
                    }
                }
            }
        });

        *self.handle.lock().unwrap() = Some(handle);
        Ok(())
    }

    /// Signal shutdown and wait for the poll loop to exit.
    ///
    /// In-flight runs keep executing on the runtime; only the loop and any
    /// retry delays are interrupted.
    pub async fn stop(&self) -> Result<(), SchedulerError> {
        if self
            .is_running
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(SchedulerError::NotRunning);
        }

        self.inner.shutdown.cancel();
        let handle = self.handle.lock().unwrap().take();
        if let Some(handle) = handle {
            let grace = Duration::from_secs(self.inner.config.shutdown_timeout_secs);
            if tokio::time::timeout(grace, handle).await.is_err() {
                warn!("Poll loop did not stop within the shutdown timeout");
            }
        }
        info!("Scheduler stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    /// Number of runs currently executing or waiting out a retry delay.
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.current()
    }

    /// Run one dispatch-and-admit cycle immediately.
    pub fn poll_once(&self) -> Result<PollStats, SchedulerError> {
        self.inner.poll_once()
    }
}

impl Inner {
    fn poll_once(self: &Arc<Self>) -> Result<PollStats, SchedulerError> {
        let settings = self.store.load_settings()?;
        if !settings.service_enabled {
            debug!("Distribution service disabled, skipping cycle");
            return Ok(PollStats::default());
        }

        let runs_dispatched = dispatch_due_jobs(&self.store, &settings, Utc::now())?;
        let runs_admitted = self.admit_pending(&settings)?;

        Ok(PollStats {
            runs_dispatched,
            runs_admitted,
        })
    }

    /// Hand pending runs to driver tasks, oldest due time first, until the
    /// concurrency cap is reached.
    fn admit_pending(self: &Arc<Self>, settings: &DistributionSettings) -> Result<usize, SchedulerError> {
        let cap = settings.max_concurrent_distributions;
        let mut admitted = 0;
        for run in self.store.pending_runs(cap)? {
            let Some(guard) = self.in_flight.try_acquire(cap) else {
                debug!(cap, "Concurrency cap reached, deferring remaining runs");
                break;
            };
            self.spawn_driver(run.id, RunStatus::Scheduled, settings.clone(), guard);
            admitted += 1;
        }
        Ok(admitted)
    }

    /// Re-admit runs a previous process left behind.
    fn recover_orphaned_runs(self: &Arc<Self>) -> Result<(), SchedulerError> {
        let settings = self.store.load_settings()?;
        let cap = settings.max_concurrent_distributions;

        let interrupted = self.store.list_runs(&RunQuery {
            status: Some(RunStatus::InProgress),
            ..Default::default()
        })?;
        for run in &interrupted {
            // Demote so the run becomes claimable again; budget is only
            // consumed when the retry claim happens.
            self.store
                .transition_run(&run.id, RunStatus::InProgress, RunStatus::Failed)?;
            warn!(run = %run.id, "Recovered run interrupted by restart");
        }

        let failed = self.store.list_runs(&RunQuery {
            status: Some(RunStatus::Failed),
            ..Default::default()
        })?;
        for run in failed {
            if run.is_terminal(settings.retry_attempts) {
                continue;
            }
            let Some(guard) = self.in_flight.try_acquire(cap) else {
                break;
            };
            self.spawn_driver(run.id, RunStatus::Failed, settings.clone(), guard);
        }
        Ok(())
    }

    /// Drive one run to a terminal state, retrying in place.
    ///
    /// The guard is held across the whole loop, including retry sleeps, so
    /// a flapping run cannot free its slot between attempts.
    fn spawn_driver(
        self: &Arc<Self>,
        run_id: String,
        claim_from: RunStatus,
        settings: DistributionSettings,
        guard: FlightGuard,
    ) {
        let inner = self.clone();
        tokio::spawn(async move {
            let _guard = guard;
            let timeout = Duration::from_secs(inner.config.run_timeout_secs);
            let mut claim_from = claim_from;

            loop {
                let attempt =
                    tokio::time::timeout(timeout, inner.executor.execute(&run_id, &settings, claim_from))
                        .await;
                let failure = match attempt {
                    Ok(Ok(ExecOutcome::Completed(_))) => break,
                    Ok(Ok(ExecOutcome::SkippedClaim)) => break,
                    Ok(Err(run_error)) => run_error.message,
                    Err(_) => format!(
                        "Run exceeded the {}s execution timeout",
                        inner.config.run_timeout_secs
                    ),
                };

                match inner.retry.handle_failure(&run_id, &failure, &settings).await {
                    Ok(RetryDecision::RetryAfter(delay)) => {
                        claim_from = RunStatus::Failed;
                        tokio::select! {
                            _ = inner.shutdown.cancelled() => {
                                // Recovered as a non-terminal Failed run on
                                // the next start.
                                debug!(run = %run_id, "Retry abandoned for shutdown");
                                break;
                            }
                            _ = tokio::time::sleep(delay) => {}
                        }
                    }
                    Ok(RetryDecision::Exhausted) => break,
                    Err(e) => {
                        error!(run = %run_id, error = %e, "Failed to record run failure");
                        break;
                    }
                }
            }
        });
    }
}
