//! Scheduler configuration.
//!
//! Process-level knobs for the poll loop; the persisted
//! `DistributionSettings` singleton carries the operational knobs
//! (concurrency cap, batch size, retry budget) and is re-read each cycle.

use serde::{Deserialize, Serialize};

/// Configuration for the scheduler service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Poll cadence in seconds. This is the dispatch granularity, not the
    /// rules' send-time granularity.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Per-run execution timeout in seconds. A run exceeding it is forced
    /// into the retry path so it cannot hold a concurrency slot forever.
    #[serde(default = "default_run_timeout")]
    pub run_timeout_secs: u64,

    /// Timeout in seconds for graceful shutdown.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

fn default_poll_interval() -> u64 {
    60
}

fn default_run_timeout() -> u64 {
    600
}

fn default_shutdown_timeout() -> u64 {
    30
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            run_timeout_secs: default_run_timeout(),
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}
