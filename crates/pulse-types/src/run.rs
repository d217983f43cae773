//! Job run records.
//!
//! A `JobRun` is one concrete execution attempt of a scheduled job at a
//! specific due time. The dispatcher creates it, the executor and retry
//! coordinator own its mutations, and it becomes immutable once terminal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Execution state of a run.
///
/// `Scheduled -> InProgress -> {Completed, Failed}`. A `Failed` run with
/// retry budget left transitions back to `InProgress`; it is terminal only
/// once the budget is exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Scheduled,
    InProgress,
    Completed,
    Failed,
}

/// One append-only entry in a run's execution log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub at: DateTime<Utc>,
    pub message: String,
}

impl LogEntry {
    pub fn now(message: impl Into<String>) -> Self {
        Self {
            at: Utc::now(),
            message: message.into(),
        }
    }
}

/// One execution attempt of a scheduled job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRun {
    pub id: String,
    pub job_id: String,
    pub status: RunStatus,

    /// The due time this run covers; stable across retries.
    pub scheduled_for: DateTime<Utc>,

    /// When execution first started.
    pub executed_at: Option<DateTime<Utc>>,

    /// Size of the resolved recipient set.
    pub target_count: u64,

    /// Recipients attempted so far (monotonically non-decreasing).
    pub processed_count: u64,

    pub success_count: u64,
    pub error_count: u64,

    /// Run-level retry attempts consumed.
    pub retry_count: u32,

    /// Total units (e.g., tokens) handed out by this run.
    pub total_units_distributed: u64,

    /// Message from the most recent run-level failure.
    pub error_message: Option<String>,

    /// Structured, append-only execution log.
    pub execution_log: Vec<LogEntry>,
}

impl JobRun {
    /// Create a fresh run in `Scheduled` state for a job's due time.
    pub fn new(job_id: impl Into<String>, scheduled_for: DateTime<Utc>) -> Self {
        Self {
            id: Ulid::new().to_string(),
            job_id: job_id.into(),
            status: RunStatus::Scheduled,
            scheduled_for,
            executed_at: None,
            target_count: 0,
            processed_count: 0,
            success_count: 0,
            error_count: 0,
            retry_count: 0,
            total_units_distributed: 0,
            error_message: None,
            execution_log: Vec::new(),
        }
    }

    /// Whether the run can no longer transition, given the configured retry
    /// budget.
    pub fn is_terminal(&self, retry_attempts: u32) -> bool {
        match self.status {
            RunStatus::Completed => true,
            RunStatus::Failed => self.retry_count >= retry_attempts,
            RunStatus::Scheduled | RunStatus::InProgress => false,
        }
    }

    /// Append a log entry.
    pub fn log(&mut self, message: impl Into<String>) {
        self.execution_log.push(LogEntry::now(message));
    }
}
