//! Error types for the scheduler crate.

use thiserror::Error;

use pulse_store::StoreError;
use pulse_types::{RuleError, SettingsError};

/// Errors that can occur during scheduler operations.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Store operation failed
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Recurrence rule is invalid
    #[error("Rule error: {0}")]
    Rule(#[from] RuleError),

    /// Rule yields no occurrence after the reference instant
    #[error("Rule produces no occurrences after {0}")]
    NoOccurrences(chrono::DateTime<chrono::Utc>),

    /// Settings rejected by validation
    #[error("Invalid settings: {0}")]
    InvalidSettings(#[from] SettingsError),

    /// Job not found in the store
    #[error("Job not found: {0}")]
    JobNotFound(String),

    /// Run not found in the store
    #[error("Run not found: {0}")]
    RunNotFound(String),

    /// Scheduler is already running
    #[error("Scheduler is already running")]
    AlreadyRunning,

    /// Scheduler is not running
    #[error("Scheduler is not running")]
    NotRunning,
}
