//! Collaborator traits consumed by the scheduler core.
//!
//! The portal owns recipient resolution, token issuance, notification
//! rendering and delivery. The core only needs "resolve the recipient set"
//! and "execute one unit" from the backend, and "tell an operator" from
//! the sink.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use pulse_types::JobPayload;

/// One resolved recipient of a distribution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipient {
    pub id: String,
    pub display_name: String,
}

/// Errors surfaced by a `DistributionBackend`.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The recipient set could not be resolved; run-level and retryable.
    #[error("Target resolution failed: {0}")]
    Resolution(String),

    /// A single recipient's operation failed; recorded, never aborts the
    /// run.
    #[error("Recipient operation failed: {0}")]
    Unit(String),

    /// The batch operation itself cannot proceed (token store down,
    /// directory unreachable); escalates to a run-level failure.
    #[error("Backend unavailable: {0}")]
    Infrastructure(String),
}

/// Payload-specific operations the portal provides.
#[async_trait]
pub trait DistributionBackend: Send + Sync {
    /// Resolve the payload's filter into a concrete recipient set. The
    /// returned order defines batch partitioning, so it must be stable for
    /// a resumed run.
    async fn resolve_recipients(&self, payload: &JobPayload)
        -> Result<Vec<Recipient>, BackendError>;

    /// Apply the payload's unit operation to one recipient. Returns the
    /// units distributed (token amount, or 0 for a notification).
    async fn execute_unit(
        &self,
        payload: &JobPayload,
        recipient: &Recipient,
    ) -> Result<u64, BackendError>;
}

/// Human-facing notice emitted when a run fails terminally.
#[derive(Debug, Clone)]
pub struct FailureNotice {
    pub job_id: String,
    pub job_name: String,
    pub run_id: String,
    pub scheduled_for: DateTime<Utc>,
    pub error_message: String,
    pub retry_count: u32,
    /// Configured operator address, when set.
    pub email: Option<String>,
}

/// Failure delivering a notice. Logged by the core; never changes the
/// run's own terminal status.
#[derive(Debug, Error)]
#[error("Notification dispatch failed: {0}")]
pub struct SinkError(pub String);

/// Delivery channel for failure notices.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify_failure(&self, notice: &FailureNotice) -> Result<(), SinkError>;
}

/// Sink that only writes the notice to the log. Useful as a default until
/// a real channel is wired in.
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn notify_failure(&self, notice: &FailureNotice) -> Result<(), SinkError> {
        tracing::error!(
            job = %notice.job_name,
            run = %notice.run_id,
            scheduled_for = %notice.scheduled_for,
            retries = notice.retry_count,
            email = notice.email.as_deref().unwrap_or("<unset>"),
            "Distribution run failed terminally: {}",
            notice.error_message
        );
        Ok(())
    }
}
