//! Scheduler core for the Pulse distribution service.
//!
//! Drives recurring token distributions and notifications from a shared
//! recurrence model:
//!
//! - The `SchedulerService` polls the job store on a fixed cadence,
//!   creates runs for due jobs (idempotently per due time) and advances
//!   each job's next due time before execution starts.
//! - Admitted runs execute under a global in-flight cap; the
//!   `DistributionExecutor` resolves recipients, processes them in batches
//!   and persists progress after every batch.
//! - Run-level failures go through the `RetryCoordinator`: fixed-delay,
//!   bounded retries on the same run row, with a single operator
//!   notification once the budget is exhausted.
//!
//! Recipient resolution, per-unit execution and failure notices are
//! collaborator traits (`DistributionBackend`, `NotificationSink`) owned
//! by the surrounding portal.

pub mod admin;
pub mod admission;
pub mod backend;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod executor;
pub mod retry;
pub mod scheduler;

pub use admin::AdminApi;
pub use admission::{FlightGuard, InFlight};
pub use backend::{
    BackendError, DistributionBackend, FailureNotice, LogSink, NotificationSink, Recipient,
    SinkError,
};
pub use config::SchedulerConfig;
pub use error::SchedulerError;
pub use executor::{DistributionExecutor, ExecOutcome, RunError};
pub use retry::{RetryCoordinator, RetryDecision};
pub use scheduler::{PollStats, SchedulerService};
