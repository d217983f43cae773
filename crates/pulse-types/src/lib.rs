//! # pulse-types
//!
//! Shared domain types for the Pulse distribution scheduler.
//!
//! This crate defines the entities persisted by the scheduler core:
//! - Recurrence rules: typed frequency variants with calendar settings
//! - Scheduled jobs: recurring job definitions with opaque payloads
//! - Job runs: individual execution attempts with durable progress counters
//! - Distribution settings: the global singleton read each poll cycle

pub mod config;
pub mod error;
pub mod job;
pub mod recurrence;
pub mod run;
pub mod settings;

pub use config::{AppConfig, ConfigError};
pub use error::{RuleError, SettingsError};
pub use job::{JobPayload, JobStatus, RecipientFilter, ScheduledJob};
pub use recurrence::{RecurrencePattern, RecurrenceRule};
pub use run::{JobRun, LogEntry, RunStatus};
pub use settings::{DistributionSettings, WorkingCalendar};
