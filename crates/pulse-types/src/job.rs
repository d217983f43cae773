//! Scheduled job definitions.
//!
//! A `ScheduledJob` pairs a recurrence rule with a payload describing what
//! the job distributes. The scheduler core treats the payload as opaque
//! beyond handing it to the backend for recipient resolution and per-unit
//! execution; the owning feature (token rewards or notifications) gives it
//! meaning.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::recurrence::RecurrenceRule;

/// Lifecycle status of a scheduled job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Eligible for dispatch when due.
    Active,
    /// Skipped by the dispatcher; in-progress runs are not interrupted.
    Paused,
    /// Retired: rule exhausted or removed by an operator.
    Archived,
}

/// Filter selecting the recipients of a distribution.
///
/// Resolution happens in the portal's employee directory, outside this core.
/// Empty `departments` and `employee_ids` means "everyone the backend
/// considers eligible".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipientFilter {
    #[serde(default)]
    pub departments: Vec<String>,

    #[serde(default)]
    pub employee_ids: Vec<String>,

    /// Include employees marked inactive in the directory.
    #[serde(default)]
    pub include_inactive: bool,
}

/// Job-kind-specific parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobPayload {
    /// Issue `amount` tokens of `token_kind` to each recipient.
    TokenDistribution {
        token_kind: String,
        amount: u64,
        filter: RecipientFilter,
    },

    /// Deliver the named notification template to each recipient.
    Notification {
        template: String,
        filter: RecipientFilter,
    },
}

impl JobPayload {
    /// The recipient filter carried by the payload.
    pub fn filter(&self) -> &RecipientFilter {
        match self {
            JobPayload::TokenDistribution { filter, .. } => filter,
            JobPayload::Notification { filter, .. } => filter,
        }
    }

    /// Units distributed per successful recipient (tokens, or 0 for
    /// notifications).
    pub fn units_per_recipient(&self) -> u64 {
        match self {
            JobPayload::TokenDistribution { amount, .. } => *amount,
            JobPayload::Notification { .. } => 0,
        }
    }
}

/// A persistent recurring job definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledJob {
    pub id: String,
    pub name: String,
    pub rule: RecurrenceRule,
    pub status: JobStatus,
    pub payload: JobPayload,

    /// When the most recent run was dispatched.
    pub last_run_at: Option<DateTime<Utc>>,

    /// Next due time; recomputed at dispatch so the schedule survives a
    /// failed execution.
    pub next_run_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
}

impl ScheduledJob {
    /// Create a new active job with a fresh ULID id.
    pub fn new(name: impl Into<String>, rule: RecurrenceRule, payload: JobPayload) -> Self {
        Self {
            id: Ulid::new().to_string(),
            name: name.into(),
            rule,
            status: JobStatus::Active,
            payload,
            last_run_at: None,
            next_run_at: None,
            created_at: Utc::now(),
        }
    }
}
