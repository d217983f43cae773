//! Error types for rule and settings validation.

use thiserror::Error;

/// Errors raised when a recurrence rule is invalid or contradictory.
///
/// These surface at job-creation time (construction/deserialization),
/// never while a run is executing.
#[derive(Debug, Error)]
pub enum RuleError {
    /// Interval multiplier must be at least 1
    #[error("Interval must be >= 1, got {0}")]
    InvalidInterval(u32),

    /// Weekday set is empty or contains an out-of-range index
    #[error("Invalid weekday set: {0}")]
    InvalidWeekDays(String),

    /// Day-of-month outside 1..=31
    #[error("Day of month must be 1-31, got {0}")]
    InvalidMonthDay(u8),

    /// Timezone string is not a valid IANA identifier
    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    /// End date precedes the rule's start date
    #[error("End date {end} precedes start date {start}")]
    EndBeforeStart {
        start: chrono::NaiveDate,
        end: chrono::NaiveDate,
    },

    /// A date computation overflowed the supported range
    #[error("Date out of range: {0}")]
    DateOutOfRange(String),
}

/// Errors raised when the settings singleton is rejected by validation.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// Concurrency cap must admit at least one run
    #[error("max_concurrent_distributions must be > 0")]
    ZeroConcurrency,

    /// Batch size of zero would never persist progress
    #[error("distribution_batch_size must be > 0")]
    ZeroBatchSize,

    /// Working day index outside 0 (Monday) through 6 (Sunday)
    #[error("Working day index {0} out of range 0-6")]
    WorkingDayOutOfRange(u8),
}
