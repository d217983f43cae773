//! Global distribution settings and the working-day calendar.
//!
//! `DistributionSettings` is a persisted singleton. The scheduler, executor
//! and retry coordinator read it at the start of each poll cycle; changes
//! take effect on the next cycle, never retroactively on in-flight runs.

use std::collections::BTreeSet;

use chrono::{Datelike, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::error::SettingsError;

fn default_execution_time() -> NaiveTime {
    NaiveTime::from_hms_opt(9, 0, 0).unwrap_or_default()
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_working_days() -> BTreeSet<u8> {
    // Monday through Friday
    (0u8..=4).collect()
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    60_000
}

fn default_max_concurrent() -> usize {
    4
}

fn default_batch_size() -> usize {
    100
}

fn default_true() -> bool {
    true
}

/// The global scheduler settings singleton.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionSettings {
    /// Master toggle; when false the dispatcher skips whole cycles.
    #[serde(default = "default_true")]
    pub service_enabled: bool,

    /// Default send time offered to the admin UI when building rules.
    #[serde(default = "default_execution_time")]
    pub execution_time: NaiveTime,

    /// Default IANA timezone for new rules.
    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// Default working-days-only behavior for new rules.
    #[serde(default)]
    pub working_days_only: bool,

    /// Working weekday indices, 0 = Monday through 6 = Sunday.
    #[serde(default = "default_working_days")]
    pub working_days: BTreeSet<u8>,

    /// Company holidays; dates here are never working days.
    #[serde(default)]
    pub holidays: BTreeSet<NaiveDate>,

    /// Run-level retry budget.
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Fixed delay between run-level retries, in milliseconds.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Notify an operator when a run fails terminally.
    #[serde(default = "default_true")]
    pub notification_on_error: bool,

    /// Address the failure notice is sent to.
    #[serde(default)]
    pub notification_email: Option<String>,

    /// Global cap on concurrently executing runs.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_distributions: usize,

    /// Recipients processed per persisted progress step.
    #[serde(default = "default_batch_size")]
    pub distribution_batch_size: usize,
}

impl Default for DistributionSettings {
    fn default() -> Self {
        Self {
            service_enabled: true,
            execution_time: default_execution_time(),
            timezone: default_timezone(),
            working_days_only: false,
            working_days: default_working_days(),
            holidays: BTreeSet::new(),
            retry_attempts: default_retry_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            notification_on_error: true,
            notification_email: None,
            max_concurrent_distributions: default_max_concurrent(),
            distribution_batch_size: default_batch_size(),
        }
    }
}

impl DistributionSettings {
    /// Derive the working-day calendar used by the recurrence engine.
    pub fn calendar(&self) -> WorkingCalendar {
        WorkingCalendar {
            working_days: self.working_days.clone(),
            holidays: self.holidays.clone(),
        }
    }

    /// Validate settings values.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.max_concurrent_distributions == 0 {
            return Err(SettingsError::ZeroConcurrency);
        }
        if self.distribution_batch_size == 0 {
            return Err(SettingsError::ZeroBatchSize);
        }
        if let Some(day) = self.working_days.iter().find(|d| **d > 6) {
            return Err(SettingsError::WorkingDayOutOfRange(*day));
        }
        Ok(())
    }
}

/// Working-day calendar: the configured weekday set minus holidays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkingCalendar {
    pub working_days: BTreeSet<u8>,
    pub holidays: BTreeSet<NaiveDate>,
}

impl WorkingCalendar {
    /// A calendar where every day is a working day.
    pub fn unrestricted() -> Self {
        Self {
            working_days: (0u8..=6).collect(),
            holidays: BTreeSet::new(),
        }
    }

    /// Whether `date` is a working day: its weekday is configured as working
    /// and it is not a holiday.
    pub fn is_working_day(&self, date: NaiveDate) -> bool {
        let weekday = date.weekday().num_days_from_monday() as u8;
        self.working_days.contains(&weekday) && !self.holidays.contains(&date)
    }
}
