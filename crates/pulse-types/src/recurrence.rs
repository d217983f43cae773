//! Recurrence rules.
//!
//! A rule is a frequency pattern (one typed variant per kind, carrying only
//! the fields that kind uses) plus the calendar settings shared by every
//! kind: anchor date, send time, timezone, working-day behavior and an
//! optional end date. Invalid field combinations (a day-of-month on a weekly
//! rule, for example) are unrepresentable.

use std::collections::BTreeSet;

use chrono::{NaiveDate, NaiveTime};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::RuleError;

fn default_interval() -> u32 {
    1
}

/// Frequency-specific portion of a recurrence rule.
///
/// Weekday indices are 0 = Monday through 6 = Sunday. The persisted
/// `frequency` tag matches the portal's schema vocabulary; the step unit is
/// implied by the variant, so no separate interval-type field exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "frequency", rename_all = "snake_case")]
pub enum RecurrencePattern {
    /// Fires exactly once, at the rule's start date.
    Once,

    /// Every `interval` days.
    Daily {
        #[serde(default = "default_interval")]
        interval: u32,
    },

    /// Every `interval` weeks, on the given weekdays.
    Weekly {
        #[serde(default = "default_interval")]
        interval: u32,
        week_days: BTreeSet<u8>,
    },

    /// Specific weekdays, every week.
    Weekdays { week_days: BTreeSet<u8> },

    /// Every `interval` months, on `month_day` (clamped to month length).
    Monthly {
        #[serde(default = "default_interval")]
        interval: u32,
        month_day: u8,
    },

    /// Every month, anchored to `month_day` (clamped to month length).
    MonthDay { month_day: u8 },

    /// Every `interval` years, on the start date's month and day.
    Yearly {
        #[serde(default = "default_interval")]
        interval: u32,
    },
}

impl RecurrencePattern {
    fn validate(&self) -> Result<(), RuleError> {
        match self {
            RecurrencePattern::Once => Ok(()),
            RecurrencePattern::Daily { interval } | RecurrencePattern::Yearly { interval } => {
                check_interval(*interval)
            }
            RecurrencePattern::Weekly {
                interval,
                week_days,
            } => {
                check_interval(*interval)?;
                check_week_days(week_days)
            }
            RecurrencePattern::Weekdays { week_days } => check_week_days(week_days),
            RecurrencePattern::Monthly {
                interval,
                month_day,
            } => {
                check_interval(*interval)?;
                check_month_day(*month_day)
            }
            RecurrencePattern::MonthDay { month_day } => check_month_day(*month_day),
        }
    }
}

fn check_interval(interval: u32) -> Result<(), RuleError> {
    if interval == 0 {
        return Err(RuleError::InvalidInterval(interval));
    }
    Ok(())
}

fn check_week_days(week_days: &BTreeSet<u8>) -> Result<(), RuleError> {
    if week_days.is_empty() {
        return Err(RuleError::InvalidWeekDays("empty set".to_string()));
    }
    if let Some(day) = week_days.iter().find(|d| **d > 6) {
        return Err(RuleError::InvalidWeekDays(format!(
            "index {} out of range 0-6",
            day
        )));
    }
    Ok(())
}

fn check_month_day(month_day: u8) -> Result<(), RuleError> {
    if !(1..=31).contains(&month_day) {
        return Err(RuleError::InvalidMonthDay(month_day));
    }
    Ok(())
}

fn default_timezone() -> String {
    "UTC".to_string()
}

/// A complete recurrence rule: frequency pattern plus calendar settings.
///
/// All date arithmetic for the rule happens in `timezone`, never in server
/// local time. `start_date` anchors `Once` and the week/year stepping of
/// interval rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurrenceRule {
    #[serde(flatten)]
    pub pattern: RecurrencePattern,

    /// Anchor date for the schedule, in the rule's timezone.
    pub start_date: NaiveDate,

    /// Wall-clock time of day at which the job becomes due.
    pub send_time: NaiveTime,

    /// IANA timezone name (e.g., "Europe/Berlin").
    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// Roll a computed date forward past non-working days and holidays.
    #[serde(default)]
    pub working_days_only: bool,

    /// Last date (inclusive) on which an occurrence may fall.
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
}

impl RecurrenceRule {
    /// Validate the rule's fields.
    ///
    /// # Errors
    ///
    /// Returns `RuleError` for an empty/out-of-range weekday set, a
    /// day-of-month outside 1-31, a zero interval, an unknown timezone, or
    /// an end date before the start date.
    pub fn validate(&self) -> Result<(), RuleError> {
        self.pattern.validate()?;
        self.parse_timezone()?;
        if let Some(end) = self.end_date {
            if end < self.start_date {
                return Err(RuleError::EndBeforeStart {
                    start: self.start_date,
                    end,
                });
            }
        }
        Ok(())
    }

    /// Parse the rule's timezone string.
    ///
    /// # Errors
    ///
    /// Returns `RuleError::InvalidTimezone` if the string is not a valid
    /// IANA identifier.
    pub fn parse_timezone(&self) -> Result<Tz, RuleError> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_| RuleError::InvalidTimezone(self.timezone.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_rule(pattern: RecurrencePattern) -> RecurrenceRule {
        RecurrenceRule {
            pattern,
            start_date: NaiveDate::from_ymd_opt(2025, 1, 6).unwrap(),
            send_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            timezone: "UTC".to_string(),
            working_days_only: false,
            end_date: None,
        }
    }

    #[test]
    fn test_valid_daily_rule() {
        let rule = base_rule(RecurrencePattern::Daily { interval: 2 });
        assert!(rule.validate().is_ok());
    }

    #[test]
    fn test_zero_interval_rejected() {
        let rule = base_rule(RecurrencePattern::Daily { interval: 0 });
        assert!(matches!(rule.validate(), Err(RuleError::InvalidInterval(0))));
    }

    #[test]
    fn test_empty_week_days_rejected() {
        let rule = base_rule(RecurrencePattern::Weekdays {
            week_days: BTreeSet::new(),
        });
        assert!(matches!(rule.validate(), Err(RuleError::InvalidWeekDays(_))));
    }

    #[test]
    fn test_week_day_index_out_of_range() {
        let rule = base_rule(RecurrencePattern::Weekly {
            interval: 1,
            week_days: [0u8, 7u8].into_iter().collect(),
        });
        assert!(matches!(rule.validate(), Err(RuleError::InvalidWeekDays(_))));
    }

    #[test]
    fn test_month_day_bounds() {
        let rule = base_rule(RecurrencePattern::Monthly {
            interval: 1,
            month_day: 0,
        });
        assert!(matches!(rule.validate(), Err(RuleError::InvalidMonthDay(0))));

        let rule = base_rule(RecurrencePattern::MonthDay { month_day: 32 });
        assert!(matches!(
            rule.validate(),
            Err(RuleError::InvalidMonthDay(32))
        ));

        let rule = base_rule(RecurrencePattern::MonthDay { month_day: 31 });
        assert!(rule.validate().is_ok());
    }

    #[test]
    fn test_invalid_timezone_rejected() {
        let mut rule = base_rule(RecurrencePattern::Once);
        rule.timezone = "Invalid/Zone".to_string();
        assert!(matches!(
            rule.validate(),
            Err(RuleError::InvalidTimezone(_))
        ));
    }

    #[test]
    fn test_end_before_start_rejected() {
        let mut rule = base_rule(RecurrencePattern::Once);
        rule.end_date = Some(NaiveDate::from_ymd_opt(2024, 12, 31).unwrap());
        assert!(matches!(
            rule.validate(),
            Err(RuleError::EndBeforeStart { .. })
        ));
    }

    #[test]
    fn test_frequency_tag_serialization() {
        let rule = base_rule(RecurrencePattern::Weekly {
            interval: 2,
            week_days: [0u8, 4u8].into_iter().collect(),
        });
        let json = serde_json::to_string(&rule).unwrap();
        assert!(json.contains("\"frequency\":\"weekly\""));

        let decoded: RecurrenceRule = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, rule);
    }

    #[test]
    fn test_interval_defaults_to_one() {
        let json = r#"{
            "frequency": "daily",
            "start_date": "2025-01-06",
            "send_time": "09:00:00"
        }"#;
        let rule: RecurrenceRule = serde_json::from_str(json).unwrap();
        assert_eq!(rule.pattern, RecurrencePattern::Daily { interval: 1 });
        assert_eq!(rule.timezone, "UTC");
        assert!(!rule.working_days_only);
        assert!(rule.end_date.is_none());
    }
}
