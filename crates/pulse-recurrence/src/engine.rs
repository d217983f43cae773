//! Next-occurrence computation.
//!
//! All arithmetic happens in the rule's timezone. Candidate dates are
//! generated in ascending order per frequency, then settled: rolled forward
//! past non-working days when the rule asks for it, cut off at the end
//! date, localized (resolving DST gaps forward), and accepted only when the
//! resulting instant is strictly after the reference instant.

use chrono::{DateTime, Datelike, Days, Duration, LocalResult, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

use pulse_types::{RecurrencePattern, RecurrenceRule, RuleError, WorkingCalendar};

/// Upper bound on candidates examined before giving up. Generous: even a
/// weekly rule restricted to one weekday examines one candidate per week.
const MAX_CANDIDATES: u32 = 10_000;

/// Bound on the cheap fast-forward scan locating the first candidate near
/// the reference date (a daily rule anchored decades back walks one
/// candidate per day).
const MAX_FAST_FORWARD: u32 = 5_000_000;

/// Cap on single-day roll-forward steps, so a calendar with no working days
/// cannot loop forever.
const MAX_ROLL_DAYS: u32 = 400;

/// Compute the next due instant strictly after `from`.
///
/// Returns `Ok(None)` when the rule has no further occurrences: a `Once`
/// rule whose occurrence is not after `from`, or any rule whose next
/// candidate falls past its end date.
///
/// # Errors
///
/// Returns `RuleError` if the rule is invalid, or if date arithmetic leaves
/// the supported range (including a working-day roll that finds no working
/// day within [`MAX_ROLL_DAYS`]).
pub fn compute_next_run(
    rule: &RecurrenceRule,
    from: DateTime<Utc>,
    calendar: &WorkingCalendar,
) -> Result<Option<DateTime<Utc>>, RuleError> {
    rule.validate()?;
    let tz = rule.parse_timezone()?;
    let from_date = from.with_timezone(&tz).date_naive();

    match &rule.pattern {
        RecurrencePattern::Once => {
            match settle(rule, tz, calendar, from, rule.start_date)? {
                Settled::Accept(at) => Ok(Some(at)),
                // Already fired (or past the end date): no more occurrences.
                Settled::TooEarly | Settled::PastEnd => Ok(None),
            }
        }
        RecurrencePattern::Daily { interval } => {
            next_stepped(rule, tz, calendar, from, from_date, |k| {
                step_days(rule.start_date, *interval, k)
            })
        }
        RecurrencePattern::Weekly {
            interval,
            week_days,
        } => next_weekly(rule, tz, calendar, from, from_date, *interval, week_days),
        RecurrencePattern::Weekdays { week_days } => {
            next_weekly(rule, tz, calendar, from, from_date, 1, week_days)
        }
        RecurrencePattern::Monthly {
            interval,
            month_day,
        } => next_stepped(rule, tz, calendar, from, from_date, |k| {
            step_months(rule.start_date, *interval, k, *month_day as u32)
        }),
        RecurrencePattern::MonthDay { month_day } => {
            next_stepped(rule, tz, calendar, from, from_date, |k| {
                step_months(rule.start_date, 1, k, *month_day as u32)
            })
        }
        RecurrencePattern::Yearly { interval } => {
            next_stepped(rule, tz, calendar, from, from_date, |k| {
                step_years(rule.start_date, *interval, k)
            })
        }
    }
}

/// Outcome of settling one candidate date.
enum Settled {
    Accept(DateTime<Utc>),
    /// Candidate resolves to an instant at or before the reference.
    TooEarly,
    /// Candidate (after rolling) falls past the rule's end date.
    PastEnd,
}

/// Apply working-day roll, end-date cutoff, and localization to a candidate.
fn settle(
    rule: &RecurrenceRule,
    tz: Tz,
    calendar: &WorkingCalendar,
    from: DateTime<Utc>,
    candidate: NaiveDate,
) -> Result<Settled, RuleError> {
    let mut date = candidate;

    if rule.working_days_only {
        let mut steps = 0u32;
        while !calendar.is_working_day(date) {
            date = date
                .checked_add_days(Days::new(1))
                .ok_or_else(|| RuleError::DateOutOfRange(date.to_string()))?;
            steps += 1;
            if steps > MAX_ROLL_DAYS {
                return Err(RuleError::DateOutOfRange(format!(
                    "no working day within {} days of {}",
                    MAX_ROLL_DAYS, candidate
                )));
            }
        }
    }

    if let Some(end) = rule.end_date {
        if date > end {
            return Ok(Settled::PastEnd);
        }
    }

    let at = localize(date, rule.send_time, tz)
        .ok_or_else(|| RuleError::DateOutOfRange(date.to_string()))?;
    if at > from {
        Ok(Settled::Accept(at))
    } else {
        Ok(Settled::TooEarly)
    }
}

/// Resolve a local wall-clock time to UTC.
///
/// A DST gap (the wall-clock time does not exist) shifts forward one hour
/// at a time until a valid time is found; an ambiguous time (fall-back)
/// takes the earlier offset.
fn localize(date: NaiveDate, time: NaiveTime, tz: Tz) -> Option<DateTime<Utc>> {
    let mut naive = date.and_time(time);
    for _ in 0..4 {
        match tz.from_local_datetime(&naive) {
            LocalResult::Single(dt) => return Some(dt.with_timezone(&Utc)),
            LocalResult::Ambiguous(earliest, _) => return Some(earliest.with_timezone(&Utc)),
            LocalResult::None => naive += Duration::hours(1),
        }
    }
    None
}

/// Generic driver for patterns whose k-th candidate is a closed formula.
///
/// Fast-forwards `k` so that scanning starts just before the reference
/// date, then settles candidates in order.
fn next_stepped<F>(
    rule: &RecurrenceRule,
    tz: Tz,
    calendar: &WorkingCalendar,
    from: DateTime<Utc>,
    from_date: NaiveDate,
    candidate_at: F,
) -> Result<Option<DateTime<Utc>>, RuleError>
where
    F: Fn(u32) -> Option<NaiveDate>,
{
    // Binary-search-free fast-forward: find the largest k whose candidate
    // is still before the reference date, then settle from there.
    let mut k = 0u32;
    if let Some(first) = candidate_at(0) {
        if first < from_date {
            let mut probe = k;
            while let Some(date) = candidate_at(probe + 1) {
                if date >= from_date {
                    break;
                }
                probe += 1;
                if probe > MAX_FAST_FORWARD {
                    return Err(RuleError::DateOutOfRange(
                        "candidate scan exceeded bound".to_string(),
                    ));
                }
            }
            k = probe;
        }
    }

    for i in 0..MAX_CANDIDATES {
        let Some(date) = candidate_at(k + i) else {
            return Err(RuleError::DateOutOfRange(
                "date arithmetic overflow".to_string(),
            ));
        };
        // Monthly candidates can land before the anchor (month_day below
        // the anchor's day-of-month); those are not occurrences.
        if date < rule.start_date {
            continue;
        }
        match settle(rule, tz, calendar, from, date)? {
            Settled::Accept(at) => return Ok(Some(at)),
            Settled::TooEarly => continue,
            Settled::PastEnd => return Ok(None),
        }
    }
    Err(RuleError::DateOutOfRange(
        "candidate scan exceeded bound".to_string(),
    ))
}

/// Weekly scan: day-by-day over eligible weeks, jumping over weeks whose
/// offset from the anchor week is not a multiple of the interval.
fn next_weekly(
    rule: &RecurrenceRule,
    tz: Tz,
    calendar: &WorkingCalendar,
    from: DateTime<Utc>,
    from_date: NaiveDate,
    interval: u32,
    week_days: &std::collections::BTreeSet<u8>,
) -> Result<Option<DateTime<Utc>>, RuleError> {
    let anchor_monday = monday_of(rule.start_date);
    let mut date = rule.start_date.max(from_date);

    for _ in 0..MAX_CANDIDATES {
        let weeks = ((monday_of(date) - anchor_monday).num_days() / 7) as u32;
        let rem = weeks % interval;
        if rem != 0 {
            // Skip ahead to the Monday of the next eligible week.
            date = monday_of(date) + Duration::weeks((interval - rem) as i64);
            continue;
        }
        if week_days.contains(&weekday_index(date)) {
            match settle(rule, tz, calendar, from, date)? {
                Settled::Accept(at) => return Ok(Some(at)),
                Settled::TooEarly => {}
                Settled::PastEnd => return Ok(None),
            }
        }
        date = date
            .checked_add_days(Days::new(1))
            .ok_or_else(|| RuleError::DateOutOfRange(date.to_string()))?;
    }
    Err(RuleError::DateOutOfRange(
        "candidate scan exceeded bound".to_string(),
    ))
}

fn weekday_index(date: NaiveDate) -> u8 {
    date.weekday().num_days_from_monday() as u8
}

fn monday_of(date: NaiveDate) -> NaiveDate {
    date - Duration::days(weekday_index(date) as i64)
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|d| d.pred_opt())
        .map(|d| d.day())
        .unwrap_or(28)
}

/// k-th candidate for daily rules: anchor + k * interval days.
fn step_days(anchor: NaiveDate, interval: u32, k: u32) -> Option<NaiveDate> {
    anchor.checked_add_days(Days::new(interval as u64 * k as u64))
}

/// k-th candidate for monthly rules: anchor month + k * interval months,
/// day clamped to the target month's length.
fn step_months(anchor: NaiveDate, interval: u32, k: u32, month_day: u32) -> Option<NaiveDate> {
    let month_index = anchor.year() as i64 * 12 + anchor.month0() as i64 + interval as i64 * k as i64;
    let year = i32::try_from(month_index.div_euclid(12)).ok()?;
    let month = month_index.rem_euclid(12) as u32 + 1;
    NaiveDate::from_ymd_opt(year, month, month_day.min(days_in_month(year, month)))
}

/// k-th candidate for yearly rules: anchor month/day each interval years,
/// Feb 29 clamping to Feb 28 on non-leap years.
fn step_years(anchor: NaiveDate, interval: u32, k: u32) -> Option<NaiveDate> {
    let year = anchor
        .year()
        .checked_add(i32::try_from(interval as u64 * k as u64).ok()?)?;
    let month = anchor.month();
    NaiveDate::from_ymd_opt(year, month, anchor.day().min(days_in_month(year, month)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;
    use std::collections::BTreeSet;

    fn rule(pattern: RecurrencePattern) -> RecurrenceRule {
        RecurrenceRule {
            pattern,
            // 2025-01-06 is a Monday.
            start_date: date(2025, 1, 6),
            send_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            timezone: "UTC".to_string(),
            working_days_only: false,
            end_date: None,
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    fn all_days() -> WorkingCalendar {
        WorkingCalendar::unrestricted()
    }

    fn weekdays_only() -> WorkingCalendar {
        WorkingCalendar {
            working_days: (0u8..=4).collect(),
            holidays: BTreeSet::new(),
        }
    }

    #[test]
    fn test_once_fires_then_exhausts() {
        let r = rule(RecurrencePattern::Once);
        let before = utc(2025, 1, 1, 0, 0);

        let first = compute_next_run(&r, before, &all_days()).unwrap();
        assert_eq!(first, Some(utc(2025, 1, 6, 9, 0)));

        // Reference at or after the occurrence: no more.
        let after = compute_next_run(&r, first.unwrap(), &all_days()).unwrap();
        assert_eq!(after, None);
    }

    #[test]
    fn test_daily_strictly_after_reference() {
        let r = rule(RecurrencePattern::Daily { interval: 1 });
        let from = utc(2025, 1, 10, 9, 0); // exactly a due instant
        let next = compute_next_run(&r, from, &all_days()).unwrap().unwrap();
        assert_eq!(next, utc(2025, 1, 11, 9, 0));
        assert!(next > from);
    }

    #[test]
    fn test_daily_same_day_when_send_time_ahead() {
        let r = rule(RecurrencePattern::Daily { interval: 1 });
        let from = utc(2025, 1, 10, 6, 30);
        let next = compute_next_run(&r, from, &all_days()).unwrap().unwrap();
        assert_eq!(next, utc(2025, 1, 10, 9, 0));
    }

    #[test]
    fn test_daily_interval_steps_from_anchor() {
        let r = rule(RecurrencePattern::Daily { interval: 3 });
        // Anchor Jan 6; occurrences Jan 6, 9, 12, ...
        let next = compute_next_run(&r, utc(2025, 1, 7, 0, 0), &all_days())
            .unwrap()
            .unwrap();
        assert_eq!(next, utc(2025, 1, 9, 9, 0));
    }

    #[test]
    fn test_daily_fast_forward_over_old_anchor() {
        let mut r = rule(RecurrencePattern::Daily { interval: 1 });
        r.start_date = date(2015, 1, 1);
        let next = compute_next_run(&r, utc(2025, 6, 1, 12, 0), &all_days())
            .unwrap()
            .unwrap();
        assert_eq!(next, utc(2025, 6, 2, 9, 0));
    }

    #[test]
    fn test_weekdays_picks_next_selected_day() {
        // Monday and Thursday.
        let r = rule(RecurrencePattern::Weekdays {
            week_days: [0u8, 3u8].into_iter().collect(),
        });
        // Tuesday Jan 7 -> Thursday Jan 9.
        let next = compute_next_run(&r, utc(2025, 1, 7, 0, 0), &all_days())
            .unwrap()
            .unwrap();
        assert_eq!(next, utc(2025, 1, 9, 9, 0));

        // Friday Jan 10 -> Monday Jan 13.
        let next = compute_next_run(&r, utc(2025, 1, 10, 12, 0), &all_days())
            .unwrap()
            .unwrap();
        assert_eq!(next, utc(2025, 1, 13, 9, 0));
    }

    #[test]
    fn test_weekly_interval_skips_weeks() {
        // Every 2 weeks on Monday, anchored to Monday Jan 6.
        let r = rule(RecurrencePattern::Weekly {
            interval: 2,
            week_days: [0u8].into_iter().collect(),
        });
        // After Jan 6: Jan 13 is an odd week, so Jan 20.
        let next = compute_next_run(&r, utc(2025, 1, 6, 9, 0), &all_days())
            .unwrap()
            .unwrap();
        assert_eq!(next, utc(2025, 1, 20, 9, 0));
    }

    #[test]
    fn test_monthly_clamps_to_month_length() {
        let r = rule(RecurrencePattern::Monthly {
            interval: 1,
            month_day: 31,
        });
        // After Jan 31: February clamps to the 28th in 2025.
        let next = compute_next_run(&r, utc(2025, 1, 31, 9, 0), &all_days())
            .unwrap()
            .unwrap();
        assert_eq!(next, utc(2025, 2, 28, 9, 0));

        // Leap year February clamps to the 29th.
        let mut leap = rule(RecurrencePattern::Monthly {
            interval: 1,
            month_day: 31,
        });
        leap.start_date = date(2024, 1, 6);
        let next = compute_next_run(&leap, utc(2024, 1, 31, 10, 0), &all_days())
            .unwrap()
            .unwrap();
        assert_eq!(next, utc(2024, 2, 29, 9, 0));
    }

    #[test]
    fn test_monthly_day_before_anchor_is_not_an_occurrence() {
        // Anchor mid-month with a month_day earlier in the month: the
        // anchor month's slot precedes the start date and must be skipped.
        let mut r = rule(RecurrencePattern::Monthly {
            interval: 1,
            month_day: 1,
        });
        r.start_date = date(2025, 1, 15);

        let next = compute_next_run(&r, utc(2025, 1, 1, 0, 0), &all_days())
            .unwrap()
            .unwrap();
        assert_eq!(next, utc(2025, 2, 1, 9, 0));
    }

    #[test]
    fn test_monthly_interval_steps_from_anchor_month() {
        // Every 3 months on the 15th, anchored January.
        let r = rule(RecurrencePattern::Monthly {
            interval: 3,
            month_day: 15,
        });
        let next = compute_next_run(&r, utc(2025, 2, 1, 0, 0), &all_days())
            .unwrap()
            .unwrap();
        assert_eq!(next, utc(2025, 4, 15, 9, 0));
    }

    #[test]
    fn test_yearly_leap_day_clamps() {
        let mut r = rule(RecurrencePattern::Yearly { interval: 1 });
        r.start_date = date(2024, 2, 29);
        let next = compute_next_run(&r, utc(2024, 3, 1, 0, 0), &all_days())
            .unwrap()
            .unwrap();
        assert_eq!(next, utc(2025, 2, 28, 9, 0));

        // The next leap year restores Feb 29.
        let next = compute_next_run(&r, utc(2027, 3, 1, 0, 0), &all_days())
            .unwrap()
            .unwrap();
        assert_eq!(next, utc(2028, 2, 29, 9, 0));
    }

    #[test]
    fn test_working_day_roll_forward_over_weekend() {
        let mut r = rule(RecurrencePattern::Monthly {
            interval: 1,
            month_day: 1,
        });
        r.working_days_only = true;
        // 2025-02-01 is a Saturday; rolls to Monday Feb 3.
        let next = compute_next_run(&r, utc(2025, 1, 15, 0, 0), &weekdays_only())
            .unwrap()
            .unwrap();
        assert_eq!(next, utc(2025, 2, 3, 9, 0));
    }

    #[test]
    fn test_working_day_roll_forward_over_holiday() {
        let mut r = rule(RecurrencePattern::Daily { interval: 1 });
        r.working_days_only = true;
        let mut calendar = weekdays_only();
        // 2025-01-07 (Tuesday) is a holiday.
        calendar.holidays.insert(date(2025, 1, 7));

        let next = compute_next_run(&r, utc(2025, 1, 6, 9, 0), &calendar)
            .unwrap()
            .unwrap();
        assert_eq!(next, utc(2025, 1, 8, 9, 0));
    }

    #[test]
    fn test_roll_never_goes_backward() {
        let mut r = rule(RecurrencePattern::Daily { interval: 1 });
        r.working_days_only = true;
        let from = utc(2025, 1, 3, 9, 0); // Friday occurrence
        let next = compute_next_run(&r, from, &weekdays_only())
            .unwrap()
            .unwrap();
        assert!(next > from);
        assert_eq!(next, utc(2025, 1, 6, 9, 0)); // Monday
    }

    #[test]
    fn test_end_date_cuts_off() {
        let mut r = rule(RecurrencePattern::Daily { interval: 1 });
        r.end_date = Some(date(2025, 1, 8));

        let next = compute_next_run(&r, utc(2025, 1, 7, 9, 0), &all_days()).unwrap();
        assert_eq!(next, Some(utc(2025, 1, 8, 9, 0)));

        let next = compute_next_run(&r, utc(2025, 1, 8, 9, 0), &all_days()).unwrap();
        assert_eq!(next, None);
    }

    #[test]
    fn test_end_date_applies_after_roll() {
        // Occurrence lands on Saturday, rolls to Monday, but Monday is past
        // the end date: the rule is exhausted rather than rolled past it.
        let mut r = rule(RecurrencePattern::Daily { interval: 1 });
        r.working_days_only = true;
        r.end_date = Some(date(2025, 1, 11)); // Saturday

        let next = compute_next_run(&r, utc(2025, 1, 10, 9, 0), &weekdays_only()).unwrap();
        assert_eq!(next, None);
    }

    #[test]
    fn test_timezone_wall_clock_respected() {
        let mut r = rule(RecurrencePattern::Daily { interval: 1 });
        r.timezone = "Asia/Tokyo".to_string(); // UTC+9, no DST
        let next = compute_next_run(&r, utc(2025, 1, 10, 0, 0), &all_days())
            .unwrap()
            .unwrap();
        // 09:00 Tokyo == 00:00 UTC, which is not strictly after: next day.
        assert_eq!(next, utc(2025, 1, 11, 0, 0));
    }

    #[test]
    fn test_dst_gap_shifts_forward() {
        // Europe/Berlin skips 02:00-03:00 on 2025-03-30.
        let mut r = rule(RecurrencePattern::Daily { interval: 1 });
        r.timezone = "Europe/Berlin".to_string();
        r.send_time = NaiveTime::from_hms_opt(2, 30, 0).unwrap();

        // 2025-03-29 02:30 Berlin is 01:30 UTC (offset +1).
        let from = utc(2025, 3, 29, 1, 30);
        let next = compute_next_run(&r, from, &all_days()).unwrap().unwrap();
        // The gapped 02:30 becomes 03:30 local at offset +2 -> 01:30 UTC.
        assert_eq!(next, utc(2025, 3, 30, 1, 30));
        assert!(next > from);
    }

    #[test]
    fn test_invalid_rule_surfaces_error() {
        let r = rule(RecurrencePattern::Daily { interval: 0 });
        assert!(compute_next_run(&r, utc(2025, 1, 1, 0, 0), &all_days()).is_err());
    }

    #[test]
    fn test_determinism() {
        let r = rule(RecurrencePattern::Weekly {
            interval: 2,
            week_days: [1u8, 4u8].into_iter().collect(),
        });
        let from = utc(2025, 2, 14, 3, 0);
        let a = compute_next_run(&r, from, &weekdays_only()).unwrap();
        let b = compute_next_run(&r, from, &weekdays_only()).unwrap();
        assert_eq!(a, b);
    }
}
