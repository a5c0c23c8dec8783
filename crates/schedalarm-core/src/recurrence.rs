//! Recurrence math: advancing a recurring time point through its cycle.
//!
//! All functions here are pure -- `now` is always an explicit parameter, so
//! callers (and tests) control the clock. Hour/day/week units are fixed
//! length; month and year units are calendar-relative, which makes any
//! duration measured against them approximate. That approximation is a
//! documented property of the engine, not something to correct here.

use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;

/// The recurrence unit of a schedule.
///
/// `None` is a reserved placeholder for non-repeating schedules. It is not
/// implemented: every validating entry point rejects it, and the advancement
/// functions treat it as a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepeatKind {
    Hourly,
    Daily,
    Weekly,
    Monthly,
    Yearly,
    None,
}

impl RepeatKind {
    /// Storage/CLI representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            RepeatKind::Hourly => "hourly",
            RepeatKind::Daily => "daily",
            RepeatKind::Weekly => "weekly",
            RepeatKind::Monthly => "monthly",
            RepeatKind::Yearly => "yearly",
            RepeatKind::None => "none",
        }
    }

    /// Whether the engine can actually schedule this kind.
    pub fn is_repeating(&self) -> bool {
        !matches!(self, RepeatKind::None)
    }

    /// Validate that this kind is usable for a schedule.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.is_repeating() {
            Ok(())
        } else {
            Err(ValidationError::UnsupportedRepeatKind(
                self.as_str().to_string(),
            ))
        }
    }

    /// Nominal length of one unit in seconds, used by the duration
    /// normalization utility. Month and year are the 30-day/365-day
    /// approximations carried over from the reference behavior.
    fn nominal_secs(&self) -> Option<i64> {
        match self {
            RepeatKind::Hourly => Some(60 * 60),
            RepeatKind::Daily => Some(24 * 60 * 60),
            RepeatKind::Weekly => Some(7 * 24 * 60 * 60),
            RepeatKind::Monthly => Some(30 * 24 * 60 * 60),
            RepeatKind::Yearly => Some(365 * 24 * 60 * 60),
            RepeatKind::None => None,
        }
    }
}

impl fmt::Display for RepeatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RepeatKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hourly" => Ok(RepeatKind::Hourly),
            "daily" => Ok(RepeatKind::Daily),
            "weekly" => Ok(RepeatKind::Weekly),
            "monthly" => Ok(RepeatKind::Monthly),
            "yearly" => Ok(RepeatKind::Yearly),
            "none" => Ok(RepeatKind::None),
            other => Err(ValidationError::UnsupportedRepeatKind(other.to_string())),
        }
    }
}

/// Direction of a single-unit advancement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

/// Move `time` by exactly one recurrence unit.
///
/// Monthly/Yearly steps are calendar-relative (chrono clamps day-of-month,
/// so Jan 31 + 1 month = Feb 28/29). `RepeatKind::None` returns the input
/// unchanged. Saturates at the representable range instead of panicking.
pub fn advance_one_unit(time: DateTime<Utc>, kind: RepeatKind, dir: Direction) -> DateTime<Utc> {
    let forward = dir == Direction::Forward;
    let stepped = match kind {
        RepeatKind::Hourly => {
            let step = Duration::hours(1);
            if forward {
                time.checked_add_signed(step)
            } else {
                time.checked_sub_signed(step)
            }
        }
        RepeatKind::Daily => {
            let step = Duration::days(1);
            if forward {
                time.checked_add_signed(step)
            } else {
                time.checked_sub_signed(step)
            }
        }
        RepeatKind::Weekly => {
            let step = Duration::weeks(1);
            if forward {
                time.checked_add_signed(step)
            } else {
                time.checked_sub_signed(step)
            }
        }
        RepeatKind::Monthly => {
            if forward {
                time.checked_add_months(Months::new(1))
            } else {
                time.checked_sub_months(Months::new(1))
            }
        }
        RepeatKind::Yearly => {
            if forward {
                time.checked_add_months(Months::new(12))
            } else {
                time.checked_sub_months(Months::new(12))
            }
        }
        RepeatKind::None => return time,
    };
    stepped.unwrap_or(time)
}

/// Advance `time` forward until it is at or after `now`.
///
/// Already-future times pass through unchanged; never returns a time in the
/// past. No-op for `RepeatKind::None`. Applying this twice with the same
/// `now` yields the same result as once.
pub fn next_occurrence_at_or_after(
    time: DateTime<Utc>,
    kind: RepeatKind,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    if !kind.is_repeating() {
        return time;
    }

    let mut next = time;
    while next < now {
        let stepped = advance_one_unit(next, kind, Direction::Forward);
        if stepped <= next {
            // Saturated; nothing further to do.
            break;
        }
        next = stepped;
    }
    next
}

/// Normalize an arbitrary start/end pair into a duration (in minutes) that
/// fits within one recurrence unit.
///
/// Callers translating a user-picked clock-time pair can end up with a span
/// that is overlong (end rolled past a full cycle) or negative (start moved
/// forward past a stale end). Both are folded back into `(0, unit]` by
/// repeated subtraction/addition of the unit length. Monthly and Yearly use
/// nominal 30-day/365-day lengths and are therefore approximate. Returns 0
/// for an unsupported kind.
pub fn span_duration_min(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    kind: RepeatKind,
) -> i64 {
    let unit_secs = match kind.nominal_secs() {
        Some(secs) => secs,
        None => return 0,
    };

    let mut span_secs = (end - start).num_seconds();
    while span_secs > unit_secs {
        span_secs -= unit_secs;
    }
    while span_secs < 0 {
        span_secs += unit_secs;
    }

    span_secs / 60
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn advance_fixed_units() {
        let t = utc(2024, 3, 10, 9, 0);
        assert_eq!(
            advance_one_unit(t, RepeatKind::Hourly, Direction::Forward),
            utc(2024, 3, 10, 10, 0)
        );
        assert_eq!(
            advance_one_unit(t, RepeatKind::Daily, Direction::Forward),
            utc(2024, 3, 11, 9, 0)
        );
        assert_eq!(
            advance_one_unit(t, RepeatKind::Weekly, Direction::Backward),
            utc(2024, 3, 3, 9, 0)
        );
    }

    #[test]
    fn advance_month_clamps_day() {
        let t = utc(2024, 1, 31, 12, 0);
        // 2024 is a leap year.
        assert_eq!(
            advance_one_unit(t, RepeatKind::Monthly, Direction::Forward),
            utc(2024, 2, 29, 12, 0)
        );
    }

    #[test]
    fn advance_year_handles_leap_day() {
        let t = utc(2024, 2, 29, 8, 0);
        assert_eq!(
            advance_one_unit(t, RepeatKind::Yearly, Direction::Forward),
            utc(2025, 2, 28, 8, 0)
        );
    }

    #[test]
    fn none_kind_is_a_noop() {
        let t = utc(2024, 3, 10, 9, 0);
        assert_eq!(advance_one_unit(t, RepeatKind::None, Direction::Forward), t);
        assert_eq!(
            next_occurrence_at_or_after(t, RepeatKind::None, utc(2030, 1, 1, 0, 0)),
            t
        );
    }

    #[test]
    fn next_occurrence_moves_past_now() {
        let start = utc(2024, 3, 1, 9, 0);
        let now = utc(2024, 3, 10, 10, 30);
        let next = next_occurrence_at_or_after(start, RepeatKind::Daily, now);
        assert_eq!(next, utc(2024, 3, 11, 9, 0));
    }

    #[test]
    fn next_occurrence_keeps_future_time() {
        let start = utc(2024, 5, 1, 9, 0);
        let now = utc(2024, 3, 10, 10, 30);
        assert_eq!(
            next_occurrence_at_or_after(start, RepeatKind::Weekly, now),
            start
        );
    }

    #[test]
    fn next_occurrence_accepts_exact_now() {
        let now = utc(2024, 3, 10, 9, 0);
        assert_eq!(
            next_occurrence_at_or_after(now, RepeatKind::Hourly, now),
            now
        );
    }

    #[test]
    fn span_duration_plain() {
        let start = utc(2024, 3, 10, 9, 0);
        let end = utc(2024, 3, 10, 17, 0);
        assert_eq!(span_duration_min(start, end, RepeatKind::Daily), 480);
    }

    #[test]
    fn span_duration_overlong_folds_back() {
        let start = utc(2024, 3, 10, 9, 0);
        // Two days and two hours later: folds to two hours within a daily unit.
        let end = utc(2024, 3, 12, 11, 0);
        assert_eq!(span_duration_min(start, end, RepeatKind::Daily), 120);
    }

    #[test]
    fn span_duration_negative_folds_forward() {
        // Stale end time in the past relative to an updated start.
        let start = utc(2024, 3, 10, 9, 0);
        let end = utc(2024, 3, 9, 17, 0);
        assert_eq!(span_duration_min(start, end, RepeatKind::Daily), 480);
    }

    #[test]
    fn span_duration_unsupported_kind() {
        let start = utc(2024, 3, 10, 9, 0);
        let end = utc(2024, 3, 10, 10, 0);
        assert_eq!(span_duration_min(start, end, RepeatKind::None), 0);
    }

    #[test]
    fn repeat_kind_round_trips() {
        for kind in [
            RepeatKind::Hourly,
            RepeatKind::Daily,
            RepeatKind::Weekly,
            RepeatKind::Monthly,
            RepeatKind::Yearly,
            RepeatKind::None,
        ] {
            assert_eq!(kind.as_str().parse::<RepeatKind>().unwrap(), kind);
        }
        assert!("fortnightly".parse::<RepeatKind>().is_err());
    }

    proptest! {
        /// Advancing to the next occurrence is idempotent for a fixed `now`.
        #[test]
        fn next_occurrence_idempotent(
            start_offset_min in -600_000i64..600_000,
            kind_idx in 0usize..5,
        ) {
            let kinds = [
                RepeatKind::Hourly,
                RepeatKind::Daily,
                RepeatKind::Weekly,
                RepeatKind::Monthly,
                RepeatKind::Yearly,
            ];
            let kind = kinds[kind_idx];
            let now = Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap();
            let start = now + Duration::minutes(start_offset_min);

            let once = next_occurrence_at_or_after(start, kind, now);
            let twice = next_occurrence_at_or_after(once, kind, now);
            prop_assert_eq!(once, twice);
            prop_assert!(once >= now);
            prop_assert!(once >= start);
        }
    }
}
