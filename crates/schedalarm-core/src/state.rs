//! Current ON/OFF state derivation for a schedule.
//!
//! A schedule's state is derived from the single event currently bracketing
//! it: the event's alarm time, its marker kind, the schedule's repeat kind
//! and its duration. The function is pure -- same inputs, same state -- so
//! tests can pin behavior against fixed `now` values.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::recurrence::{advance_one_unit, Direction, RepeatKind};

/// Whether an event marks the opening or the closing of a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkerKind {
    Start,
    Stop,
}

impl MarkerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarkerKind::Start => "START",
            MarkerKind::Stop => "STOP",
        }
    }
}

impl FromStr for MarkerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "START" => Ok(MarkerKind::Start),
            "STOP" => Ok(MarkerKind::Stop),
            other => Err(format!("unknown marker kind: {other}")),
        }
    }
}

/// A schedule's window state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ScheduleState {
    On,
    Off,
}

impl ScheduleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleState::On => "ON",
            ScheduleState::Off => "OFF",
        }
    }
}

impl fmt::Display for ScheduleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScheduleState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ON" => Ok(ScheduleState::On),
            "OFF" => Ok(ScheduleState::Off),
            other => Err(format!("unknown schedule state: {other}")),
        }
    }
}

/// Derive the current state of a schedule from its bracketing event.
///
/// The two marker branches are intentionally asymmetric, replicated exactly
/// from the reference behavior:
///
/// - `Stop`: with `diff = alarm_time - now`, the schedule is OFF when
///   `diff <= 0` or `diff` exceeds the duration; otherwise ON. The `diff == 0`
///   instant is OFF and `diff == duration` is still ON.
/// - `Start`: the previous window opening is one recurrence unit before
///   `alarm_time`; the schedule is OFF once `now - prev_start` reaches the
///   duration, otherwise ON.
pub fn derive_state(
    marker: MarkerKind,
    alarm_time: DateTime<Utc>,
    repeat: RepeatKind,
    duration_min: i64,
    now: DateTime<Utc>,
) -> ScheduleState {
    let duration_secs = duration_min * 60;

    match marker {
        MarkerKind::Stop => {
            let diff_secs = (alarm_time - now).num_seconds();
            if diff_secs <= 0 || diff_secs > duration_secs {
                ScheduleState::Off
            } else {
                ScheduleState::On
            }
        }
        MarkerKind::Start => {
            let prev_start = advance_one_unit(alarm_time, repeat, Direction::Backward);
            if (now - prev_start).num_seconds() >= duration_secs {
                ScheduleState::Off
            } else {
                ScheduleState::On
            }
        }
    }
}
