//! Row types for schedules, events and groups, plus the read-only snapshot
//! handed to queries and the change callback.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::recurrence::RepeatKind;
use crate::state::{MarkerKind, ScheduleState};

/// A user-defined recurring ON/OFF time window.
///
/// Identity is the store-assigned id; ids are not guaranteed stable across
/// reinstalls, so callers should use `tag` to re-identify schedules. `state`
/// is `None` only before the first recompute pass has seen the schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    pub id: i64,
    pub start_time: DateTime<Utc>,
    pub duration_min: i64,
    pub repeat: RepeatKind,
    pub tag: String,
    pub state: Option<ScheduleState>,
    pub disabled: bool,
    pub group_id: Option<i64>,
}

impl Schedule {
    /// A new, not-yet-persisted schedule (id 0 until the store assigns one).
    pub fn new(
        start_time: DateTime<Utc>,
        duration_min: i64,
        repeat: RepeatKind,
        tag: impl Into<String>,
    ) -> Self {
        Self {
            id: 0,
            start_time,
            duration_min,
            repeat,
            tag: tag.into(),
            state: None,
            disabled: false,
            group_id: None,
        }
    }
}

/// A persisted marker recording the next Start or Stop transition time for
/// a schedule. An enabled schedule owns exactly two live events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub id: i64,
    pub schedule_id: i64,
    pub alarm_time: DateTime<Utc>,
    pub marker: MarkerKind,
}

impl Event {
    pub fn new(schedule_id: i64, alarm_time: DateTime<Utc>, marker: MarkerKind) -> Self {
        Self {
            id: 0,
            schedule_id,
            alarm_time,
            marker,
        }
    }
}

/// A named collection of schedules with an aggregated overall state.
///
/// Groups are created lazily the first time a schedule names a new group
/// tag. `overall_state` is derived by the batch pass, never set directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleGroup {
    pub id: i64,
    pub tag: String,
    pub enabled: bool,
    pub overall_state: ScheduleState,
}

impl ScheduleGroup {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            id: 0,
            tag: tag.into(),
            enabled: true,
            overall_state: ScheduleState::Off,
        }
    }
}

/// A (schedule, event) pair as returned by the store's joined scan.
#[derive(Debug, Clone)]
pub struct ScheduleEvent {
    pub schedule: Schedule,
    pub event: Event,
}

/// Immutable snapshot of a schedule as seen by callers.
///
/// Query operations and the change callback hand these out instead of the
/// mutable store row, so UI-side consumers cannot observe or affect
/// in-flight engine state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleSnapshot {
    pub schedule_id: i64,
    pub tag: String,
    pub start_time: DateTime<Utc>,
    pub duration_min: i64,
    pub repeat: RepeatKind,
    pub state: Option<ScheduleState>,
    pub disabled: bool,
    pub group_tag: Option<String>,
    pub group_enabled: bool,
}

impl ScheduleSnapshot {
    /// Build a snapshot from a schedule row and its (optional) group row.
    pub fn from_rows(schedule: &Schedule, group: Option<&ScheduleGroup>) -> Self {
        Self {
            schedule_id: schedule.id,
            tag: schedule.tag.clone(),
            start_time: schedule.start_time,
            duration_min: schedule.duration_min,
            repeat: schedule.repeat,
            state: schedule.state,
            disabled: schedule.disabled,
            group_tag: group.map(|g| g.tag.clone()),
            // A schedule outside any group counts as enabled.
            group_enabled: group.map(|g| g.enabled).unwrap_or(true),
        }
    }
}
