//! The batch recomputation pass over all schedules.
//!
//! One pass advances every expired event to its next occurrence, re-derives
//! each schedule's ON/OFF state, folds group aggregates, picks the single
//! next wake-up time and delivers one coalesced change notification. The
//! coordinator calls this after every mutation; the wake timer calls it when
//! it fires.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

use crate::error::{CoreError, ValidationError};
use crate::gate::CallbackGate;
use crate::model::{Schedule, ScheduleEvent, ScheduleGroup, ScheduleSnapshot};
use crate::recurrence::next_occurrence_at_or_after;
use crate::state::{derive_state, ScheduleState};
use crate::storage::ScheduleDb;
use crate::wake::WakeTimer;

/// The registered change sink.
///
/// Invoked at most once per recompute pass with every schedule that changed
/// (or was force-notified) in that pass. Implementations must not assume
/// delivery on any particular thread, nor synchronously with the operation
/// that produced the change. Delivery is one-way: implementations must not
/// panic, and nothing is redelivered.
pub trait ScheduleCallback: Send + Sync {
    fn on_schedule_state_change(&self, changed: &HashMap<i64, ScheduleSnapshot>);
}

/// Batch recomputation engine.
///
/// Owns the callback registration, the suspend gate and the wake-timer
/// handle. The store is borrowed per pass -- the coordinator remains its
/// single owner.
pub struct AlarmProcessor {
    callback: Option<Arc<dyn ScheduleCallback>>,
    gate: CallbackGate,
    wake_timer: Box<dyn WakeTimer>,
    next_event: Option<ScheduleEvent>,
}

impl AlarmProcessor {
    pub fn new(wake_timer: Box<dyn WakeTimer>) -> Self {
        Self {
            callback: None,
            gate: CallbackGate::new(),
            wake_timer,
            next_event: None,
        }
    }

    /// Register the change callback.
    ///
    /// Registration is set-once: a second registration fails unless
    /// `replace` is true.
    pub fn set_callback(
        &mut self,
        callback: Arc<dyn ScheduleCallback>,
        replace: bool,
    ) -> Result<(), ValidationError> {
        if self.callback.is_some() && !replace {
            return Err(ValidationError::CallbackAlreadySet);
        }
        self.callback = Some(callback);
        Ok(())
    }

    pub fn has_callback(&self) -> bool {
        self.callback.is_some()
    }

    /// Close the callback gate (reference counted).
    pub fn suspend_callbacks(&mut self) {
        self.gate.suspend();
    }

    /// Reopen the callback gate (reference counted).
    pub fn resume_callbacks(&mut self) {
        self.gate.resume();
    }

    pub fn callbacks_suspended(&self) -> bool {
        !self.gate.is_open()
    }

    /// The (schedule, event) pair the wake timer is currently armed for.
    pub fn next_event(&self) -> Option<&ScheduleEvent> {
        self.next_event.as_ref()
    }

    /// Recompute the state of every schedule in one pass.
    ///
    /// Scans the store's joined rows in event-id order, so the first row
    /// seen for a schedule is its bracketing event:
    ///
    /// 1. every expired event is advanced to its next occurrence and
    ///    persisted -- unconditionally, so both of a schedule's events are
    ///    at or after `now` when the pass completes;
    /// 2. state is derived once per schedule from its bracketing event and
    ///    persisted only when it differs from the stored state (or the id
    ///    is force-notified);
    /// 3. ids in `force_notify` always end up in the returned changed set,
    ///    re-read from the store when their derived state did not flip;
    /// 4. every group's overall state is recomputed and persisted;
    /// 5. the wake timer is armed for the earliest upcoming event, or
    ///    disarmed when none exists;
    /// 6. if the gate is open, the registered callback receives the changed
    ///    set exactly once (possibly empty). While suspended nothing is
    ///    queued; the next open pass recomputes from current truth.
    ///
    /// Steps 1-4 run inside a single store transaction.
    pub fn update_schedule_states(
        &mut self,
        db: &ScheduleDb,
        now: DateTime<Utc>,
        force_notify: &HashSet<i64>,
    ) -> Result<HashMap<i64, ScheduleSnapshot>, CoreError> {
        let (changed, groups) = db.with_transaction(|db| {
            let mut changed: HashMap<i64, Schedule> = HashMap::new();
            let mut not_changed: HashSet<i64> = HashSet::new();

            for row in db.schedule_events()? {
                let schedule = row.schedule;
                let mut event = row.event;

                // Keep events pointing at the next real transition.
                if event.alarm_time <= now {
                    event.alarm_time =
                        next_occurrence_at_or_after(event.alarm_time, schedule.repeat, now);
                    db.add_or_update_event(&event)?;
                }

                // One state derivation per schedule per pass.
                if not_changed.contains(&schedule.id) || changed.contains_key(&schedule.id) {
                    continue;
                }

                let curr = derive_state(
                    event.marker,
                    event.alarm_time,
                    schedule.repeat,
                    schedule.duration_min,
                    now,
                );

                if schedule.state == Some(curr) && !force_notify.contains(&schedule.id) {
                    not_changed.insert(schedule.id);
                } else {
                    db.set_schedule_state(schedule.id, curr)?;
                    let mut updated = schedule;
                    updated.state = Some(curr);
                    changed.insert(updated.id, updated);
                }
            }

            // Force-notify is a guarantee, not a hint: explicit mutations
            // must surface even when the derived state did not flip.
            for &schedule_id in force_notify {
                if !changed.contains_key(&schedule_id) {
                    if let Some(schedule) = db.get_schedule(schedule_id)? {
                        changed.insert(schedule_id, schedule);
                    }
                }
            }

            let groups = update_group_states(db)?;
            Ok((changed, groups))
        })?;

        // Arm the wake timer for the globally earliest upcoming event.
        self.next_event = db.next_event(now)?;
        match &self.next_event {
            Some(next) => self.wake_timer.arm(next.event.alarm_time),
            None => self.wake_timer.disarm(),
        }

        let snapshots: HashMap<i64, ScheduleSnapshot> = changed
            .values()
            .map(|schedule| {
                let group = schedule.group_id.and_then(|gid| groups.get(&gid));
                (schedule.id, ScheduleSnapshot::from_rows(schedule, group))
            })
            .collect();

        debug!(
            changed = snapshots.len(),
            suspended = self.callbacks_suspended(),
            "schedule state pass complete"
        );

        if self.gate.is_open() {
            if let Some(callback) = &self.callback {
                callback.on_schedule_state_change(&snapshots);
            }
        }

        Ok(snapshots)
    }
}

/// Fold every group's members into its overall state and persist it.
///
/// OFF by default; ON as soon as any member with `disabled == false` is ON.
/// Runs unconditionally each pass since membership and states can change
/// independently of notification suppression.
fn update_group_states(db: &ScheduleDb) -> Result<HashMap<i64, ScheduleGroup>, rusqlite::Error> {
    let mut groups = HashMap::new();

    for mut group in db.all_groups()? {
        let members = db.schedules_by_group(group.id)?;
        let overall = members
            .iter()
            .any(|m| !m.disabled && m.state == Some(ScheduleState::On));

        group.overall_state = if overall {
            ScheduleState::On
        } else {
            ScheduleState::Off
        };
        db.update_group(&group)?;
        groups.insert(group.id, group);
    }

    Ok(groups)
}
