//! The public coordinator API.
//!
//! One `ScheduleManager` owns one store handle and one wake-timer handle,
//! both passed in at construction -- there is no process-wide singleton.
//! Every mutating operation validates its arguments, applies its writes
//! transactionally and finishes with a recompute pass so callers always
//! observe durable, consistent state.

use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::info;

use crate::error::{CoreError, Result, ValidationError};
use crate::model::{Event, Schedule, ScheduleGroup, ScheduleSnapshot};
use crate::processor::{AlarmProcessor, ScheduleCallback};
use crate::recurrence::{next_occurrence_at_or_after, span_duration_min, RepeatKind};
use crate::state::{MarkerKind, ScheduleState};
use crate::storage::ScheduleDb;
use crate::wake::WakeTimer;

/// Coordinator for recurring ON/OFF schedules.
///
/// Construct with [`ScheduleManager::new`], then call [`init`](Self::init)
/// before anything else; operations fail with
/// [`CoreError::NotInitialized`] until the initial recompute pass has run.
pub struct ScheduleManager {
    db: ScheduleDb,
    processor: AlarmProcessor,
    initialized: bool,
}

impl ScheduleManager {
    /// Create a manager owning `db` and driving `wake_timer`.
    pub fn new(db: ScheduleDb, wake_timer: Box<dyn WakeTimer>) -> Self {
        Self {
            db,
            processor: AlarmProcessor::new(wake_timer),
            initialized: false,
        }
    }

    /// Run the initial recompute pass and mark the manager ready.
    ///
    /// Brings persisted schedules current after a process restart: expired
    /// events are advanced, states re-derived and the wake timer armed.
    pub fn init(&mut self) -> Result<()> {
        self.processor
            .update_schedule_states(&self.db, Utc::now(), &HashSet::new())?;
        self.initialized = true;
        Ok(())
    }

    fn ensure_initialized(&self) -> Result<()> {
        if self.initialized {
            Ok(())
        } else {
            Err(CoreError::NotInitialized)
        }
    }

    // ── Callback registration and gating ─────────────────────────────

    /// Register the change callback.
    ///
    /// Set-once: fails with `InvalidArgument` unless `replace` is true.
    /// The callback must be treated as firing on an arbitrary thread.
    pub fn set_callback(&mut self, callback: Arc<dyn ScheduleCallback>, replace: bool) -> Result<()> {
        self.processor.set_callback(callback, replace)?;
        Ok(())
    }

    /// Suspend change callbacks (reference counted).
    pub fn suspend_callbacks(&mut self) {
        self.processor.suspend_callbacks();
    }

    /// Resume change callbacks (reference counted).
    pub fn resume_callbacks(&mut self) {
        self.processor.resume_callbacks();
    }

    // ── Schedule operations ──────────────────────────────────────────

    /// Add a schedule and return its store-assigned id.
    ///
    /// Ids are not guaranteed stable across reinstalls; use the tag to
    /// re-identify schedules. `group_tag` lazily creates the group on first
    /// use. The start time may lie in the past (the event pair is advanced
    /// to the next occurrence), but not more than 24 hours.
    pub fn add_schedule(
        &mut self,
        start_time: DateTime<Utc>,
        duration_min: i64,
        repeat: RepeatKind,
        tag: &str,
        group_tag: Option<&str>,
    ) -> Result<i64> {
        self.ensure_initialized()?;
        let now = Utc::now();
        validate_schedule_args(start_time, duration_min, repeat, tag, now)?;

        let group_id = match group_tag.filter(|t| !t.is_empty()) {
            Some(tag) => Some(self.resolve_or_create_group(tag)?),
            None => None,
        };

        let mut schedule = Schedule::new(start_time, duration_min, repeat, tag);
        schedule.group_id = group_id;

        let schedule_id = self.db.with_transaction(|db| {
            let id = db.insert_schedule(&schedule)?;
            add_event_pair(db, id, start_time, duration_min, repeat, now)?;
            Ok(id)
        })?;

        info!(schedule_id, tag, "schedule added");
        self.run_pass(&HashSet::from([schedule_id]))?;
        Ok(schedule_id)
    }

    /// Replace a schedule's start time and duration.
    ///
    /// Repeat kind, tag, group and the disabled flag are preserved. The
    /// event pair is regenerated -- unless the schedule is disabled, which
    /// keeps it at zero events.
    pub fn update_schedule(
        &mut self,
        schedule_id: i64,
        start_time: DateTime<Utc>,
        duration_min: i64,
    ) -> Result<i64> {
        self.ensure_initialized()?;
        let mut schedule = self.get_existing_schedule(schedule_id)?;
        let now = Utc::now();
        validate_schedule_args(start_time, duration_min, schedule.repeat, &schedule.tag, now)?;

        schedule.start_time = start_time;
        schedule.duration_min = duration_min;

        self.db.with_transaction(|db| {
            db.delete_events_for_schedule(schedule_id)?;
            db.update_schedule(&schedule)?;
            if !schedule.disabled {
                add_event_pair(db, schedule_id, start_time, duration_min, schedule.repeat, now)?;
            }
            Ok(())
        })?;

        self.run_pass(&HashSet::from([schedule_id]))?;
        Ok(schedule_id)
    }

    /// Re-activate a schedule: clear its disabled flag and regenerate its
    /// event pair from the stored start/duration/repeat.
    ///
    /// The internal clear-then-recreate runs with callbacks suspended so
    /// only the final pass notifies.
    pub fn enable_schedule(&mut self, schedule_id: i64) -> Result<()> {
        self.ensure_initialized()?;
        let schedule = self.get_existing_schedule(schedule_id)?;

        // Drop any existing events first; the intermediate pass must not
        // emit a spurious callback.
        self.processor.suspend_callbacks();
        let cleared = self.clear_schedule_events(schedule_id, false);
        self.processor.resume_callbacks();
        cleared?;

        let now = Utc::now();
        self.db.with_transaction(|db| {
            db.set_schedule_disabled(schedule_id, false)?;
            add_event_pair(
                db,
                schedule_id,
                schedule.start_time,
                schedule.duration_min,
                schedule.repeat,
                now,
            )?;
            Ok(())
        })?;

        info!(schedule_id, "schedule enabled");
        self.run_pass(&HashSet::from([schedule_id]))?;
        Ok(())
    }

    /// Suspend a schedule: set its disabled flag and delete its events, so
    /// it no longer participates in recomputation or wake-time selection.
    /// Like enable, the inner clear runs with callbacks suspended.
    pub fn disable_schedule(&mut self, schedule_id: i64) -> Result<()> {
        self.ensure_initialized()?;
        self.get_existing_schedule(schedule_id)?;

        self.processor.suspend_callbacks();
        let cleared = self.clear_schedule_events(schedule_id, true);
        self.processor.resume_callbacks();
        cleared?;

        info!(schedule_id, "schedule disabled");
        self.run_pass(&HashSet::from([schedule_id]))?;
        Ok(())
    }

    /// Delete a schedule; its events cascade. The recompute pass still runs
    /// so group aggregates and the wake timer reflect the removal.
    pub fn cancel_schedule(&mut self, schedule_id: i64) -> Result<()> {
        self.ensure_initialized()?;
        if !self.db.delete_schedule(schedule_id)? {
            return Err(not_found_schedule(schedule_id));
        }
        info!(schedule_id, "schedule cancelled");
        self.run_pass(&HashSet::new())?;
        Ok(())
    }

    /// Delete every schedule matching `tag`. Returns the number deleted.
    pub fn cancel_schedules_by_tag(&mut self, tag: &str) -> Result<usize> {
        self.ensure_initialized()?;
        let deleted = self.db.delete_schedules_by_tag(tag)?;
        info!(tag, deleted, "schedules cancelled by tag");
        self.run_pass(&HashSet::new())?;
        Ok(deleted)
    }

    // ── Group operations ─────────────────────────────────────────────

    /// Suspend every member of a group in one transaction.
    ///
    /// Member events are deleted and member states set to OFF, but each
    /// member's individual disabled flag is left untouched -- group
    /// suspension is not individual suspension.
    pub fn disable_schedule_group(&mut self, group_tag: &str) -> Result<()> {
        self.ensure_initialized()?;
        let mut group = self.get_existing_group(group_tag)?;
        let members = self.db.schedules_by_group(group.id)?;
        let member_ids: HashSet<i64> = members.iter().map(|m| m.id).collect();

        group.enabled = false;
        self.db.with_transaction(|db| {
            for member in &members {
                db.delete_events_for_schedule(member.id)?;
                db.set_schedule_state(member.id, ScheduleState::Off)?;
            }
            db.update_group(&group)?;
            Ok(())
        })?;

        info!(group_tag, members = members.len(), "schedule group disabled");
        self.run_pass(&member_ids)?;
        Ok(())
    }

    /// Re-activate a group in one transaction.
    ///
    /// Only members whose individual disabled flag is false get their event
    /// pair regenerated; a member explicitly disabled before the group was
    /// suspended stays disabled.
    pub fn enable_schedule_group(&mut self, group_tag: &str) -> Result<()> {
        self.ensure_initialized()?;
        let mut group = self.get_existing_group(group_tag)?;
        let members = self.db.schedules_by_group(group.id)?;
        let member_ids: HashSet<i64> = members.iter().map(|m| m.id).collect();

        let now = Utc::now();
        group.enabled = true;
        self.db.with_transaction(|db| {
            db.update_group(&group)?;
            for member in &members {
                if member.disabled {
                    continue;
                }
                db.delete_events_for_schedule(member.id)?;
                add_event_pair(
                    db,
                    member.id,
                    member.start_time,
                    member.duration_min,
                    member.repeat,
                    now,
                )?;
            }
            Ok(())
        })?;

        info!(group_tag, members = members.len(), "schedule group enabled");
        self.run_pass(&member_ids)?;
        Ok(())
    }

    /// Delete a group and all of its member schedules. Returns the number
    /// of schedules deleted.
    pub fn cancel_schedule_group(&mut self, group_tag: &str) -> Result<usize> {
        self.ensure_initialized()?;
        let group = self.get_existing_group(group_tag)?;

        let deleted = self.db.with_transaction(|db| {
            let deleted = db.delete_schedules_by_group(group.id)?;
            db.delete_group(group.id)?;
            Ok(deleted)
        })?;

        info!(group_tag, deleted, "schedule group cancelled");
        self.run_pass(&HashSet::new())?;
        Ok(deleted)
    }

    // ── Queries ──────────────────────────────────────────────────────

    /// Snapshots of all schedules, or of those matching `tag`.
    pub fn get_schedule_states(&self, tag: Option<&str>) -> Result<Vec<ScheduleSnapshot>> {
        self.ensure_initialized()?;
        let schedules = match tag.filter(|t| !t.is_empty()) {
            Some(tag) => self.db.schedules_by_tag(tag)?,
            None => self.db.all_schedules()?,
        };
        self.snapshots_for(schedules)
    }

    /// Snapshots of the schedules belonging to a group.
    pub fn get_schedule_states_by_group_tag(&self, group_tag: &str) -> Result<Vec<ScheduleSnapshot>> {
        self.ensure_initialized()?;
        let group = self.get_existing_group(group_tag)?;
        let members = self.db.schedules_by_group(group.id)?;
        self.snapshots_for(members)
    }

    /// Read-only fetch of a group row, current overall state included.
    pub fn schedule_group(&self, group_tag: &str) -> Result<Option<ScheduleGroup>> {
        self.ensure_initialized()?;
        Ok(self.db.group_by_tag(group_tag)?)
    }

    /// Normalize an arbitrary start/end pair into a duration within one
    /// recurrence unit (minutes). Monthly and Yearly use nominal unit
    /// lengths and are approximate.
    pub fn get_duration(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        repeat: RepeatKind,
    ) -> i64 {
        span_duration_min(start, end, repeat)
    }

    /// Recompute all schedule states without a triggering mutation.
    ///
    /// This is the wake-timer firing contract: the timer (or any poller)
    /// calls this, and the pass re-arms the timer for the new next time.
    pub fn refresh_schedule_states(&mut self) -> Result<HashMap<i64, ScheduleSnapshot>> {
        self.ensure_initialized()?;
        self.run_pass(&HashSet::new())
    }

    /// When the wake timer is next due to fire, if any schedule is enabled.
    pub fn next_wake_time(&self) -> Option<DateTime<Utc>> {
        self.processor.next_event().map(|next| next.event.alarm_time)
    }

    /// The earliest upcoming transition among one group's schedules.
    pub fn next_wake_time_for_group(&self, group_tag: &str) -> Result<Option<DateTime<Utc>>> {
        self.ensure_initialized()?;
        let group = self.get_existing_group(group_tag)?;
        let next = self.db.next_event_for_group(Utc::now(), group.id)?;
        Ok(next.map(|se| se.event.alarm_time))
    }

    /// Snapshot of the schedule owning the next wake-up transition.
    pub fn schedule_for_next_wake(&self) -> Result<Option<ScheduleSnapshot>> {
        match self.processor.next_event() {
            Some(next) => {
                let group = match next.schedule.group_id {
                    Some(gid) => self.db.group_by_id(gid)?,
                    None => None,
                };
                Ok(Some(ScheduleSnapshot::from_rows(
                    &next.schedule,
                    group.as_ref(),
                )))
            }
            None => Ok(None),
        }
    }

    // ── Internal helpers ─────────────────────────────────────────────

    fn run_pass(&mut self, force_notify: &HashSet<i64>) -> Result<HashMap<i64, ScheduleSnapshot>> {
        self.processor
            .update_schedule_states(&self.db, Utc::now(), force_notify)
    }

    fn get_existing_schedule(&self, schedule_id: i64) -> Result<Schedule> {
        self.db
            .get_schedule(schedule_id)?
            .ok_or_else(|| not_found_schedule(schedule_id))
    }

    fn get_existing_group(&self, group_tag: &str) -> Result<ScheduleGroup> {
        self.db.group_by_tag(group_tag)?.ok_or(CoreError::NotFound {
            kind: "schedule group",
            key: group_tag.to_string(),
        })
    }

    fn resolve_or_create_group(&self, group_tag: &str) -> Result<i64> {
        if let Some(group) = self.db.group_by_tag(group_tag)? {
            return Ok(group.id);
        }
        let id = self.db.insert_group(&ScheduleGroup::new(group_tag))?;
        info!(group_tag, group_id = id, "schedule group created");
        Ok(id)
    }

    /// Delete a schedule's events (and optionally mark it disabled), then
    /// recompute. The inner pass carries no force set; callers decide how
    /// the change surfaces.
    fn clear_schedule_events(&mut self, schedule_id: i64, mark_disabled: bool) -> Result<()> {
        self.db.with_transaction(|db| {
            db.delete_events_for_schedule(schedule_id)?;
            if mark_disabled {
                db.set_schedule_disabled(schedule_id, true)?;
            }
            Ok(())
        })?;
        self.run_pass(&HashSet::new())?;
        Ok(())
    }

    fn snapshots_for(&self, schedules: Vec<Schedule>) -> Result<Vec<ScheduleSnapshot>> {
        let groups: HashMap<i64, ScheduleGroup> = self
            .db
            .all_groups()?
            .into_iter()
            .map(|g| (g.id, g))
            .collect();

        Ok(schedules
            .iter()
            .map(|s| {
                let group = s.group_id.and_then(|gid| groups.get(&gid));
                ScheduleSnapshot::from_rows(s, group)
            })
            .collect())
    }
}

fn not_found_schedule(schedule_id: i64) -> CoreError {
    CoreError::NotFound {
        kind: "schedule",
        key: schedule_id.to_string(),
    }
}

/// Shared validation for add/update.
fn validate_schedule_args(
    start_time: DateTime<Utc>,
    duration_min: i64,
    repeat: RepeatKind,
    tag: &str,
    now: DateTime<Utc>,
) -> Result<(), ValidationError> {
    if duration_min <= 0 {
        return Err(ValidationError::NonPositiveDuration(duration_min));
    }
    repeat.validate()?;
    if tag.is_empty() {
        return Err(ValidationError::EmptyTag);
    }
    if now - start_time > Duration::hours(24) {
        return Err(ValidationError::StartTooOld(start_time));
    }
    Ok(())
}

/// Insert the Start/Stop event pair for a schedule.
///
/// The start event lands on the next occurrence of `start_time` at or after
/// `now`; the stop event follows one duration later. Caller is responsible
/// for running this inside a transaction.
fn add_event_pair(
    db: &ScheduleDb,
    schedule_id: i64,
    start_time: DateTime<Utc>,
    duration_min: i64,
    repeat: RepeatKind,
    now: DateTime<Utc>,
) -> Result<(), rusqlite::Error> {
    let first_start = next_occurrence_at_or_after(start_time, repeat, now);
    db.add_or_update_event(&Event::new(schedule_id, first_start, MarkerKind::Start))?;
    db.add_or_update_event(&Event::new(
        schedule_id,
        first_start + Duration::minutes(duration_min),
        MarkerKind::Stop,
    ))?;
    Ok(())
}
