//! Batch-pass invariants, driven with fixed `now` values against the store
//! and processor directly.

use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use schedalarm_core::{
    AlarmProcessor, Event, MarkerKind, RepeatKind, Schedule, ScheduleCallback, ScheduleDb,
    ScheduleGroup, ScheduleSnapshot, ScheduleState, WakeTimer,
};

fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
}

#[derive(Default)]
struct WakeLog {
    armed: Vec<DateTime<Utc>>,
    disarmed: usize,
}

/// Wake timer whose arm/disarm log stays observable after the box moves
/// into the processor.
#[derive(Clone, Default)]
struct SharedWakeTimer(Arc<Mutex<WakeLog>>);

impl WakeTimer for SharedWakeTimer {
    fn arm(&mut self, at: DateTime<Utc>) {
        self.0.lock().unwrap().armed.push(at);
    }

    fn disarm(&mut self) {
        self.0.lock().unwrap().disarmed += 1;
    }
}

#[derive(Default)]
struct CountingCallback {
    calls: Mutex<Vec<HashMap<i64, ScheduleSnapshot>>>,
}

impl ScheduleCallback for CountingCallback {
    fn on_schedule_state_change(&self, changed: &HashMap<i64, ScheduleSnapshot>) {
        self.calls.lock().unwrap().push(changed.clone());
    }
}

fn new_processor() -> (AlarmProcessor, SharedWakeTimer) {
    let timer = SharedWakeTimer::default();
    (AlarmProcessor::new(Box::new(timer.clone())), timer)
}

/// Insert a schedule plus its Start/Stop event pair at explicit times.
fn seed_schedule(
    db: &ScheduleDb,
    tag: &str,
    start_event: DateTime<Utc>,
    duration_min: i64,
    repeat: RepeatKind,
) -> i64 {
    let schedule = Schedule::new(start_event, duration_min, repeat, tag);
    let id = db.insert_schedule(&schedule).unwrap();
    db.add_or_update_event(&Event::new(id, start_event, MarkerKind::Start))
        .unwrap();
    db.add_or_update_event(&Event::new(
        id,
        start_event + Duration::minutes(duration_min),
        MarkerKind::Stop,
    ))
    .unwrap();
    id
}

#[test]
fn pass_advances_all_expired_events_past_now() {
    let db = ScheduleDb::open_in_memory().unwrap();
    let (mut processor, _) = new_processor();

    // Both events lie days in the past.
    let id = seed_schedule(&db, "Work", utc(2024, 3, 7, 9, 0), 480, RepeatKind::Daily);

    let now = utc(2024, 3, 10, 12, 0);
    processor
        .update_schedule_states(&db, now, &HashSet::new())
        .unwrap();

    let events = db.events_for_schedule(id).unwrap();
    assert_eq!(events.len(), 2);
    for event in &events {
        assert!(event.alarm_time >= now, "event left in the past: {event:?}");
    }
    // Daily recurrence lands them on the next 9:00/17:00.
    assert_eq!(events[0].alarm_time, utc(2024, 3, 11, 9, 0));
    assert_eq!(events[1].alarm_time, utc(2024, 3, 10, 17, 0));
}

#[test]
fn expired_events_advance_even_when_state_is_unchanged() {
    let db = ScheduleDb::open_in_memory().unwrap();
    let (mut processor, _) = new_processor();

    let now = utc(2024, 3, 10, 12, 0);

    // Bracketing start event is in the future and derives OFF; the stored
    // state already matches, so the schedule is memoized as unchanged. The
    // second (stop) event is expired regardless and must still move.
    let mut schedule = Schedule::new(utc(2024, 3, 10, 22, 0), 60, RepeatKind::Daily, "Late");
    schedule.state = Some(ScheduleState::Off);
    let id = db.insert_schedule(&schedule).unwrap();
    db.add_or_update_event(&Event::new(id, utc(2024, 3, 10, 22, 0), MarkerKind::Start))
        .unwrap();
    db.add_or_update_event(&Event::new(id, utc(2024, 3, 9, 23, 0), MarkerKind::Stop))
        .unwrap();

    let changed = processor
        .update_schedule_states(&db, now, &HashSet::new())
        .unwrap();
    assert!(changed.is_empty());

    let events = db.events_for_schedule(id).unwrap();
    assert_eq!(events[1].alarm_time, utc(2024, 3, 10, 23, 0));
}

#[test]
fn second_pass_reports_no_changes() {
    let db = ScheduleDb::open_in_memory().unwrap();
    let (mut processor, _) = new_processor();
    seed_schedule(&db, "Work", utc(2024, 3, 10, 9, 0), 480, RepeatKind::Daily);

    let now = utc(2024, 3, 10, 10, 0);
    let first = processor
        .update_schedule_states(&db, now, &HashSet::new())
        .unwrap();
    assert_eq!(first.len(), 1);
    assert_eq!(
        first.values().next().unwrap().state,
        Some(ScheduleState::On)
    );

    let second = processor
        .update_schedule_states(&db, now, &HashSet::new())
        .unwrap();
    assert!(second.is_empty());
}

#[test]
fn force_notify_includes_unchanged_schedules() {
    let db = ScheduleDb::open_in_memory().unwrap();
    let (mut processor, _) = new_processor();
    let id = seed_schedule(&db, "Work", utc(2024, 3, 10, 9, 0), 480, RepeatKind::Daily);

    let now = utc(2024, 3, 10, 10, 0);
    processor
        .update_schedule_states(&db, now, &HashSet::new())
        .unwrap();

    // State is stable now; only the force set puts the id back in the map.
    let forced = processor
        .update_schedule_states(&db, now, &HashSet::from([id]))
        .unwrap();
    assert!(forced.contains_key(&id));
    assert_eq!(forced[&id].state, Some(ScheduleState::On));
}

#[test]
fn force_notify_resolves_eventless_schedules() {
    let db = ScheduleDb::open_in_memory().unwrap();
    let (mut processor, _) = new_processor();

    // A suspended schedule: row present, no events.
    let mut schedule = Schedule::new(utc(2024, 3, 10, 9, 0), 60, RepeatKind::Daily, "Idle");
    schedule.disabled = true;
    schedule.state = Some(ScheduleState::Off);
    let id = db.insert_schedule(&schedule).unwrap();

    let changed = processor
        .update_schedule_states(&db, utc(2024, 3, 10, 10, 0), &HashSet::from([id]))
        .unwrap();
    assert!(changed.contains_key(&id));
    assert!(changed[&id].disabled);
}

#[test]
fn group_state_follows_members_within_one_pass() {
    let db = ScheduleDb::open_in_memory().unwrap();
    let (mut processor, _) = new_processor();

    let mut group = ScheduleGroup::new("G");
    group.id = db.insert_group(&group).unwrap();

    // Member A: daily 9:00 + 2h window, currently open at 10:00.
    let a = seed_schedule(&db, "A", utc(2024, 3, 10, 9, 0), 120, RepeatKind::Daily);
    // Member B: opens at 22:00, closed at 10:00.
    let b = seed_schedule(&db, "B", utc(2024, 3, 10, 22, 0), 60, RepeatKind::Daily);
    for id in [a, b] {
        let mut s = db.get_schedule(id).unwrap().unwrap();
        s.group_id = Some(group.id);
        db.update_schedule(&s).unwrap();
    }

    processor
        .update_schedule_states(&db, utc(2024, 3, 10, 10, 0), &HashSet::new())
        .unwrap();
    assert_eq!(
        db.group_by_id(group.id).unwrap().unwrap().overall_state,
        ScheduleState::On
    );

    // At 12:00 the last ON member closes; the group flips in the same pass.
    processor
        .update_schedule_states(&db, utc(2024, 3, 10, 12, 0), &HashSet::new())
        .unwrap();
    assert_eq!(
        db.group_by_id(group.id).unwrap().unwrap().overall_state,
        ScheduleState::Off
    );
}

#[test]
fn disabled_members_never_hold_a_group_on() {
    let db = ScheduleDb::open_in_memory().unwrap();
    let (mut processor, _) = new_processor();

    let mut group = ScheduleGroup::new("G");
    group.id = db.insert_group(&group).unwrap();

    // Disabled member with a stale ON state and no events.
    let mut schedule = Schedule::new(utc(2024, 3, 10, 9, 0), 120, RepeatKind::Daily, "Stale");
    schedule.disabled = true;
    schedule.state = Some(ScheduleState::On);
    schedule.group_id = Some(group.id);
    db.insert_schedule(&schedule).unwrap();

    processor
        .update_schedule_states(&db, utc(2024, 3, 10, 10, 0), &HashSet::new())
        .unwrap();
    assert_eq!(
        db.group_by_id(group.id).unwrap().unwrap().overall_state,
        ScheduleState::Off
    );
}

#[test]
fn wake_timer_tracks_earliest_upcoming_event() {
    let db = ScheduleDb::open_in_memory().unwrap();
    let (mut processor, timer) = new_processor();

    seed_schedule(&db, "Late", utc(2024, 3, 10, 22, 0), 60, RepeatKind::Daily);
    let early = seed_schedule(&db, "Early", utc(2024, 3, 10, 14, 0), 60, RepeatKind::Daily);

    let now = utc(2024, 3, 10, 12, 0);
    processor
        .update_schedule_states(&db, now, &HashSet::new())
        .unwrap();

    assert_eq!(
        timer.0.lock().unwrap().armed.last().copied(),
        Some(utc(2024, 3, 10, 14, 0))
    );
    assert_eq!(processor.next_event().unwrap().schedule.id, early);

    // With every schedule gone the timer must be released, not left armed.
    db.delete_schedule(early).unwrap();
    db.delete_schedules_by_tag("Late").unwrap();
    processor
        .update_schedule_states(&db, now, &HashSet::new())
        .unwrap();
    assert_eq!(timer.0.lock().unwrap().disarmed, 1);
    assert!(processor.next_event().is_none());
}

#[test]
fn callback_fires_once_per_open_pass_and_never_while_suspended() {
    let db = ScheduleDb::open_in_memory().unwrap();
    let (mut processor, _) = new_processor();
    let callback = Arc::new(CountingCallback::default());
    processor.set_callback(callback.clone(), false).unwrap();

    let now = utc(2024, 3, 10, 10, 0);

    // An empty store still produces exactly one (empty) notification.
    processor
        .update_schedule_states(&db, now, &HashSet::new())
        .unwrap();
    assert_eq!(callback.calls.lock().unwrap().len(), 1);
    assert!(callback.calls.lock().unwrap()[0].is_empty());

    processor.suspend_callbacks();
    seed_schedule(&db, "Work", utc(2024, 3, 10, 9, 0), 480, RepeatKind::Daily);
    processor
        .update_schedule_states(&db, now, &HashSet::new())
        .unwrap();
    assert_eq!(callback.calls.lock().unwrap().len(), 1);

    processor.resume_callbacks();
    processor
        .update_schedule_states(&db, now, &HashSet::new())
        .unwrap();
    assert_eq!(callback.calls.lock().unwrap().len(), 2);
}

#[test]
fn hourly_window_cycles_on_and_off() {
    let db = ScheduleDb::open_in_memory().unwrap();
    let (mut processor, _) = new_processor();
    let id = seed_schedule(&db, "Pump", utc(2024, 3, 10, 9, 0), 20, RepeatKind::Hourly);

    // Ten minutes in: open.
    let changed = processor
        .update_schedule_states(&db, utc(2024, 3, 10, 9, 10), &HashSet::new())
        .unwrap();
    assert_eq!(changed[&id].state, Some(ScheduleState::On));

    // Forty minutes in: closed.
    let changed = processor
        .update_schedule_states(&db, utc(2024, 3, 10, 9, 40), &HashSet::new())
        .unwrap();
    assert_eq!(changed[&id].state, Some(ScheduleState::Off));

    // Ten minutes into the next hour: open again.
    let changed = processor
        .update_schedule_states(&db, utc(2024, 3, 10, 10, 10), &HashSet::new())
        .unwrap();
    assert_eq!(changed[&id].state, Some(ScheduleState::On));
}
