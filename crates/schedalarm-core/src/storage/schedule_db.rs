//! SQLite-based storage for schedules, events and schedule groups.
//!
//! Timestamps are persisted as epoch seconds; sub-second precision is
//! discarded on write. Event rows cascade when their schedule is deleted.

use chrono::{DateTime, Utc};
use indoc::indoc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};

use super::{data_dir, migrations};
use crate::error::StorageError;
use crate::model::{Event, Schedule, ScheduleEvent, ScheduleGroup};
use crate::recurrence::RepeatKind;
use crate::state::{MarkerKind, ScheduleState};

// === Helper Functions ===

/// Epoch seconds for storage.
fn to_ts(time: DateTime<Utc>) -> i64 {
    time.timestamp()
}

/// Parse epoch seconds from storage with fallback to the current time.
fn from_ts(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_else(Utc::now)
}

/// Parse a repeat kind from its database string.
fn parse_repeat_kind(s: &str) -> RepeatKind {
    s.parse().unwrap_or(RepeatKind::Daily)
}

/// Parse a marker kind from its database string.
fn parse_marker_kind(s: &str) -> MarkerKind {
    s.parse().unwrap_or(MarkerKind::Start)
}

/// Parse an optional schedule state from its database string.
fn parse_state(s: Option<String>) -> Option<ScheduleState> {
    s.and_then(|s| s.parse().ok())
}

/// Build a Schedule from a row laid out as
/// (id, start_time, duration, repeat_kind, tag, state, disabled, group_id).
fn row_to_schedule(row: &rusqlite::Row) -> Result<Schedule, rusqlite::Error> {
    let repeat_str: String = row.get(3)?;
    let state_str: Option<String> = row.get(5)?;
    Ok(Schedule {
        id: row.get(0)?,
        start_time: from_ts(row.get(1)?),
        duration_min: row.get(2)?,
        repeat: parse_repeat_kind(&repeat_str),
        tag: row.get(4)?,
        state: parse_state(state_str),
        disabled: row.get::<_, i64>(6)? != 0,
        group_id: row.get(7)?,
    })
}

/// Build a joined (schedule, event) pair from a scan row laid out as
/// (event.id, event.schedule_id, event.alarm_time, event.marker,
///  schedule columns...).
fn row_to_schedule_event(row: &rusqlite::Row) -> Result<ScheduleEvent, rusqlite::Error> {
    let marker_str: String = row.get(3)?;
    let event = Event {
        id: row.get(0)?,
        schedule_id: row.get(1)?,
        alarm_time: from_ts(row.get(2)?),
        marker: parse_marker_kind(&marker_str),
    };

    let repeat_str: String = row.get(7)?;
    let state_str: Option<String> = row.get(9)?;
    let schedule = Schedule {
        id: row.get(1)?,
        start_time: from_ts(row.get(4)?),
        duration_min: row.get(5)?,
        repeat: parse_repeat_kind(&repeat_str),
        tag: row.get(6)?,
        state: parse_state(state_str),
        disabled: row.get::<_, i64>(8)? != 0,
        group_id: row.get(10)?,
    };

    Ok(ScheduleEvent { schedule, event })
}

const SCHEDULE_EVENT_COLUMNS: &str =
    "event.id, event.schedule_id, event.alarm_time, event.marker, \
     schedule.start_time, schedule.duration, schedule.tag, schedule.repeat_kind, \
     schedule.disabled, schedule.state, schedule.group_id";

/// SQLite database holding schedule, event and group rows.
pub struct ScheduleDb {
    conn: Connection,
}

impl ScheduleDb {
    /// Open the database at `~/.config/schedalarm/schedalarm.db`.
    ///
    /// Creates tables if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open_default() -> Result<Self, StorageError> {
        let path = data_dir()?.join("schedalarm.db");
        Self::open(&path)
    }

    /// Open the database at an explicit path.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let conn = Connection::open(path).map_err(|source| StorageError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_connection(conn)
    }

    /// Open an in-memory database, for tests and ephemeral embedders.
    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory().map_err(|source| StorageError::OpenFailed {
            path: PathBuf::from(":memory:"),
            source,
        })?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, StorageError> {
        // Wait out concurrent writers instead of failing with SQLITE_BUSY.
        conn.busy_timeout(std::time::Duration::from_secs(5))
            .map_err(StorageError::from)?;
        let db = Self { conn };
        db.migrate()
            .map_err(|e| StorageError::MigrationFailed(e.to_string()))?;
        Ok(db)
    }

    fn migrate(&self) -> Result<(), rusqlite::Error> {
        self.conn.execute_batch(indoc! {"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS schedulegroup (
                id            INTEGER PRIMARY KEY AUTOINCREMENT,
                tag           TEXT NOT NULL UNIQUE,
                enabled       INTEGER NOT NULL DEFAULT 1,
                overall_state TEXT NOT NULL DEFAULT 'OFF'
            );

            CREATE TABLE IF NOT EXISTS schedule (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                start_time  INTEGER NOT NULL,
                duration    INTEGER NOT NULL,
                repeat_kind TEXT NOT NULL,
                tag         TEXT NOT NULL,
                state       TEXT,
                disabled    INTEGER NOT NULL DEFAULT 0,
                group_id    INTEGER REFERENCES schedulegroup(id)
            );

            CREATE TABLE IF NOT EXISTS event (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                schedule_id INTEGER NOT NULL REFERENCES schedule(id) ON DELETE CASCADE,
                alarm_time  INTEGER NOT NULL,
                marker      TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_event_alarm_time ON event(alarm_time);
            CREATE INDEX IF NOT EXISTS idx_schedule_tag ON schedule(tag);
        "})?;

        migrations::migrate(&self.conn)?;
        Ok(())
    }

    /// Run `f` inside a single `BEGIN IMMEDIATE` transaction.
    ///
    /// Any error rolls the whole transaction back, so multi-row writes
    /// (schedule plus its event pair, bulk group operations) are
    /// all-or-nothing.
    pub fn with_transaction<T>(
        &self,
        f: impl FnOnce(&Self) -> Result<T, rusqlite::Error>,
    ) -> Result<T, rusqlite::Error> {
        self.conn.execute_batch("BEGIN IMMEDIATE TRANSACTION;")?;
        match f(self) {
            Ok(value) => {
                self.conn.execute_batch("COMMIT;")?;
                Ok(value)
            }
            Err(err) => {
                let _ = self.conn.execute_batch("ROLLBACK;");
                Err(err)
            }
        }
    }

    // === Schedule CRUD ===

    /// Insert a new schedule and return its store-assigned id.
    pub fn insert_schedule(&self, schedule: &Schedule) -> Result<i64, rusqlite::Error> {
        self.conn.execute(
            "INSERT INTO schedule (start_time, duration, repeat_kind, tag, state, disabled, group_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                to_ts(schedule.start_time),
                schedule.duration_min,
                schedule.repeat.as_str(),
                schedule.tag,
                schedule.state.map(|s| s.as_str()),
                schedule.disabled as i64,
                schedule.group_id,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Update an existing schedule row in full.
    pub fn update_schedule(&self, schedule: &Schedule) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "UPDATE schedule
             SET start_time = ?1, duration = ?2, repeat_kind = ?3, tag = ?4,
                 state = ?5, disabled = ?6, group_id = ?7
             WHERE id = ?8",
            params![
                to_ts(schedule.start_time),
                schedule.duration_min,
                schedule.repeat.as_str(),
                schedule.tag,
                schedule.state.map(|s| s.as_str()),
                schedule.disabled as i64,
                schedule.group_id,
                schedule.id,
            ],
        )?;
        Ok(())
    }

    /// Persist just the derived state of a schedule.
    pub fn set_schedule_state(
        &self,
        schedule_id: i64,
        state: ScheduleState,
    ) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "UPDATE schedule SET state = ?1 WHERE id = ?2",
            params![state.as_str(), schedule_id],
        )?;
        Ok(())
    }

    /// Persist the disabled flag of a schedule.
    pub fn set_schedule_disabled(
        &self,
        schedule_id: i64,
        disabled: bool,
    ) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "UPDATE schedule SET disabled = ?1 WHERE id = ?2",
            params![disabled as i64, schedule_id],
        )?;
        Ok(())
    }

    /// Get a schedule by id.
    pub fn get_schedule(&self, id: i64) -> Result<Option<Schedule>, rusqlite::Error> {
        self.conn
            .query_row(
                "SELECT id, start_time, duration, repeat_kind, tag, state, disabled, group_id
                 FROM schedule WHERE id = ?1",
                params![id],
                |row| row_to_schedule(row),
            )
            .optional()
    }

    /// List all schedules.
    pub fn all_schedules(&self) -> Result<Vec<Schedule>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(
            "SELECT id, start_time, duration, repeat_kind, tag, state, disabled, group_id
             FROM schedule ORDER BY id",
        )?;
        let rows = stmt.query_map([], |row| row_to_schedule(row))?;
        rows.collect()
    }

    /// List schedules matching a tag.
    pub fn schedules_by_tag(&self, tag: &str) -> Result<Vec<Schedule>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(
            "SELECT id, start_time, duration, repeat_kind, tag, state, disabled, group_id
             FROM schedule WHERE tag = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![tag], |row| row_to_schedule(row))?;
        rows.collect()
    }

    /// List schedules belonging to a group.
    pub fn schedules_by_group(&self, group_id: i64) -> Result<Vec<Schedule>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(
            "SELECT id, start_time, duration, repeat_kind, tag, state, disabled, group_id
             FROM schedule WHERE group_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![group_id], |row| row_to_schedule(row))?;
        rows.collect()
    }

    /// Delete a schedule; its events cascade. Returns whether a row existed.
    pub fn delete_schedule(&self, id: i64) -> Result<bool, rusqlite::Error> {
        let count = self
            .conn
            .execute("DELETE FROM schedule WHERE id = ?1", params![id])?;
        Ok(count > 0)
    }

    /// Delete all schedules matching a tag. Returns the number deleted.
    pub fn delete_schedules_by_tag(&self, tag: &str) -> Result<usize, rusqlite::Error> {
        self.conn
            .execute("DELETE FROM schedule WHERE tag = ?1", params![tag])
    }

    /// Delete all schedules belonging to a group. Returns the number deleted.
    pub fn delete_schedules_by_group(&self, group_id: i64) -> Result<usize, rusqlite::Error> {
        self.conn
            .execute("DELETE FROM schedule WHERE group_id = ?1", params![group_id])
    }

    // === Event CRUD ===

    /// Insert a new event (id 0) or update an existing one in place.
    /// Returns the event's id.
    pub fn add_or_update_event(&self, event: &Event) -> Result<i64, rusqlite::Error> {
        if event.id > 0 {
            self.conn.execute(
                "UPDATE event SET schedule_id = ?1, alarm_time = ?2, marker = ?3 WHERE id = ?4",
                params![
                    event.schedule_id,
                    to_ts(event.alarm_time),
                    event.marker.as_str(),
                    event.id,
                ],
            )?;
            Ok(event.id)
        } else {
            self.conn.execute(
                "INSERT INTO event (schedule_id, alarm_time, marker) VALUES (?1, ?2, ?3)",
                params![
                    event.schedule_id,
                    to_ts(event.alarm_time),
                    event.marker.as_str(),
                ],
            )?;
            Ok(self.conn.last_insert_rowid())
        }
    }

    /// List the live events of one schedule, oldest row first.
    pub fn events_for_schedule(&self, schedule_id: i64) -> Result<Vec<Event>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(
            "SELECT id, schedule_id, alarm_time, marker FROM event
             WHERE schedule_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![schedule_id], |row| {
            let marker_str: String = row.get(3)?;
            Ok(Event {
                id: row.get(0)?,
                schedule_id: row.get(1)?,
                alarm_time: from_ts(row.get(2)?),
                marker: parse_marker_kind(&marker_str),
            })
        })?;
        rows.collect()
    }

    /// Delete all events of a schedule. Returns the number deleted.
    pub fn delete_events_for_schedule(&self, schedule_id: i64) -> Result<usize, rusqlite::Error> {
        self.conn.execute(
            "DELETE FROM event WHERE schedule_id = ?1",
            params![schedule_id],
        )
    }

    /// The joined (schedule, event) scan driving the batch pass.
    ///
    /// One row per live event, in event-id order so the first row seen for a
    /// schedule is its bracketing event.
    pub fn schedule_events(&self) -> Result<Vec<ScheduleEvent>, rusqlite::Error> {
        let sql = format!(
            "SELECT {SCHEDULE_EVENT_COLUMNS}
             FROM event INNER JOIN schedule ON event.schedule_id = schedule.id
             ORDER BY event.id"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], row_to_schedule_event)?;
        rows.collect()
    }

    /// The earliest upcoming event at or after `now`, if any.
    ///
    /// Disabled schedules hold no events, so they never win here.
    pub fn next_event(&self, now: DateTime<Utc>) -> Result<Option<ScheduleEvent>, rusqlite::Error> {
        let sql = format!(
            "SELECT {SCHEDULE_EVENT_COLUMNS}
             FROM event INNER JOIN schedule ON event.schedule_id = schedule.id
             WHERE event.alarm_time >= ?1
             ORDER BY event.alarm_time
             LIMIT 1"
        );
        self.conn
            .query_row(&sql, params![to_ts(now)], row_to_schedule_event)
            .optional()
    }

    /// The earliest upcoming event among one group's schedules.
    pub fn next_event_for_group(
        &self,
        now: DateTime<Utc>,
        group_id: i64,
    ) -> Result<Option<ScheduleEvent>, rusqlite::Error> {
        let sql = format!(
            "SELECT {SCHEDULE_EVENT_COLUMNS}
             FROM event INNER JOIN schedule ON event.schedule_id = schedule.id
             WHERE event.alarm_time >= ?1 AND schedule.group_id = ?2
             ORDER BY event.alarm_time
             LIMIT 1"
        );
        self.conn
            .query_row(&sql, params![to_ts(now), group_id], row_to_schedule_event)
            .optional()
    }

    // === Group CRUD ===

    /// Insert a new group and return its store-assigned id.
    pub fn insert_group(&self, group: &ScheduleGroup) -> Result<i64, rusqlite::Error> {
        self.conn.execute(
            "INSERT INTO schedulegroup (tag, enabled, overall_state) VALUES (?1, ?2, ?3)",
            params![
                group.tag,
                group.enabled as i64,
                group.overall_state.as_str(),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Update an existing group row.
    pub fn update_group(&self, group: &ScheduleGroup) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "UPDATE schedulegroup SET tag = ?1, enabled = ?2, overall_state = ?3 WHERE id = ?4",
            params![
                group.tag,
                group.enabled as i64,
                group.overall_state.as_str(),
                group.id,
            ],
        )?;
        Ok(())
    }

    /// Get a group by id.
    pub fn group_by_id(&self, id: i64) -> Result<Option<ScheduleGroup>, rusqlite::Error> {
        self.conn
            .query_row(
                "SELECT id, tag, enabled, overall_state FROM schedulegroup WHERE id = ?1",
                params![id],
                row_to_group,
            )
            .optional()
    }

    /// Get a group by its unique tag.
    pub fn group_by_tag(&self, tag: &str) -> Result<Option<ScheduleGroup>, rusqlite::Error> {
        self.conn
            .query_row(
                "SELECT id, tag, enabled, overall_state FROM schedulegroup WHERE tag = ?1",
                params![tag],
                row_to_group,
            )
            .optional()
    }

    /// List all groups.
    pub fn all_groups(&self) -> Result<Vec<ScheduleGroup>, rusqlite::Error> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, tag, enabled, overall_state FROM schedulegroup ORDER BY id")?;
        let rows = stmt.query_map([], row_to_group)?;
        rows.collect()
    }

    /// Delete a group row. Member schedules keep their (dangling) group_id
    /// only if the caller did not delete them first; coordinator operations
    /// always delete members in the same transaction.
    pub fn delete_group(&self, id: i64) -> Result<bool, rusqlite::Error> {
        let count = self
            .conn
            .execute("DELETE FROM schedulegroup WHERE id = ?1", params![id])?;
        Ok(count > 0)
    }
}

fn row_to_group(row: &rusqlite::Row) -> Result<ScheduleGroup, rusqlite::Error> {
    let state_str: String = row.get(3)?;
    Ok(ScheduleGroup {
        id: row.get(0)?,
        tag: row.get(1)?,
        enabled: row.get::<_, i64>(2)? != 0,
        overall_state: state_str.parse().unwrap_or(ScheduleState::Off),
    })
}
