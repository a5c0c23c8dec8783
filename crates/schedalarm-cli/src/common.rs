//! Shared helpers for CLI commands.

use chrono::{DateTime, Local, NaiveTime, TimeZone, Utc};
use schedalarm_core::{Config, NoopWakeTimer, ScheduleDb, ScheduleManager};

/// Open the store at the configured path and return an initialized manager.
pub fn open_manager() -> Result<ScheduleManager, Box<dyn std::error::Error>> {
    let config = Config::load_or_default();
    let db = ScheduleDb::open(&config.resolved_db_path()?)?;
    let mut manager = ScheduleManager::new(db, Box::new(NoopWakeTimer));
    manager.init()?;
    Ok(manager)
}

/// Parse a user-supplied time.
///
/// Accepts RFC 3339 (`2024-03-10T09:00:00Z`), a local date-time
/// (`2024-03-10 09:00`) or a bare local clock time (`09:00`, meaning today).
pub fn parse_time(input: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Ok(dt.with_timezone(&Utc));
    }

    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(input, "%Y-%m-%d %H:%M") {
        if let Some(local) = Local.from_local_datetime(&naive).single() {
            return Ok(local.with_timezone(&Utc));
        }
    }

    if let Ok(time) = NaiveTime::parse_from_str(input, "%H:%M") {
        let today = Local::now().date_naive();
        if let Some(local) = Local.from_local_datetime(&today.and_time(time)).single() {
            return Ok(local.with_timezone(&Utc));
        }
    }

    Err(format!(
        "could not parse time '{input}' (expected RFC 3339, 'YYYY-MM-DD HH:MM' or 'HH:MM')"
    ))
}

/// Pretty-print a serializable value as JSON.
pub fn print_json<T: serde::Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rfc3339() {
        let parsed = parse_time("2024-03-10T09:00:00Z").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 3, 10, 9, 0, 0).unwrap());
    }

    #[test]
    fn parses_local_date_time() {
        assert!(parse_time("2024-03-10 09:00").is_ok());
    }

    #[test]
    fn parses_bare_clock_time() {
        assert!(parse_time("09:00").is_ok());
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_time("next tuesday-ish").is_err());
    }
}
