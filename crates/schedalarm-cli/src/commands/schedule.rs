use clap::Subcommand;
use schedalarm_core::RepeatKind;

use crate::common::{open_manager, parse_time, print_json};

#[derive(Subcommand)]
pub enum ScheduleAction {
    /// Add a schedule
    Add {
        /// Start time (RFC 3339, "YYYY-MM-DD HH:MM" or "HH:MM")
        start: String,
        /// Window duration in minutes
        duration: i64,
        /// Repeat kind: hourly, daily, weekly, monthly, yearly
        repeat: String,
        /// Caller-stable tag identifying the schedule
        tag: String,
        /// Optional group tag (the group is created on first use)
        #[arg(long)]
        group: Option<String>,
    },
    /// List schedule states, optionally filtered by tag
    List {
        #[arg(long)]
        tag: Option<String>,
    },
    /// Replace a schedule's start time and duration
    Update {
        id: i64,
        start: String,
        duration: i64,
    },
    /// Re-activate a disabled schedule
    Enable { id: i64 },
    /// Suspend a schedule without deleting it
    Disable { id: i64 },
    /// Delete a schedule
    Cancel { id: i64 },
    /// Delete all schedules matching a tag
    CancelTag { tag: String },
}

pub fn run(action: ScheduleAction) -> Result<(), Box<dyn std::error::Error>> {
    let mut manager = open_manager()?;

    match action {
        ScheduleAction::Add {
            start,
            duration,
            repeat,
            tag,
            group,
        } => {
            let start = parse_time(&start)?;
            let repeat: RepeatKind = repeat.parse()?;
            let id = manager.add_schedule(start, duration, repeat, &tag, group.as_deref())?;
            println!("schedule added: {id}");
        }
        ScheduleAction::List { tag } => {
            let states = manager.get_schedule_states(tag.as_deref())?;
            print_json(&states)?;
        }
        ScheduleAction::Update {
            id,
            start,
            duration,
        } => {
            let start = parse_time(&start)?;
            manager.update_schedule(id, start, duration)?;
            println!("schedule updated: {id}");
        }
        ScheduleAction::Enable { id } => {
            manager.enable_schedule(id)?;
            println!("schedule enabled: {id}");
        }
        ScheduleAction::Disable { id } => {
            manager.disable_schedule(id)?;
            println!("schedule disabled: {id}");
        }
        ScheduleAction::Cancel { id } => {
            manager.cancel_schedule(id)?;
            println!("schedule cancelled: {id}");
        }
        ScheduleAction::CancelTag { tag } => {
            let deleted = manager.cancel_schedules_by_tag(&tag)?;
            println!("schedules cancelled: {deleted}");
        }
    }
    Ok(())
}
