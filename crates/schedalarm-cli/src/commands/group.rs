use clap::Subcommand;

use crate::common::{open_manager, print_json};

#[derive(Subcommand)]
pub enum GroupAction {
    /// Re-activate every member whose individual disabled flag is clear
    Enable { tag: String },
    /// Suspend every member schedule of the group
    Disable { tag: String },
    /// Delete the group and all of its member schedules
    Cancel { tag: String },
    /// List the states of a group's member schedules
    States { tag: String },
    /// Show the group's next upcoming transition time
    Next { tag: String },
}

pub fn run(action: GroupAction) -> Result<(), Box<dyn std::error::Error>> {
    let mut manager = open_manager()?;

    match action {
        GroupAction::Enable { tag } => {
            manager.enable_schedule_group(&tag)?;
            println!("group enabled: {tag}");
        }
        GroupAction::Disable { tag } => {
            manager.disable_schedule_group(&tag)?;
            println!("group disabled: {tag}");
        }
        GroupAction::Cancel { tag } => {
            let deleted = manager.cancel_schedule_group(&tag)?;
            println!("group cancelled: {tag} ({deleted} schedules)");
        }
        GroupAction::States { tag } => {
            let states = manager.get_schedule_states_by_group_tag(&tag)?;
            print_json(&states)?;
        }
        GroupAction::Next { tag } => match manager.next_wake_time_for_group(&tag)? {
            Some(at) => println!("{}", at.to_rfc3339()),
            None => println!("no upcoming transition"),
        },
    }
    Ok(())
}
