use crate::common::{open_manager, print_json};

/// Print the next wake-up time and the schedule that owns it.
pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    let manager = open_manager()?;

    match manager.next_wake_time() {
        Some(at) => {
            println!("next transition: {}", at.to_rfc3339());
            if let Some(snapshot) = manager.schedule_for_next_wake()? {
                print_json(&snapshot)?;
            }
        }
        None => println!("no enabled schedules"),
    }
    Ok(())
}
