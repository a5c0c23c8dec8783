use schedalarm_core::{span_duration_min, RepeatKind};

use crate::common::parse_time;

/// Normalize a start/end pair into minutes within one recurrence unit.
pub fn run(start: &str, end: &str, repeat: &str) -> Result<(), Box<dyn std::error::Error>> {
    let start = parse_time(start)?;
    let end = parse_time(end)?;
    let repeat: RepeatKind = repeat.parse()?;

    println!("{}", span_duration_min(start, end, repeat));
    Ok(())
}
