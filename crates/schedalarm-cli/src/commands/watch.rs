//! Foreground watch loop.
//!
//! The engine expects an OS one-shot timer to call back into it at the next
//! transition time. The CLI has no such timer, so this loop polls instead:
//! recompute, print what changed, sleep until the next wake time (or the
//! configured fallback interval when nothing is scheduled), repeat.

use chrono::Utc;
use schedalarm_core::Config;
use std::time::Duration;
use tracing::debug;

use crate::common::open_manager;

pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load_or_default();
    let mut manager = open_manager()?;

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async move {
        loop {
            let changed = match manager.refresh_schedule_states() {
                Ok(changed) => changed,
                Err(e) => {
                    eprintln!("error: {e}");
                    break;
                }
            };

            for snapshot in changed.values() {
                let state = snapshot
                    .state
                    .map(|s| s.as_str())
                    .unwrap_or("unset");
                println!(
                    "{} {} -> {}",
                    Utc::now().to_rfc3339(),
                    snapshot.tag,
                    state
                );
            }

            let sleep_for = match manager.next_wake_time() {
                Some(at) => {
                    let until = (at - Utc::now()).num_seconds().max(1) as u64;
                    debug!(wake_at = %at, "sleeping until next transition");
                    Duration::from_secs(until)
                }
                None => Duration::from_secs(config.fallback_poll_secs),
            };
            tokio::time::sleep(sleep_for).await;
        }
    });

    Ok(())
}
