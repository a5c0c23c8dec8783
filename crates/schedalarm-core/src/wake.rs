//! The one-shot wake timer boundary.
//!
//! The engine never owns an OS timer. At the end of every recompute pass it
//! arms the injected [`WakeTimer`] for the single earliest upcoming event
//! (or disarms it when no enabled schedule remains). Whatever fires the
//! timer is expected to call back into
//! [`ScheduleManager::refresh_schedule_states`](crate::ScheduleManager::refresh_schedule_states),
//! which re-arms as part of the pass.

use chrono::{DateTime, Utc};

/// OS-level one-shot timer collaborator.
pub trait WakeTimer: Send {
    /// Arm (or re-arm) the timer for `at`.
    fn arm(&mut self, at: DateTime<Utc>);

    /// Cancel any pending timer.
    fn disarm(&mut self);
}

/// A timer that does nothing.
///
/// For embedders that poll
/// [`next_wake_time`](crate::ScheduleManager::next_wake_time) instead of
/// wiring up a real OS timer -- the CLI watch loop works this way.
#[derive(Debug, Default)]
pub struct NoopWakeTimer;

impl WakeTimer for NoopWakeTimer {
    fn arm(&mut self, _at: DateTime<Utc>) {}

    fn disarm(&mut self) {}
}
