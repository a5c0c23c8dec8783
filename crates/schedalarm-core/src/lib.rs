//! # Schedalarm Core Library
//!
//! This library is the scheduling and state core of an alarm-management
//! component: it manages user-defined recurring ON/OFF time windows
//! ("schedules") and continuously answers which schedules are currently
//! active, when the next state transition happens, and what changed since
//! the last check.
//!
//! ## Architecture
//!
//! - **Recurrence math**: pure functions advancing a recurring time point
//!   through its hourly/daily/weekly/monthly/yearly cycle
//! - **State derivation**: a pure function computing a schedule's current
//!   ON/OFF state from its bracketing event
//! - **Batch pass**: one scan advancing expired events, re-deriving states,
//!   folding group aggregates, arming the wake timer and emitting a single
//!   coalesced change notification
//! - **Storage**: SQLite-backed schedule/event/group rows and TOML-based
//!   configuration
//!
//! ## Key Components
//!
//! - [`ScheduleManager`]: the public coordinator API
//! - [`AlarmProcessor`]: the batch recomputation engine
//! - [`ScheduleDb`]: schedule, event and group persistence
//! - [`WakeTimer`]: the OS one-shot timer boundary

pub mod error;
pub mod gate;
pub mod manager;
pub mod model;
pub mod processor;
pub mod recurrence;
pub mod state;
pub mod storage;
pub mod wake;

pub use error::{CoreError, Result, StorageError, ValidationError};
pub use gate::CallbackGate;
pub use manager::ScheduleManager;
pub use model::{Event, Schedule, ScheduleEvent, ScheduleGroup, ScheduleSnapshot};
pub use processor::{AlarmProcessor, ScheduleCallback};
pub use recurrence::{
    advance_one_unit, next_occurrence_at_or_after, span_duration_min, Direction, RepeatKind,
};
pub use state::{derive_state, MarkerKind, ScheduleState};
pub use storage::{Config, ScheduleDb};
pub use wake::{NoopWakeTimer, WakeTimer};
