pub mod duration;
pub mod group;
pub mod schedule;
pub mod status;
pub mod watch;
