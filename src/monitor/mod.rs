//! The sync daemon's state machine.
//!
//! ```text
//! Idle -> Snapshotting -> Diffing -> Syncing -> Reloading -> Sleeping -> Idle
//!              |             |          |
//!              +-------------+----------+--> Sleeping (on failure)
//! ```
//!
//! An empty delta skips from Diffing to Sleeping, a no-op sync skips
//! Reloading.

mod runner;
mod state;

pub use runner::{log_report, MonitorLoop};
pub use state::{CycleFailure, CycleReport, CycleSkip, MonitorState, MonitorStatus};
