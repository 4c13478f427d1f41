//! Live device sessions.
//!
//! A session owns one device feed: a reader task that only moves raw bytes
//! into a bounded queue, and a single consumer that splits, parses and
//! aggregates them in arrival order.

pub mod serial;
pub mod session;

pub use serial::open_port;
pub use session::{LiveSession, SessionInput};

/// Device command that reports test status (`TESTSTATUS ...`)
pub const CMD_STATUS: &str = "test status";
/// Device command that prints test information
pub const CMD_INFO: &str = "test info";
/// Device command that clears the device's test log
pub const CMD_CLEAR: &str = "test clear";
/// Device command that starts a log dump
pub const CMD_DUMP: &str = "test dump";
/// Device command that restarts the node
pub const CMD_REBOOT: &str = "reboot";
/// Escape sequence that leaves the device's command mode
pub const CMD_ESCAPE: &str = "~~~";
