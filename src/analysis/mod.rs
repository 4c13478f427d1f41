//! Mesh test log analysis.
//!
//! This module turns raw device logs, from files or a live feed, into
//! delivery and signal statistics and the reports built from them.

pub mod types;
pub mod log_parser;
pub mod source;
pub mod stream;
pub mod network;
pub mod signal;
pub mod report;
pub mod engine;

pub use types::*;
pub use log_parser::parse_line;
pub use source::{parse_all_logs, read_log_file, DumpCollector};
pub use stream::{LineSplitter, StreamIngest, StreamOutcome, StreamStatus};
pub use network::{LossSummary, NetworkAggregator, NetworkQuality};
pub use signal::SignalAggregator;
pub use report::{render_csv, render_json, render_text, write_device_log, write_reports, Report};
pub use engine::{analyze, Analysis};
