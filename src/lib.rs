//! # meshstat - Delivery and link-quality analysis for mesh radio test logs
//!
//! Nodes in a mesh test deployment broadcast numbered test packets and log
//! every packet they hear. This library reconstructs network-wide delivery
//! statistics from those logs: how many packets each node sent, which
//! neighbours received them, per-link loss, and radio quality (SNR, RSSI,
//! hop count, delivery delay).
//!
//! ## Architecture
//!
//! - `analysis::log_parser`: classifies each raw line as a record, header,
//!   dump boundary or noise
//! - `analysis::source`: batch file reader with dump tracking
//! - `analysis::stream`: line splitter and single consumer for live feeds
//! - `analysis::network`: receive matrix, send counts and loss
//! - `analysis::signal`: SNR/RSSI/delay statistics and distributions
//! - `analysis::report`: text, CSV and JSON rendering
//! - `analysis::engine`: batch pipeline tying the above together
//! - `live`: serial port access and an async session over a reader/writer pair
//! - `config`: YAML configuration and validation
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::path::PathBuf;
//! use meshstat::{analysis, config::AnalyzerConfig};
//!
//! let files = vec![PathBuf::from("node_69F5.log"), PathBuf::from("node_5061.log")];
//! let result = analysis::analyze(&files, &AnalyzerConfig::default())?;
//!
//! println!("{}", analysis::render_text(&result.report));
//! analysis::write_reports(&result.report, "mesh_output".as_ref())?;
//! # Ok::<(), color_eyre::eyre::Error>(())
//! ```
//!
//! ## Log Formats
//!
//! Records are comma-separated and told apart by field count:
//!
//! ```text
//! TESTLOG 69F5 63 120                 dump header: device, packets sent, entries
//! A1B2,12,1200,-9,-92,2               sender,seq,rx_time,snr*4,rssi,hops
//! A1B2,12,1190,1200,-2,-92,2          sender,seq,tx_time,rx_time,snr,rssi,hops
//! TESTLOG_END                         end of dump
//! ```
//!
//! ## Error Handling
//!
//! Per-source failures are typed (`error::SourceError`) and collected
//! alongside successful results; the binary reports everything through
//! `color_eyre`.

pub mod analysis;
pub mod config;
pub mod error;
pub mod live;
pub mod utils;
