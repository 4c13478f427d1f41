//! Analyzer configuration.
//!
//! Every field has a default, so an empty YAML document (or no file at
//! all) gives the behaviour of the stock field tooling.

use std::fs::File;
use std::path::Path;
use std::time::Duration;

use color_eyre::eyre::{Context, Result};
use log::info;
use serde::{Deserialize, Serialize};

use crate::analysis::types::DeviceId;
use crate::live::CMD_DUMP;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    pub parser: ParserConfig,
    pub signal: SignalConfig,
    pub report: ReportConfig,
    pub live: LiveConfig,
}

impl AnalyzerConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        for (name, scale) in [
            ("compact_snr_scale", self.parser.compact_snr_scale),
            ("exported_snr_scale", self.parser.exported_snr_scale),
        ] {
            if !scale.is_finite() || scale <= 0.0 {
                return Err(ValidationError::InvalidParser(format!(
                    "{} must be a positive number, got {}",
                    name, scale
                )));
            }
        }

        if self.signal.rssi_bands.is_empty() {
            return Err(ValidationError::InvalidSignal(
                "rssi_bands cannot be empty".to_string(),
            ));
        }
        for pair in self.signal.rssi_bands.windows(2) {
            if pair[1].min_dbm >= pair[0].min_dbm {
                return Err(ValidationError::InvalidSignal(format!(
                    "rssi_bands must be in strictly descending order ('{}' at {} dBm follows '{}' at {} dBm)",
                    pair[1].label, pair[1].min_dbm, pair[0].label, pair[0].min_dbm
                )));
            }
        }

        if self.live.poll_interval.is_zero() {
            return Err(ValidationError::InvalidLive(
                "poll_interval must be greater than zero".to_string(),
            ));
        }
        if self.live.channel_capacity == 0 {
            return Err(ValidationError::InvalidLive(
                "channel_capacity must be greater than zero".to_string(),
            ));
        }
        if self.live.baud_rate == 0 {
            return Err(ValidationError::InvalidLive(
                "baud_rate must be greater than zero".to_string(),
            ));
        }
        if self.live.read_chunk == 0 {
            return Err(ValidationError::InvalidLive(
                "read_chunk must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

/// Record parser settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// Divisor applied to the SNR field of six-field records
    pub compact_snr_scale: f64,
    /// Divisor applied to the SNR column of exported CSV rows
    pub exported_snr_scale: f64,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            compact_snr_scale: 4.0,
            exported_snr_scale: 1.0,
        }
    }
}

/// One RSSI quality band; a sample belongs to the first band whose
/// threshold it reaches, scanning from the strongest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RssiBand {
    pub label: String,
    pub min_dbm: i32,
}

impl RssiBand {
    pub fn new(label: &str, min_dbm: i32) -> Self {
        Self {
            label: label.to_string(),
            min_dbm,
        }
    }
}

/// Signal statistics settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    pub rssi_bands: Vec<RssiBand>,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            rssi_bands: vec![
                RssiBand::new("excellent", -70),
                RssiBand::new("good", -85),
                RssiBand::new("fair", -100),
                RssiBand::new("poor", -120),
            ],
        }
    }
}

/// Report rendering settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub title: String,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            title: "MESH NETWORK TEST ANALYSIS".to_string(),
        }
    }
}

/// Live serial session settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    pub baud_rate: u32,
    /// Longest a read may block before the reader re-checks for shutdown
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    /// Capacity of the reader-to-consumer queue, in chunks
    pub channel_capacity: usize,
    /// Bytes requested per read
    pub read_chunk: usize,
    pub dump_command: String,
    /// Appended to every outbound command
    pub line_ending: String,
    /// Log owner to assume when the device never announces itself
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receiver: Option<DeviceId>,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            baud_rate: 115_200,
            poll_interval: Duration::from_millis(50),
            channel_capacity: 256,
            read_chunk: 1024,
            dump_command: CMD_DUMP.to_string(),
            line_ending: "\r\n".to_string(),
            receiver: None,
        }
    }
}

/// Configuration validation errors
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid parser configuration: {0}")]
    InvalidParser(String),
    #[error("Invalid signal configuration: {0}")]
    InvalidSignal(String),
    #[error("Invalid live configuration: {0}")]
    InvalidLive(String),
}

/// Load and validate configuration from a YAML file
pub fn load_config(config_path: &Path) -> Result<AnalyzerConfig> {
    info!("Loading configuration from: {:?}", config_path);

    let file = File::open(config_path)
        .with_context(|| format!("Failed to open config file: {}", config_path.display()))?;
    let config: AnalyzerConfig = serde_yaml::from_reader(file)
        .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

    config.validate()?;

    Ok(config)
}
