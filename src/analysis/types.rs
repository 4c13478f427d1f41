//! Core data types for mesh test log analysis.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Longest device identifier accepted, in hex digits.
pub const MAX_DEVICE_ID_LEN: usize = 16;

/// Short hexadecimal device identifier, stored uppercase.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DeviceId(String);

impl DeviceId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Rejected device identifier text
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid device id '{0}': expected 1-16 hex digits")]
pub struct InvalidDeviceId(pub String);

impl FromStr for DeviceId {
    type Err = InvalidDeviceId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s.len() > MAX_DEVICE_ID_LEN || !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(InvalidDeviceId(s.to_string()));
        }
        Ok(Self(s.to_ascii_uppercase()))
    }
}

impl TryFrom<String> for DeviceId {
    type Error = InvalidDeviceId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DeviceId> for String {
    fn from(id: DeviceId) -> Self {
        id.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Comma-separated record layouts seen in device logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LineGrammar {
    /// `sender,seq,timestamp,snr*4,rssi,path_len` from `test dump`
    Compact,
    /// `sender,seq,tx_time,rx_time,snr,rssi,path_len` from the live feed
    Extended,
    /// `sender,seq,tx_time,rx_time,delay_sec,snr,rssi,path_len` from a device-log export
    Exported,
    /// `receiver,sender,seq,tx_time,rx_time,delay_sec,snr,rssi,path_len` from a report export
    Annotated,
}

impl LineGrammar {
    /// Number of comma-separated fields in this layout
    pub fn field_count(self) -> usize {
        match self {
            LineGrammar::Compact => 6,
            LineGrammar::Extended => 7,
            LineGrammar::Exported => 8,
            LineGrammar::Annotated => 9,
        }
    }
}

/// One observed reception of a test packet.
///
/// Records are never modified after parsing. Attaching the log owner
/// produces a new record via [`TestRecord::with_receiver`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestRecord {
    pub sender: DeviceId,
    pub receiver: Option<DeviceId>,
    pub sequence: u64,
    pub tx_time: Option<u64>,
    pub rx_time: Option<u64>,
    /// Signal-to-noise ratio in dB
    pub snr: f64,
    /// Received signal strength in dBm
    pub rssi: i32,
    /// Hop count
    pub path_len: u32,
    pub grammar: LineGrammar,
}

impl TestRecord {
    /// Delivery delay in seconds, or 0 unless both timestamps are positive.
    pub fn delay(&self) -> i64 {
        match (self.tx_time, self.rx_time) {
            (Some(tx), Some(rx)) if tx > 0 && rx > 0 => rx as i64 - tx as i64,
            _ => 0,
        }
    }

    pub fn has_delay(&self) -> bool {
        matches!((self.tx_time, self.rx_time), (Some(tx), Some(rx)) if tx > 0 && rx > 0)
    }

    /// Returns this record attributed to `receiver` unless it already names one.
    pub fn with_receiver(self, receiver: Option<&DeviceId>) -> Self {
        if self.receiver.is_some() {
            return self;
        }
        Self {
            receiver: receiver.cloned(),
            ..self
        }
    }
}

/// Where a header line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HeaderSource {
    /// `TESTLOG <id> <seq_num> <log_count>`, opens a new dump
    DumpHeader,
    /// `# Receiver Device ID: <id>` in an exported log
    Metadata,
    /// `TESTSTATUS <id> seq=<n> log=<m>` reply to `test status`
    Status,
}

/// Declares the log owner and optionally its own send count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderEvent {
    pub device_id: DeviceId,
    /// Packets the device reports having sent
    pub seq_num: Option<u64>,
    /// Entries the device reports having logged; informational only
    pub log_count: Option<u64>,
    pub source: HeaderSource,
}

impl HeaderEvent {
    pub fn starts_dump(&self) -> bool {
        self.source == HeaderSource::DumpHeader
    }
}

/// Start/end of one logical test-log transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DumpBoundary {
    Start,
    End,
}

/// Classification of one raw line
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedLine {
    Record(TestRecord),
    Header(HeaderEvent),
    Boundary(DumpBoundary),
    NoMatch,
}

/// Everything read from one batch log file
#[derive(Debug, Clone, Default)]
pub struct DeviceLog {
    pub path: PathBuf,
    /// Log owner, taken from the first header in the file
    pub receiver: Option<DeviceId>,
    /// Send count declared by the owner's own header
    pub declared_sent: Option<u64>,
    pub log_count: Option<u64>,
    pub records: Vec<TestRecord>,
    /// Records dropped because their dump was restarted
    pub discarded: usize,
    /// Records replaced by a later complete dump
    pub superseded: usize,
}

impl DeviceLog {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            ..Self::default()
        }
    }
}

/// A source that could not be read
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFailure {
    pub path: PathBuf,
    pub reason: String,
}

impl fmt::Display for SourceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path.display(), self.reason)
    }
}
