//! Line-level parsing of mesh test logs.
//!
//! Every raw line becomes exactly one [`ParsedLine`]. Header and status
//! lines are matched with regexes; comma-separated records are dispatched
//! on their field count through [`GRAMMARS`]. Anything unrecognised is
//! [`ParsedLine::NoMatch`], never an error.

use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;

use super::types::*;
use crate::config::ParserConfig;

/// Sentinel that closes a `test dump` transfer
pub const DUMP_END_SENTINEL: &str = "TESTLOG_END";

/// Highest hop count accepted in a record
pub const MAX_PATH_LEN: u32 = 64;

/// Accepted RSSI range in dBm
pub const RSSI_RANGE: std::ops::RangeInclusive<i32> = -200..=50;

/// Compiled regex patterns for header and status lines
pub struct LogPatterns {
    /// Match: "TESTLOG <device_id> <seq_num> <log_count>"
    pub dump_header: Regex,
    /// Match: "# Receiver Device ID: <id>"
    pub receiver_metadata: Regex,
    /// Match: "TESTSTATUS <id> seq=<n> log=<m>"
    pub status: Regex,
}

impl LogPatterns {
    pub fn new() -> Self {
        Self {
            dump_header: Regex::new(r"^TESTLOG\s+([0-9A-Fa-f]+)\s+(\d+)\s+(\d+)\s*$")
                .expect("Invalid dump_header regex"),
            receiver_metadata: Regex::new(r"^#\s*Receiver Device ID:\s*([0-9A-Fa-f]+)\s*$")
                .expect("Invalid receiver_metadata regex"),
            status: Regex::new(r"^TESTSTATUS\s+([0-9A-Fa-f]+)\s+seq=(\d+)\s+log=(\d+)")
                .expect("Invalid status regex"),
        }
    }
}

impl Default for LogPatterns {
    fn default() -> Self {
        Self::new()
    }
}

/// Global patterns instance
pub static PATTERNS: LazyLock<LogPatterns> = LazyLock::new(LogPatterns::new);

type RecordBuilder = fn(&[&str], &ParserConfig) -> Option<TestRecord>;

/// A record layout and the handler that normalises it
pub struct GrammarHandler {
    pub grammar: LineGrammar,
    build: RecordBuilder,
}

/// Record layouts keyed by field count
pub static GRAMMARS: [GrammarHandler; 4] = [
    GrammarHandler { grammar: LineGrammar::Compact, build: build_compact },
    GrammarHandler { grammar: LineGrammar::Extended, build: build_extended },
    GrammarHandler { grammar: LineGrammar::Exported, build: build_exported },
    GrammarHandler { grammar: LineGrammar::Annotated, build: build_annotated },
];

/// Look up the grammar handler for a field count
pub fn grammar_for(field_count: usize) -> Option<&'static GrammarHandler> {
    GRAMMARS.iter().find(|h| h.grammar.field_count() == field_count)
}

/// Classify one raw line
pub fn parse_line(line: &str, config: &ParserConfig) -> ParsedLine {
    let line = line.trim();
    if line.is_empty() {
        return ParsedLine::NoMatch;
    }

    if line.starts_with(DUMP_END_SENTINEL) {
        return ParsedLine::Boundary(DumpBoundary::End);
    }

    if line.starts_with('#') {
        return parse_metadata(line).map_or(ParsedLine::NoMatch, ParsedLine::Header);
    }

    if let Some(caps) = PATTERNS.dump_header.captures(line) {
        return header_from_captures(&caps, HeaderSource::DumpHeader)
            .map_or(ParsedLine::NoMatch, ParsedLine::Header);
    }

    // A dump header with missing or garbled counts still opens a dump
    if line.starts_with("TESTLOG ") {
        return ParsedLine::Boundary(DumpBoundary::Start);
    }

    if let Some(caps) = PATTERNS.status.captures(line) {
        return header_from_captures(&caps, HeaderSource::Status)
            .map_or(ParsedLine::NoMatch, ParsedLine::Header);
    }

    if line.contains(',') {
        return parse_record(line, config).map_or(ParsedLine::NoMatch, ParsedLine::Record);
    }

    ParsedLine::NoMatch
}

/// Parse a comma-separated record line
pub fn parse_record(line: &str, config: &ParserConfig) -> Option<TestRecord> {
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    let handler = grammar_for(fields.len())?;
    (handler.build)(&fields, config)
}

fn parse_metadata(line: &str) -> Option<HeaderEvent> {
    let caps = PATTERNS.receiver_metadata.captures(line)?;
    Some(HeaderEvent {
        device_id: caps.get(1)?.as_str().parse().ok()?,
        seq_num: None,
        log_count: None,
        source: HeaderSource::Metadata,
    })
}

fn header_from_captures(caps: &regex::Captures<'_>, source: HeaderSource) -> Option<HeaderEvent> {
    Some(HeaderEvent {
        device_id: caps.get(1)?.as_str().parse().ok()?,
        seq_num: Some(caps.get(2)?.as_str().parse().ok()?),
        log_count: Some(caps.get(3)?.as_str().parse().ok()?),
        source,
    })
}

fn num<T: FromStr>(field: &str) -> Option<T> {
    field.parse().ok()
}

/// Empty timestamp fields mean "not recorded"
fn timestamp(field: &str) -> Option<Option<u64>> {
    if field.is_empty() {
        Some(None)
    } else {
        num(field).map(Some)
    }
}

/// SNR already in dB, possibly fractional
fn snr_db(field: &str) -> Option<f64> {
    num::<f64>(field).filter(|v| v.is_finite())
}

fn rssi(field: &str) -> Option<i32> {
    num(field).filter(|v| RSSI_RANGE.contains(v))
}

fn path_len(field: &str) -> Option<u32> {
    num(field).filter(|v| *v <= MAX_PATH_LEN)
}

/// Fields shared by every layout, in layout order
struct CommonFields {
    sender: DeviceId,
    sequence: u64,
    tx_time: Option<u64>,
    rx_time: Option<u64>,
}

impl CommonFields {
    fn into_record(self, receiver: Option<DeviceId>, snr: f64, rssi: i32, path_len: u32, grammar: LineGrammar) -> TestRecord {
        TestRecord {
            sender: self.sender,
            receiver,
            sequence: self.sequence,
            tx_time: self.tx_time,
            rx_time: self.rx_time,
            snr,
            rssi,
            path_len,
            grammar,
        }
    }
}

fn build_compact(f: &[&str], config: &ParserConfig) -> Option<TestRecord> {
    let common = CommonFields {
        sender: f[0].parse().ok()?,
        sequence: num(f[1])?,
        tx_time: None,
        rx_time: Some(num(f[2])?),
    };
    let raw_snr: i32 = num(f[3])?;
    let snr = f64::from(raw_snr) / config.compact_snr_scale;
    Some(common.into_record(None, snr, rssi(f[4])?, path_len(f[5])?, LineGrammar::Compact))
}

fn build_extended(f: &[&str], _config: &ParserConfig) -> Option<TestRecord> {
    let common = CommonFields {
        sender: f[0].parse().ok()?,
        sequence: num(f[1])?,
        tx_time: Some(num(f[2])?),
        rx_time: Some(num(f[3])?),
    };
    let snr: i32 = num(f[4])?;
    Some(common.into_record(None, f64::from(snr), rssi(f[5])?, path_len(f[6])?, LineGrammar::Extended))
}

/// SNR column of an exported row; some tooling writes it in quarter-dB
fn exported_snr(field: &str, config: &ParserConfig) -> Option<f64> {
    snr_db(field).map(|snr| snr / config.exported_snr_scale)
}

fn build_exported(f: &[&str], config: &ParserConfig) -> Option<TestRecord> {
    let common = CommonFields {
        sender: f[0].parse().ok()?,
        sequence: num(f[1])?,
        tx_time: timestamp(f[2])?,
        rx_time: timestamp(f[3])?,
    };
    // Recorded delay is recomputed from the timestamps, but must still be numeric
    let _delay: i64 = num(f[4])?;
    Some(common.into_record(None, exported_snr(f[5], config)?, rssi(f[6])?, path_len(f[7])?, LineGrammar::Exported))
}

fn build_annotated(f: &[&str], config: &ParserConfig) -> Option<TestRecord> {
    let receiver = if f[0].is_empty() { None } else { Some(f[0].parse().ok()?) };
    let common = CommonFields {
        sender: f[1].parse().ok()?,
        sequence: num(f[2])?,
        tx_time: timestamp(f[3])?,
        rx_time: timestamp(f[4])?,
    };
    let _delay: i64 = num(f[5])?;
    Some(common.into_record(receiver, exported_snr(f[6], config)?, rssi(f[7])?, path_len(f[8])?, LineGrammar::Annotated))
}
