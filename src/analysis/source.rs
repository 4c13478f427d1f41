//! Batch log sources.
//!
//! Reads one complete log file per device, tracking dump boundaries with
//! [`DumpCollector`]. A new `test dump` from the log owner replaces every
//! record collected before it, so a file keeps at most one dump.

use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind};
use std::path::{Path, PathBuf};

use rayon::prelude::*;

use super::log_parser::parse_line;
use super::types::*;
use crate::config::ParserConfig;
use crate::error::SourceError;

/// Holds records of the dump in progress until it completes.
///
/// Records seen outside any dump are committed immediately. A new dump
/// header drops whatever the previous, unfinished dump had collected.
#[derive(Debug, Default)]
pub struct DumpCollector {
    pending: Vec<TestRecord>,
    committed: Vec<TestRecord>,
    in_dump: bool,
    dumps_completed: usize,
    discarded: usize,
    superseded: usize,
}

impl DumpCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: TestRecord) {
        if self.in_dump {
            self.pending.push(record);
        } else {
            self.committed.push(record);
        }
    }

    /// Apply a boundary; returns how many pending records were dropped.
    pub fn boundary(&mut self, boundary: DumpBoundary) -> usize {
        match boundary {
            DumpBoundary::Start => {
                let dropped = self.discard_pending();
                self.in_dump = true;
                dropped
            }
            DumpBoundary::End => {
                self.committed.append(&mut self.pending);
                if self.in_dump {
                    self.dumps_completed += 1;
                }
                self.in_dump = false;
                0
            }
        }
    }

    /// Drop records of the unfinished dump.
    pub fn discard_pending(&mut self) -> usize {
        let dropped = self.pending.len();
        self.pending.clear();
        self.discarded += dropped;
        dropped
    }

    /// Drop committed records that a new dump replaces.
    pub fn supersede(&mut self) -> usize {
        let dropped = self.committed.len();
        self.committed.clear();
        self.superseded += dropped;
        dropped
    }

    /// Take records committed since the last call.
    pub fn take_committed(&mut self) -> Vec<TestRecord> {
        std::mem::take(&mut self.committed)
    }

    /// Commit anything still pending and return all committed records.
    pub fn finish(mut self) -> Vec<TestRecord> {
        self.committed.append(&mut self.pending);
        self.committed
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn in_dump(&self) -> bool {
        self.in_dump
    }

    pub fn dumps_completed(&self) -> usize {
        self.dumps_completed
    }

    pub fn discarded(&self) -> usize {
        self.discarded
    }

    /// Committed records later replaced by a newer dump
    pub fn superseded(&self) -> usize {
        self.superseded
    }
}

/// Record a header against the file's owner; the first declared id wins.
/// Returns whether the header belongs to the owner.
fn apply_header(log: &mut DeviceLog, event: &HeaderEvent) -> bool {
    match &log.receiver {
        None => log.receiver = Some(event.device_id.clone()),
        Some(owner) if *owner != event.device_id => {
            log::warn!(
                "{}: ignoring header for {} (file already declared {})",
                log.path.display(),
                event.device_id,
                owner
            );
            return false;
        }
        Some(_) => {}
    }

    if event.seq_num.is_some() {
        log.declared_sent = event.seq_num;
    }
    if event.log_count.is_some() {
        log.log_count = event.log_count;
    }
    true
}

/// Open a new dump; `replaces` drops records of earlier dumps too
fn start_dump(collector: &mut DumpCollector, path: &Path, replaces: bool) {
    if replaces {
        let superseded = collector.supersede();
        if superseded > 0 {
            log::warn!(
                "{}: new dump replaces {} records collected before it",
                path.display(),
                superseded
            );
        }
    }
    let dropped = collector.boundary(DumpBoundary::Start);
    if dropped > 0 {
        log::warn!(
            "{}: dump restarted, discarded {} records from the interrupted transfer",
            path.display(),
            dropped
        );
    }
}

/// Parse a single device log file
pub fn read_log_file(path: &Path, config: &ParserConfig) -> Result<DeviceLog, SourceError> {
    let file = File::open(path).map_err(|source| SourceError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let reader = BufReader::with_capacity(64 * 1024, file);

    let mut log = DeviceLog::new(path.to_path_buf());
    let mut collector = DumpCollector::new();

    for line_result in reader.lines() {
        let line = match line_result {
            Ok(l) => l,
            Err(e) if e.kind() == ErrorKind::InvalidData => continue, // Skip non-UTF-8 lines
            Err(source) => {
                return Err(SourceError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        match parse_line(&line, config) {
            ParsedLine::Record(record) => collector.push(record),
            ParsedLine::Header(event) => {
                let owned = apply_header(&mut log, &event);
                if event.starts_dump() {
                    start_dump(&mut collector, path, owned);
                }
            }
            ParsedLine::Boundary(DumpBoundary::Start) => start_dump(&mut collector, path, true),
            ParsedLine::Boundary(DumpBoundary::End) => {
                collector.boundary(DumpBoundary::End);
            }
            ParsedLine::NoMatch => {}
        }
    }

    log.discarded = collector.discarded();
    log.superseded = collector.superseded();
    let receiver = log.receiver.clone();
    log.records = collector
        .finish()
        .into_iter()
        .map(|r| r.with_receiver(receiver.as_ref()))
        .collect();

    if log.receiver.is_none() && log.records.iter().any(|r| r.receiver.is_none()) {
        log::warn!(
            "{}: no receiver declared, records will not count towards the receive matrix",
            path.display()
        );
    }

    if let Some(declared) = log.log_count {
        if declared != log.records.len() as u64 {
            log::warn!(
                "{}: header declares {} log entries but {} records were parsed",
                path.display(),
                declared,
                log.records.len()
            );
        }
    }

    Ok(log)
}

/// Parse all log files in parallel, keeping input order
pub fn parse_all_logs(paths: &[PathBuf], config: &ParserConfig) -> (Vec<DeviceLog>, Vec<SourceFailure>) {
    log::info!("Parsing {} log files in parallel...", paths.len());

    let results: Vec<Result<DeviceLog, SourceError>> =
        paths.par_iter().map(|path| read_log_file(path, config)).collect();

    let mut logs = Vec::new();
    let mut failures = Vec::new();
    for result in results {
        match result {
            Ok(data) => {
                log::debug!(
                    "Parsed {}: receiver {}, {} records",
                    data.path.display(),
                    data.receiver.as_ref().map_or("unknown", DeviceId::as_str),
                    data.records.len()
                );
                logs.push(data);
            }
            Err(e) => {
                log::warn!("{}", e);
                failures.push(e.into_failure());
            }
        }
    }

    let total_records: usize = logs.iter().map(|l| l.records.len()).sum();
    log::info!(
        "Parsed {} files, {} total records, {} unreadable",
        logs.len(),
        total_records,
        failures.len()
    );

    (logs, failures)
}
