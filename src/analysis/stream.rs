//! Streaming ingestion of a live device feed.
//!
//! [`LineSplitter`] turns arbitrarily chunked bytes into complete lines.
//! [`StreamIngest`] is the single consumer that parses those lines, tracks
//! dump boundaries and feeds the aggregators in arrival order.

use bytes::{Buf, BytesMut};

use super::log_parser::parse_line;
use super::network::NetworkAggregator;
use super::signal::SignalAggregator;
use super::source::DumpCollector;
use super::types::*;
use crate::config::{ParserConfig, SignalConfig};

/// Accumulates bytes and yields complete `\n`-terminated lines.
#[derive(Debug, Default)]
pub struct LineSplitter {
    buffer: BytesMut,
    /// Bytes already scanned without finding a newline
    scanned: usize,
}

impl LineSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a chunk and returns every line it completes, in order.
    ///
    /// Trailing `\r` is stripped; invalid UTF-8 is replaced.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(offset) = self.buffer[self.scanned..].iter().position(|b| *b == b'\n') {
            let end = self.scanned + offset;
            let line = self.buffer.split_to(end);
            self.buffer.advance(1);
            self.scanned = 0;
            lines.push(decode_line(&line));
        }
        self.scanned = self.buffer.len();

        lines
    }

    /// Bytes held for an incomplete line
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Returns the unterminated remainder, if any, and empties the buffer.
    pub fn take_partial(&mut self) -> Option<String> {
        self.scanned = 0;
        if self.buffer.is_empty() {
            return None;
        }
        let rest = self.buffer.split();
        Some(decode_line(&rest))
    }
}

fn decode_line(raw: &[u8]) -> String {
    let text = String::from_utf8_lossy(raw);
    text.strip_suffix('\r').unwrap_or(&text[..]).to_string()
}

/// Progress counters of a stream consumer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamStatus {
    pub receiver: Option<DeviceId>,
    /// Last `TESTSTATUS`/`TESTLOG` figures reported by the device
    pub reported_seq: Option<u64>,
    pub reported_log_count: Option<u64>,
    pub lines: u64,
    pub records: u64,
    pub pending: usize,
    pub in_dump: bool,
    pub dumps_completed: usize,
    pub discarded: usize,
    /// Records dropped because a later dump replaced them
    pub superseded: usize,
}

/// Final state of a stream once the feed has ended
#[derive(Debug, Clone)]
pub struct StreamOutcome {
    pub receiver: Option<DeviceId>,
    pub records: Vec<TestRecord>,
    pub network: NetworkAggregator,
    pub signal: SignalAggregator,
    pub status: StreamStatus,
}

/// Single consumer for a live feed.
///
/// Records committed before the feed owner is known are held back and
/// attributed once a header names it. A new dump from the owner replaces
/// everything committed so far, so repeated dumps never double count.
pub struct StreamIngest {
    parser: ParserConfig,
    signal_config: SignalConfig,
    splitter: LineSplitter,
    collector: DumpCollector,
    /// Fixed by configuration; device headers cannot replace it
    pinned_receiver: bool,
    network: NetworkAggregator,
    signal: SignalAggregator,
    records: Vec<TestRecord>,
    /// Committed while the receiver was still unknown
    unowned: Vec<TestRecord>,
    status: StreamStatus,
}

impl StreamIngest {
    pub fn new(parser: ParserConfig, signal: &SignalConfig, receiver: Option<DeviceId>) -> Self {
        let mut network = NetworkAggregator::new();
        if let Some(id) = &receiver {
            network.add_device(id);
        }
        Self {
            parser,
            signal_config: signal.clone(),
            splitter: LineSplitter::new(),
            collector: DumpCollector::new(),
            pinned_receiver: receiver.is_some(),
            network,
            signal: SignalAggregator::new(signal),
            records: Vec::new(),
            unowned: Vec::new(),
            status: StreamStatus {
                receiver,
                ..StreamStatus::default()
            },
        }
    }

    /// Feed one chunk of raw bytes
    pub fn feed(&mut self, chunk: &[u8]) {
        for line in self.splitter.feed(chunk) {
            self.process_line(&line);
        }
    }

    /// Handle one complete line
    pub fn process_line(&mut self, line: &str) {
        self.status.lines += 1;

        match parse_line(line, &self.parser) {
            ParsedLine::Record(record) => self.collector.push(record),
            ParsedLine::Header(event) => self.apply_header(&event),
            ParsedLine::Boundary(DumpBoundary::Start) => self.start_dump(true),
            ParsedLine::Boundary(DumpBoundary::End) => {
                self.collector.boundary(DumpBoundary::End);
            }
            ParsedLine::NoMatch => {}
        }

        self.commit();
    }

    fn apply_header(&mut self, event: &HeaderEvent) {
        let owned = match &self.status.receiver {
            None => {
                log::info!("live feed belongs to device {}", event.device_id);
                self.status.receiver = Some(event.device_id.clone());
                true
            }
            Some(owner) if *owner != event.device_id => {
                if !self.pinned_receiver {
                    log::warn!("ignoring header for {} (feed owner is {})", event.device_id, owner);
                }
                false
            }
            Some(_) => true,
        };

        if event.starts_dump() {
            self.start_dump(owned || self.pinned_receiver);
        } else if owned {
            self.adopt_unowned();
        }

        if !owned {
            return;
        }

        self.network.observe_header(event);
        if event.seq_num.is_some() {
            self.status.reported_seq = event.seq_num;
        }
        if event.log_count.is_some() {
            self.status.reported_log_count = event.log_count;
        }
    }

    fn start_dump(&mut self, replaces: bool) {
        if replaces {
            self.replace_previous();
        }
        let dropped = self.collector.boundary(DumpBoundary::Start);
        if dropped > 0 {
            log::warn!("dump restarted, discarded {} records from the interrupted transfer", dropped);
        }
    }

    /// Forget every committed record and rebuild the aggregators from scratch.
    fn replace_previous(&mut self) {
        let replaced = self.records.len() + self.unowned.len();
        if replaced == 0 {
            return;
        }
        log::warn!("new dump replaces {} records collected before it", replaced);

        self.records.clear();
        self.unowned.clear();
        self.network = NetworkAggregator::new();
        if let Some(id) = &self.status.receiver {
            self.network.add_device(id);
        }
        self.signal = SignalAggregator::new(&self.signal_config);
        self.status.superseded += replaced;
    }

    fn adopt_unowned(&mut self) {
        if self.unowned.is_empty() || self.status.receiver.is_none() {
            return;
        }
        log::debug!("attributing {} earlier records to the feed owner", self.unowned.len());
        for record in std::mem::take(&mut self.unowned) {
            self.accept(record);
        }
    }

    fn accept(&mut self, record: TestRecord) {
        let Some(receiver) = self.status.receiver.clone() else {
            self.unowned.push(record);
            return;
        };
        let record = record.with_receiver(Some(&receiver));
        self.network.observe(&record);
        self.signal.observe(&record);
        self.records.push(record);
    }

    fn commit(&mut self) {
        for record in self.collector.take_committed() {
            self.accept(record);
        }
        self.status.records = (self.records.len() + self.unowned.len()) as u64;
        self.status.pending = self.collector.pending_len();
        self.status.in_dump = self.collector.in_dump();
        self.status.dumps_completed = self.collector.dumps_completed();
        self.status.discarded = self.collector.discarded();
    }

    /// Drop records of the dump in progress, e.g. before requesting a new one
    pub fn discard_pending(&mut self) -> usize {
        let dropped = self.collector.discard_pending();
        self.commit();
        dropped
    }

    pub fn status(&self) -> &StreamStatus {
        &self.status
    }

    pub fn network(&self) -> &NetworkAggregator {
        &self.network
    }

    pub fn signal(&self) -> &SignalAggregator {
        &self.signal
    }

    /// Flush pending records and return the final state.
    ///
    /// Every complete line has already been applied; an unterminated
    /// remainder is dropped since it may be a truncated record. Records
    /// whose receiver never became known are aggregated as unattributed.
    pub fn finish(mut self) -> StreamOutcome {
        if let Some(partial) = self.splitter.take_partial() {
            log::debug!("dropping unterminated line at end of feed: {:?}", partial);
        }

        let collector = std::mem::take(&mut self.collector);
        for record in collector.finish() {
            self.accept(record);
        }
        for record in std::mem::take(&mut self.unowned) {
            self.network.observe(&record);
            self.signal.observe(&record);
            self.records.push(record);
        }
        self.status.records = self.records.len() as u64;
        self.status.pending = 0;
        self.status.in_dump = false;

        StreamOutcome {
            receiver: self.status.receiver.clone(),
            records: self.records,
            network: self.network,
            signal: self.signal,
            status: self.status,
        }
    }
}
