//! Sender/receiver delivery accounting.
//!
//! Tracks how many test packets each device is believed to have sent and
//! how many each receiver logged, then derives per-link and overall loss.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::types::*;

/// Where a device's expected send count comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CountSource {
    /// Reported by the device's own header
    Declared,
    /// Highest sequence number seen, plus one
    Derived,
}

impl std::fmt::Display for CountSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CountSource::Declared => write!(f, "declared"),
            CountSource::Derived => write!(f, "derived"),
        }
    }
}

/// Delivery figures for one ordered sender/receiver pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkLoss {
    pub sender: DeviceId,
    pub receiver: DeviceId,
    pub expected: u64,
    pub received: u64,
    /// `(1 - received / expected) * 100`
    pub loss_pct: f64,
}

impl LinkLoss {
    pub fn is_lossless(&self) -> bool {
        self.loss_pct == 0.0
    }
}

/// Loss across the whole device set
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LossSummary {
    /// Every non-self pair whose sender has a non-zero expected count
    pub links: Vec<LinkLoss>,
    pub total_expected: u64,
    pub total_received: u64,
    pub overall_loss_pct: f64,
}

impl LossSummary {
    /// Links that lost at least one packet (or logged more than expected)
    pub fn lossy_links(&self) -> impl Iterator<Item = &LinkLoss> {
        self.links.iter().filter(|l| !l.is_lossless())
    }

    pub fn lossless_count(&self) -> usize {
        self.links.iter().filter(|l| l.is_lossless()).count()
    }
}

/// Overall verdict on the test run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetworkQuality {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl NetworkQuality {
    pub fn from_loss(loss_pct: f64) -> Self {
        if loss_pct < 1.0 {
            NetworkQuality::Excellent
        } else if loss_pct < 5.0 {
            NetworkQuality::Good
        } else if loss_pct < 10.0 {
            NetworkQuality::Fair
        } else {
            NetworkQuality::Poor
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            NetworkQuality::Excellent => "excellent (loss < 1%)",
            NetworkQuality::Good => "good (loss 1-5%)",
            NetworkQuality::Fair => "fair (loss 5-10%)",
            NetworkQuality::Poor => "poor (loss > 10%)",
        }
    }
}

/// Receive matrix and send counts for one analysis run.
#[derive(Debug, Clone, Default)]
pub struct NetworkAggregator {
    devices: BTreeSet<DeviceId>,
    max_sequence: BTreeMap<DeviceId, u64>,
    declared: BTreeMap<DeviceId, u64>,
    matrix: BTreeMap<DeviceId, BTreeMap<DeviceId, u64>>,
    unattributed: u64,
}

impl NetworkAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Account for one accepted record
    pub fn observe(&mut self, record: &TestRecord) {
        self.devices.insert(record.sender.clone());

        let max = self.max_sequence.entry(record.sender.clone()).or_insert(record.sequence);
        *max = (*max).max(record.sequence);

        match &record.receiver {
            Some(receiver) => {
                self.devices.insert(receiver.clone());
                *self
                    .matrix
                    .entry(record.sender.clone())
                    .or_default()
                    .entry(receiver.clone())
                    .or_insert(0) += 1;
            }
            None => self.unattributed += 1,
        }
    }

    /// Register a header; an explicit send count overrides the derived one
    pub fn observe_header(&mut self, event: &HeaderEvent) {
        self.devices.insert(event.device_id.clone());
        if let Some(seq_num) = event.seq_num {
            self.declared.insert(event.device_id.clone(), seq_num);
        }
    }

    /// Add a device known only as a log owner
    pub fn add_device(&mut self, device: &DeviceId) {
        self.devices.insert(device.clone());
    }

    /// Expected send count and its origin, if anything is known
    pub fn send_count(&self, device: &DeviceId) -> Option<(u64, CountSource)> {
        if let Some(declared) = self.declared.get(device) {
            return Some((*declared, CountSource::Declared));
        }
        self.max_sequence
            .get(device)
            .map(|max| (max + 1, CountSource::Derived))
    }

    /// Packets `device` is believed to have sent; 0 when unknown
    pub fn expected(&self, device: &DeviceId) -> u64 {
        self.send_count(device).map_or(0, |(count, _)| count)
    }

    pub fn received(&self, sender: &DeviceId, receiver: &DeviceId) -> u64 {
        self.matrix
            .get(sender)
            .and_then(|row| row.get(receiver))
            .copied()
            .unwrap_or(0)
    }

    /// All devices seen as senders or log owners, sorted
    pub fn devices(&self) -> impl Iterator<Item = &DeviceId> {
        self.devices.iter()
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    /// Records that had no receiver to attribute them to
    pub fn unattributed(&self) -> u64 {
        self.unattributed
    }

    /// Per-link and overall loss over every ordered non-self pair
    pub fn compute_loss(&self) -> LossSummary {
        let mut summary = LossSummary::default();

        for sender in &self.devices {
            let expected = self.expected(sender);
            if expected == 0 {
                continue;
            }

            for receiver in &self.devices {
                if sender == receiver {
                    continue;
                }
                let received = self.received(sender, receiver);
                summary.total_expected += expected;
                summary.total_received += received;
                summary.links.push(LinkLoss {
                    sender: sender.clone(),
                    receiver: receiver.clone(),
                    expected,
                    received,
                    loss_pct: loss_pct(received, expected),
                });
            }
        }

        summary.overall_loss_pct = loss_pct(summary.total_received, summary.total_expected);
        summary
    }

    /// Reset for a new run
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Loss percentage `(1 - received / expected) * 100`, 0 when nothing was expected
pub fn loss_pct(received: u64, expected: u64) -> f64 {
    if expected == 0 {
        return 0.0;
    }
    (expected as f64 - received as f64) * 100.0 / expected as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> DeviceId {
        s.parse().unwrap()
    }

    fn rec(sender: &str, receiver: &str, seq: u64) -> TestRecord {
        TestRecord {
            sender: id(sender),
            receiver: Some(id(receiver)),
            sequence: seq,
            tx_time: None,
            rx_time: None,
            snr: 0.0,
            rssi: -80,
            path_len: 1,
            grammar: LineGrammar::Extended,
        }
    }

    fn link<'a>(summary: &'a LossSummary, s: &str, r: &str) -> Option<&'a LinkLoss> {
        summary
            .links
            .iter()
            .find(|l| l.sender.as_str() == s && l.receiver.as_str() == r)
    }

    #[test]
    fn test_expected_is_max_sequence_plus_one() {
        let mut net = NetworkAggregator::new();
        net.observe(&rec("A", "B", 4));
        net.observe(&rec("A", "B", 2));
        assert_eq!(net.expected(&id("A")), 5);
        assert_eq!(net.send_count(&id("A")), Some((5, CountSource::Derived)));
        assert_eq!(net.expected(&id("B")), 0);
    }

    #[test]
    fn test_header_overrides_derived_count() {
        let mut net = NetworkAggregator::new();
        net.observe(&rec("A", "B", 4));
        net.observe_header(&HeaderEvent {
            device_id: id("A"),
            seq_num: Some(20),
            log_count: None,
            source: HeaderSource::DumpHeader,
        });
        net.observe(&rec("A", "B", 30));
        assert_eq!(net.send_count(&id("A")), Some((20, CountSource::Declared)));
    }

    #[test]
    fn test_three_device_scenario() {
        let mut net = NetworkAggregator::new();
        for seq in 0..8 {
            net.observe(&rec("A", "B", seq));
        }
        for seq in 0..10 {
            net.observe(&rec("C", "B", seq));
            net.observe(&rec("A", "C", seq));
        }

        let summary = net.compute_loss();
        assert_eq!(link(&summary, "A", "B").unwrap().loss_pct, 20.0);
        assert_eq!(link(&summary, "A", "C").unwrap().loss_pct, 0.0);
        assert_eq!(link(&summary, "C", "B").unwrap().loss_pct, 0.0);
        assert_eq!(link(&summary, "C", "A").unwrap().loss_pct, 100.0);
        // B never sent anything, so it contributes no rows
        assert!(link(&summary, "B", "A").is_none());
        assert!(summary.links.iter().all(|l| l.sender != l.receiver));

        assert_eq!(summary.total_expected, 40);
        assert_eq!(summary.total_received, 28);
        assert_eq!(summary.overall_loss_pct, 30.0);
    }

    #[test]
    fn test_perfect_delivery_is_zero_loss() {
        let mut net = NetworkAggregator::new();
        for seq in 0..3 {
            net.observe(&rec("A", "B", seq));
            net.observe(&rec("B", "A", seq));
        }
        let summary = net.compute_loss();
        assert_eq!(summary.overall_loss_pct, 0.0);
        assert_eq!(summary.lossy_links().count(), 0);
        assert_eq!(summary.lossless_count(), 2);
    }

    #[test]
    fn test_self_pairs_never_counted() {
        let mut net = NetworkAggregator::new();
        net.observe(&rec("A", "A", 9));
        let summary = net.compute_loss();
        assert!(summary.links.is_empty());
        assert_eq!(summary.total_expected, 0);
        assert_eq!(summary.overall_loss_pct, 0.0);
        assert_eq!(net.received(&id("A"), &id("A")), 1);
    }

    #[test]
    fn test_unattributed_records_only_feed_send_counts() {
        let mut net = NetworkAggregator::new();
        let mut r = rec("A", "B", 3);
        r.receiver = None;
        net.observe(&r);
        assert_eq!(net.unattributed(), 1);
        assert_eq!(net.expected(&id("A")), 4);
        assert_eq!(net.device_count(), 1);
    }

    #[test]
    fn test_quality_verdict_thresholds() {
        assert_eq!(NetworkQuality::from_loss(0.5), NetworkQuality::Excellent);
        assert_eq!(NetworkQuality::from_loss(1.0), NetworkQuality::Good);
        assert_eq!(NetworkQuality::from_loss(9.99), NetworkQuality::Fair);
        assert_eq!(NetworkQuality::from_loss(10.0), NetworkQuality::Poor);
    }

    #[test]
    fn test_clear_resets_state() {
        let mut net = NetworkAggregator::new();
        net.observe(&rec("A", "B", 1));
        net.clear();
        assert_eq!(net.device_count(), 0);
        assert!(net.compute_loss().links.is_empty());
    }
}
