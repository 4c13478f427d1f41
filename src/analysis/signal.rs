//! Radio quality statistics: SNR, RSSI, hop counts and delivery delay.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::types::*;
use crate::config::{RssiBand, SignalConfig};

/// Running count/sum/min/max over a numeric sample stream.
#[derive(Debug, Clone, PartialEq)]
pub struct RunningStats<T> {
    count: u64,
    sum: f64,
    min: Option<T>,
    max: Option<T>,
}

impl<T> Default for RunningStats<T> {
    fn default() -> Self {
        Self {
            count: 0,
            sum: 0.0,
            min: None,
            max: None,
        }
    }
}

impl<T: Copy + PartialOrd + Into<f64>> RunningStats<T> {
    pub fn push(&mut self, value: T) {
        self.count += 1;
        self.sum += value.into();
        if self.min.map_or(true, |m| value < m) {
            self.min = Some(value);
        }
        if self.max.map_or(true, |m| value > m) {
            self.max = Some(value);
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn min(&self) -> Option<T> {
        self.min
    }

    pub fn max(&self) -> Option<T> {
        self.max
    }

    /// Mean, or `None` with no samples
    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }

    /// Serializable snapshot, `None` with no samples
    pub fn summary(&self) -> Option<StatsSummary> {
        Some(StatsSummary {
            count: self.count,
            min: self.min?.into(),
            max: self.max?.into(),
            mean: self.mean()?,
        })
    }
}

/// Snapshot of a non-empty [`RunningStats`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

/// Sample count for one RSSI band
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BandCount {
    pub label: String,
    pub min_dbm: Option<i32>,
    pub count: u64,
}

/// Running SNR/RSSI/hop statistics over every accepted record.
#[derive(Debug, Clone)]
pub struct SignalAggregator {
    bands: Vec<RssiBand>,
    band_counts: Vec<u64>,
    unclassified: u64,
    snr: RunningStats<f64>,
    rssi: RunningStats<i32>,
    delay: RunningStats<f64>,
    hops: BTreeMap<u32, u64>,
    link_snr: BTreeMap<(DeviceId, DeviceId), RunningStats<f64>>,
}

impl Default for SignalAggregator {
    fn default() -> Self {
        Self::new(&SignalConfig::default())
    }
}

impl SignalAggregator {
    pub fn new(config: &SignalConfig) -> Self {
        let mut bands = config.rssi_bands.clone();
        bands.sort_by(|a, b| b.min_dbm.cmp(&a.min_dbm));
        let band_counts = vec![0; bands.len()];
        Self {
            bands,
            band_counts,
            unclassified: 0,
            snr: RunningStats::default(),
            rssi: RunningStats::default(),
            delay: RunningStats::default(),
            hops: BTreeMap::new(),
            link_snr: BTreeMap::new(),
        }
    }

    pub fn observe(&mut self, record: &TestRecord) {
        self.snr.push(record.snr);
        self.rssi.push(record.rssi);
        *self.hops.entry(record.path_len).or_insert(0) += 1;

        match self.classify(record.rssi) {
            Some(index) => self.band_counts[index] += 1,
            None => self.unclassified += 1,
        }

        if record.has_delay() {
            self.delay.push(record.delay() as f64);
        }

        if let Some(receiver) = &record.receiver {
            self.link_snr
                .entry((record.sender.clone(), receiver.clone()))
                .or_default()
                .push(record.snr);
        }
    }

    /// Index of the first band (strongest first) the sample reaches
    pub fn classify(&self, rssi: i32) -> Option<usize> {
        self.bands.iter().position(|band| rssi >= band.min_dbm)
    }

    pub fn snr(&self) -> &RunningStats<f64> {
        &self.snr
    }

    pub fn rssi(&self) -> &RunningStats<i32> {
        &self.rssi
    }

    /// Delivery delay in seconds, over records with both timestamps
    pub fn delay(&self) -> &RunningStats<f64> {
        &self.delay
    }

    /// Hop count to number of records
    pub fn hop_histogram(&self) -> &BTreeMap<u32, u64> {
        &self.hops
    }

    /// Band counts strongest first, then the unclassified bucket
    pub fn band_counts(&self) -> Vec<BandCount> {
        let mut counts: Vec<BandCount> = self
            .bands
            .iter()
            .zip(&self.band_counts)
            .map(|(band, count)| BandCount {
                label: band.label.clone(),
                min_dbm: Some(band.min_dbm),
                count: *count,
            })
            .collect();
        counts.push(BandCount {
            label: "unclassified".to_string(),
            min_dbm: None,
            count: self.unclassified,
        });
        counts
    }

    pub fn link_snr(&self, sender: &DeviceId, receiver: &DeviceId) -> Option<f64> {
        self.link_snr
            .get(&(sender.clone(), receiver.clone()))
            .and_then(RunningStats::mean)
    }

    pub fn sample_count(&self) -> u64 {
        self.snr.count()
    }

    /// Reset for a new run, keeping the band layout
    pub fn clear(&mut self) {
        self.band_counts.iter_mut().for_each(|c| *c = 0);
        self.unclassified = 0;
        self.snr = RunningStats::default();
        self.rssi = RunningStats::default();
        self.delay = RunningStats::default();
        self.hops.clear();
        self.link_snr.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(snr: f64, rssi: i32, path_len: u32) -> TestRecord {
        TestRecord {
            sender: "A".parse().unwrap(),
            receiver: Some("B".parse().unwrap()),
            sequence: 0,
            tx_time: Some(100),
            rx_time: Some(102),
            snr,
            rssi,
            path_len,
            grammar: LineGrammar::Extended,
        }
    }

    #[test]
    fn test_empty_aggregator_has_no_means() {
        let signal = SignalAggregator::default();
        assert!(signal.snr().mean().is_none());
        assert!(signal.rssi().summary().is_none());
        assert!(signal.hop_histogram().is_empty());
        assert!(signal.band_counts().iter().all(|b| b.count == 0));
    }

    #[test]
    fn test_running_stats() {
        let mut signal = SignalAggregator::default();
        signal.observe(&rec(-2.25, -92, 2));
        signal.observe(&rec(6.5, -64, 1));
        signal.observe(&rec(1.0, -101, 2));

        let snr = signal.snr().summary().unwrap();
        assert_eq!(snr.count, 3);
        assert_eq!(snr.min, -2.25);
        assert_eq!(snr.max, 6.5);
        assert!((snr.mean - 1.75).abs() < 1e-9);

        assert_eq!(signal.rssi().min(), Some(-101));
        assert_eq!(signal.rssi().max(), Some(-64));
        assert_eq!(signal.hop_histogram().get(&2), Some(&2));
        assert_eq!(signal.delay().mean(), Some(2.0));
        assert!((signal.link_snr(&"A".parse().unwrap(), &"B".parse().unwrap()).unwrap() - 1.75).abs() < 1e-9);
    }

    #[test]
    fn test_rssi_bands_first_match_wins() {
        let mut signal = SignalAggregator::default();
        for rssi in [-70, -71, -85, -100, -120, -121] {
            signal.observe(&rec(0.0, rssi, 0));
        }
        let counts: Vec<u64> = signal.band_counts().iter().map(|b| b.count).collect();
        assert_eq!(counts, vec![1, 2, 1, 1, 1]);
        assert_eq!(signal.band_counts().last().unwrap().label, "unclassified");
    }

    #[test]
    fn test_clear_keeps_bands() {
        let mut signal = SignalAggregator::default();
        signal.observe(&rec(0.0, -60, 0));
        signal.clear();
        assert_eq!(signal.sample_count(), 0);
        assert_eq!(signal.band_counts().len(), 5);
    }
}
