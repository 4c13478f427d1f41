//! Batch analysis pipeline: read every source, aggregate, build the report.

use std::path::PathBuf;

use chrono::Utc;

use super::network::NetworkAggregator;
use super::report::{Report, ReportMetadata, SourceSummary};
use super::signal::SignalAggregator;
use super::source::parse_all_logs;
use super::types::*;
use crate::config::AnalyzerConfig;
use crate::error::AnalysisError;

/// Result of a batch run over a set of log files
#[derive(Debug, Clone)]
pub struct Analysis {
    pub logs: Vec<DeviceLog>,
    pub failures: Vec<SourceFailure>,
    pub network: NetworkAggregator,
    pub signal: SignalAggregator,
    pub report: Report,
}

/// Feed parsed logs into fresh aggregators, in input order
pub fn aggregate_logs(logs: &[DeviceLog], config: &AnalyzerConfig) -> (NetworkAggregator, SignalAggregator) {
    let mut network = NetworkAggregator::new();
    let mut signal = SignalAggregator::new(&config.signal);

    for log in logs {
        if let Some(receiver) = &log.receiver {
            network.add_device(receiver);
            if log.declared_sent.is_some() {
                network.observe_header(&HeaderEvent {
                    device_id: receiver.clone(),
                    seq_num: log.declared_sent,
                    log_count: log.log_count,
                    source: HeaderSource::DumpHeader,
                });
            }
        }

        for record in &log.records {
            network.observe(record);
            signal.observe(record);
        }
    }

    if network.unattributed() > 0 {
        log::warn!(
            "{} records came from logs with no receiver id and only count towards send totals",
            network.unattributed()
        );
    }

    (network, signal)
}

/// Analyze a set of device log files.
///
/// Unreadable sources are reported in the result; the run only fails when
/// no paths are given or none of them could be read.
pub fn analyze(paths: &[PathBuf], config: &AnalyzerConfig) -> Result<Analysis, AnalysisError> {
    if paths.is_empty() {
        return Err(AnalysisError::NoInput);
    }

    let (logs, failures) = parse_all_logs(paths, &config.parser);
    if logs.is_empty() {
        return Err(AnalysisError::NoReadableInput { failures });
    }

    let (network, signal) = aggregate_logs(&logs, config);

    let records: Vec<TestRecord> = logs.iter().flat_map(|log| log.records.iter().cloned()).collect();
    let metadata = ReportMetadata {
        title: config.report.title.clone(),
        generated_at: Utc::now().to_rfc3339(),
        sources: logs.iter().map(SourceSummary::from_log).collect(),
        failures: failures.clone(),
    };
    let report = Report::build(&network, &signal, &records, metadata);

    log::info!(
        "Analyzed {} records from {} devices ({} sources, {} unreadable)",
        records.len(),
        network.device_count(),
        logs.len(),
        failures.len()
    );

    Ok(Analysis {
        logs,
        failures,
        network,
        signal,
        report,
    })
}
