#[cfg(test)]
mod analysis_tests {
    use std::fmt::Write as _;
    use std::fs;
    use std::path::{Path, PathBuf};

    use tempfile::TempDir;

    use meshstat::analysis::network::NetworkQuality;
    use meshstat::analysis::{self, read_log_file, DeviceId};
    use meshstat::config::AnalyzerConfig;
    use meshstat::error::AnalysisError;

    fn id(s: &str) -> DeviceId {
        s.parse().unwrap()
    }

    fn extended(sender: &str, seqs: std::ops::Range<u64>) -> String {
        let mut out = String::new();
        for seq in seqs {
            writeln!(out, "{},{},{},{},6,-88,1", sender, seq, 1000 + seq, 1002 + seq).unwrap();
        }
        out
    }

    fn compact(sender: &str, seqs: std::ops::Range<u64>) -> String {
        let mut out = String::new();
        for seq in seqs {
            writeln!(out, "{},{},{},-10,-104,2", sender, seq, 2000 + seq).unwrap();
        }
        out
    }

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    /// AAAA and CCCC each send ten packets; BBBB sends none.
    /// BBBB hears 8 from AAAA and all 10 from CCCC, CCCC hears all of AAAA,
    /// AAAA hears nothing.
    fn three_device_logs(dir: &Path) -> Vec<PathBuf> {
        let a = write(dir, "node_a.log", "# Receiver Device ID: AAAA\n#\n");
        let b = write(
            dir,
            "node_b.log",
            &format!(
                "freq: 869.525\nTESTLOG BBBB 0 18\n{}{}TESTLOG_END\n",
                extended("AAAA", 0..8),
                extended("CCCC", 0..10)
            ),
        );
        let c = write(
            dir,
            "node_c.log",
            &format!("# Receiver Device ID: CCCC\n{}", compact("AAAA", 0..10)),
        );
        vec![a, b, c]
    }

    #[test]
    fn test_three_device_loss() {
        let dir = TempDir::new().unwrap();
        let files = three_device_logs(dir.path());

        let result = analysis::analyze(&files, &AnalyzerConfig::default()).unwrap();
        assert!(result.failures.is_empty());
        assert_eq!(result.logs.len(), 3);

        let summary = result.network.compute_loss();
        let loss = |s: &str, r: &str| {
            summary
                .links
                .iter()
                .find(|l| l.sender == id(s) && l.receiver == id(r))
                .map(|l| l.loss_pct)
        };
        assert_eq!(loss("AAAA", "BBBB"), Some(20.0));
        assert_eq!(loss("AAAA", "CCCC"), Some(0.0));
        assert_eq!(loss("CCCC", "BBBB"), Some(0.0));
        assert_eq!(loss("CCCC", "AAAA"), Some(100.0));
        assert_eq!(loss("BBBB", "AAAA"), None);

        assert_eq!(summary.total_expected, 40);
        assert_eq!(summary.total_received, 28);
        assert_eq!(summary.overall_loss_pct, 30.0);
        assert_eq!(result.report.loss.verdict, NetworkQuality::Poor);

        // Compact SNR is scaled, extended SNR is not
        let snr = result.report.signal.snr.unwrap();
        assert_eq!(snr.min, -2.5);
        assert_eq!(snr.max, 6.0);
        assert_eq!(result.report.signal.samples, 28);
    }

    #[test]
    fn test_unreadable_source_is_reported() {
        let dir = TempDir::new().unwrap();
        let mut files = three_device_logs(dir.path());
        files.push(dir.path().join("missing.log"));

        let result = analysis::analyze(&files, &AnalyzerConfig::default()).unwrap();
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].path, dir.path().join("missing.log"));
        assert_eq!(result.network.compute_loss().overall_loss_pct, 30.0);

        let text = analysis::render_text(&result.report);
        assert!(text.contains("missing.log"));
    }

    #[test]
    fn test_no_readable_sources_is_an_error() {
        let dir = TempDir::new().unwrap();
        let files = vec![dir.path().join("one.log"), dir.path().join("two.log")];

        match analysis::analyze(&files, &AnalyzerConfig::default()) {
            Err(AnalysisError::NoReadableInput { failures }) => assert_eq!(failures.len(), 2),
            other => panic!("unexpected {:?}", other.map(|a| a.logs.len())),
        }
    }

    #[test]
    fn test_restarted_dump_in_file() {
        let dir = TempDir::new().unwrap();
        let path = write(
            dir.path(),
            "restart.log",
            &format!(
                "TESTLOG BBBB 5 3\n{}TESTLOG BBBB 5 2\n{}TESTLOG_END\n",
                extended("AAAA", 0..3),
                extended("AAAA", 0..2)
            ),
        );

        let log = read_log_file(&path, &AnalyzerConfig::default().parser).unwrap();
        assert_eq!(log.receiver, Some(id("BBBB")));
        assert_eq!(log.declared_sent, Some(5));
        assert_eq!(log.records.len(), 2);
        assert_eq!(log.discarded, 3);
        assert!(log.records.iter().all(|r| r.receiver == Some(id("BBBB"))));
    }

    #[test]
    fn test_noise_only_file_is_an_empty_run() {
        let dir = TempDir::new().unwrap();
        let path = write(dir.path(), "noise.log", "freq: 869.525\n# MeshCore Network Test Log\nEntries: 0 / 1000\n");

        let result = analysis::analyze(&[path], &AnalyzerConfig::default()).unwrap();
        assert!(result.failures.is_empty());
        assert_eq!(result.logs.len(), 1);
        assert!(result.logs[0].records.is_empty());

        let summary = result.network.compute_loss();
        assert_eq!(summary.total_expected, 0);
        assert_eq!(summary.overall_loss_pct, 0.0);
        assert!(result.report.signal.snr.is_none());

        let text = analysis::render_text(&result.report);
        assert!(text.contains("No signal samples"));
    }

    #[test]
    fn test_repeated_dump_in_file_counts_once() {
        let dir = TempDir::new().unwrap();
        let dump = format!("TESTLOG BBBB 0 10\n{}TESTLOG_END\n", extended("AAAA", 0..10));
        let path = write(dir.path(), "twice.log", &format!("{dump}freq: 869.525\n{dump}"));

        let result = analysis::analyze(&[path], &AnalyzerConfig::default()).unwrap();
        assert_eq!(result.logs[0].records.len(), 10);
        assert_eq!(result.logs[0].superseded, 10);

        let summary = result.network.compute_loss();
        assert_eq!(summary.total_expected, 10);
        assert_eq!(summary.total_received, 10);
        assert_eq!(summary.overall_loss_pct, 0.0);
    }

    #[test]
    fn test_reports_written_and_csv_reingests() {
        let dir = TempDir::new().unwrap();
        let files = three_device_logs(dir.path());
        let out = dir.path().join("out");

        let result = analysis::analyze(&files, &AnalyzerConfig::default()).unwrap();
        let written = analysis::write_reports(&result.report, &out).unwrap();
        assert!(written.text.exists());
        assert!(written.json.exists());

        let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(&written.json).unwrap()).unwrap();
        assert_eq!(json["loss"]["total_expected"], 40);

        let again = analysis::analyze(&[written.csv.clone()], &AnalyzerConfig::default()).unwrap();
        assert_eq!(again.logs[0].records.len(), result.report.records.len());
        let summary = again.network.compute_loss();
        assert_eq!(summary.total_received, 28);
        assert_eq!(summary.overall_loss_pct, 30.0);
    }

    #[test]
    fn test_device_log_export_reingests() {
        let dir = TempDir::new().unwrap();
        let files = three_device_logs(dir.path());
        let log = read_log_file(&files[2], &AnalyzerConfig::default().parser).unwrap();

        let now = chrono::DateTime::parse_from_rfc3339("2026-03-01T12:30:05+00:00").unwrap();
        let exported = analysis::write_device_log(dir.path(), log.receiver.as_ref(), &log.records, now).unwrap();
        assert_eq!(exported.file_name().unwrap(), "mesh_test_CCCC_20260301_123005.csv");

        let reread = read_log_file(&exported, &AnalyzerConfig::default().parser).unwrap();
        assert_eq!(reread.receiver, Some(id("CCCC")));
        assert_eq!(reread.records.len(), 10);
        assert_eq!(reread.records[3].snr, -2.5);
        assert_eq!(reread.records[3].rx_time, Some(2003));
    }
}
