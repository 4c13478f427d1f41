//! meshstat command-line interface.
//!
//! `analyze` reads a set of per-device log files and writes the text, CSV
//! and JSON reports. `live` attaches to a device feed, optionally requests
//! a dump, and exports what it collected.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Context, Result};

use meshstat::analysis::{self, report, DeviceId, Report};
use meshstat::config::{load_config, AnalyzerConfig};
use meshstat::live::{open_port, LiveSession};
use meshstat::utils::parse_duration;

#[derive(Parser)]
#[command(name = "meshstat")]
#[command(about = "Delivery and link-quality analysis for mesh radio test logs")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// YAML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Output directory for reports
    #[arg(short, long, global = true, default_value = "mesh_output")]
    output: PathBuf,

    /// Divisor applied to SNR in 6-field records
    #[arg(long, global = true)]
    snr_scale: Option<f64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze one log file per device
    Analyze {
        /// Device log files
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Number of parallel workers (0 = auto-detect)
        #[arg(short = 'j', long, default_value = "0")]
        threads: usize,
    },

    /// Collect records from a connected device
    Live {
        /// Serial port, e.g. /dev/ttyUSB0
        #[arg(short, long)]
        device: String,

        /// Serial baud rate (default from config, 115200)
        #[arg(short, long)]
        baud: Option<u32>,

        /// How long to listen before exporting
        #[arg(long, default_value = "30s", value_parser = parse_duration)]
        duration: Duration,

        /// Request a log dump on connect and stop once it completes
        #[arg(long)]
        dump: bool,

        /// Receiver id to attribute records to, overriding device headers
        #[arg(long)]
        receiver: Option<DeviceId>,

        /// Command to send on connect, e.g. "test status" (repeatable)
        #[arg(long = "send", value_name = "COMMAND")]
        commands: Vec<String>,
    },
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&cli.log_level))
        .init();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => AnalyzerConfig::default(),
    };
    if let Some(scale) = cli.snr_scale {
        config.parser.compact_snr_scale = scale;
    }

    match cli.command {
        Commands::Analyze { files, threads } => {
            config.validate()?;

            if threads > 0 {
                rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .build_global()
                    .context("Failed to configure thread pool")?;
            }

            run_analyze(&files, &config, &cli.output)
        }
        Commands::Live {
            device,
            baud,
            duration,
            dump,
            receiver,
            commands,
        } => {
            if receiver.is_some() {
                config.live.receiver = receiver;
            }
            if let Some(baud) = baud {
                config.live.baud_rate = baud;
            }
            config.validate()?;

            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("Failed to start async runtime")?;
            runtime.block_on(run_live(&device, duration, dump, &commands, &config, &cli.output))
        }
    }
}

fn run_analyze(files: &[PathBuf], config: &AnalyzerConfig, output: &Path) -> Result<()> {
    let result = analysis::analyze(files, config).context("Analysis failed")?;

    for failure in &result.failures {
        eprintln!("warning: skipped {}", failure);
    }

    report::write_reports(&result.report, output)?;
    report::print_summary(&result.report);
    Ok(())
}

async fn run_live(
    device: &str,
    duration: Duration,
    dump: bool,
    commands: &[String],
    config: &AnalyzerConfig,
    output: &Path,
) -> Result<()> {
    let port = open_port(device, config.live.baud_rate)?;
    let (reader, writer) = tokio::io::split(port);

    let mut session = LiveSession::start(reader, writer, config);
    log::info!("Listening on {} for {:?}", device, duration);

    for command in commands {
        session.send_command(command).await?;
    }

    if dump {
        session.request_dump().await?;
        tokio::select! {
            status = session.wait_for(|s| s.dumps_completed > 0) => {
                let status = status?;
                log::info!("Dump complete: {} records", status.records);
            }
            _ = tokio::time::sleep(duration) => {
                log::warn!("No complete dump within {:?}", duration);
            }
        }
    } else {
        tokio::select! {
            closed = session.feed_closed() => closed?,
            _ = tokio::time::sleep(duration) => {}
        }
    }

    let outcome = session.shutdown().await?;

    let exported = report::write_device_log(
        output,
        outcome.receiver.as_ref(),
        &outcome.records,
        chrono::Local::now(),
    )?;
    println!("Device log: {}", exported.display());

    let metadata = report::ReportMetadata {
        title: config.report.title.clone(),
        generated_at: chrono::Utc::now().to_rfc3339(),
        sources: Vec::new(),
        failures: Vec::new(),
    };
    let report = Report::build(&outcome.network, &outcome.signal, &outcome.records, metadata);
    report::write_reports(&report, output)?;
    report::print_summary(&report);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshstat::live::{CMD_INFO, CMD_STATUS};

    #[test]
    fn test_analyze_args() {
        let cli = Cli::parse_from(["meshstat", "analyze", "a.log", "b.log", "-j", "2", "--snr-scale", "1"]);
        assert_eq!(cli.output, PathBuf::from("mesh_output"));
        assert_eq!(cli.snr_scale, Some(1.0));
        match cli.command {
            Commands::Analyze { files, threads } => {
                assert_eq!(files, vec![PathBuf::from("a.log"), PathBuf::from("b.log")]);
                assert_eq!(threads, 2);
            }
            _ => panic!("expected analyze"),
        }
    }

    #[test]
    fn test_analyze_requires_files() {
        assert!(Cli::try_parse_from(["meshstat", "analyze"]).is_err());
    }

    #[test]
    fn test_live_args() {
        let cli = Cli::parse_from([
            "meshstat", "live", "--device", "/dev/ttyUSB0", "--baud", "9600", "--duration", "2m", "--dump", "--receiver", "69f5",
            "--send", CMD_STATUS, "--send", CMD_INFO,
        ]);
        match cli.command {
            Commands::Live {
                device,
                baud,
                duration,
                dump,
                receiver,
                commands,
            } => {
                assert_eq!(device, "/dev/ttyUSB0");
                assert_eq!(baud, Some(9600));
                assert_eq!(duration, Duration::from_secs(120));
                assert!(dump);
                assert_eq!(receiver.as_ref().map(DeviceId::as_str), Some("69F5"));
                assert_eq!(commands, vec!["test status", "test info"]);
            }
            _ => panic!("expected live"),
        }
    }

    #[test]
    fn test_live_default_duration() {
        let cli = Cli::parse_from(["meshstat", "live", "--device", "/dev/ttyACM0"]);
        match cli.command {
            Commands::Live { duration, dump, baud, .. } => {
                assert_eq!(baud, None);
                assert_eq!(duration, Duration::from_secs(30));
                assert!(!dump);
            }
            _ => panic!("expected live"),
        }
    }
}
