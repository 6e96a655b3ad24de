//! Replays recorded sensor notifications through the protocol engine.
//!
//! Useful for checking a firmware build against the engine without a BLE
//! link: capture the notifications once, then replay them here.

mod capture;
mod replay;
mod report;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use colored::Colorize;
use tokio::runtime::Handle;
use tokio::sync::mpsc;

use spectro_link::calibration::{CalibrationDispatcher, HttpCalibrator};
use spectro_link::config::{self, CalibrationConfig, SessionConfig};
use spectro_link::history::{history_task, CalibratedHistory};
use spectro_link::session::{CommandSession, SessionEvent};

use capture::Capture;
use replay::{replay_capture, DryRun};
use report::{CalibrationTally, ReplayReport};

#[derive(Parser)]
#[command(name = "spectro-replay")]
#[command(about = "Replay captured sensor notifications through the protocol engine")]
struct Args {
    /// Capture file (JSON)
    capture: PathBuf,

    /// Response timeout in milliseconds
    #[arg(long, default_value_t = config::session::RESPONSE_TIMEOUT_MS)]
    timeout_ms: u64,

    /// Send validated scans to a calibration service (default endpoint if no URL given)
    #[arg(long, num_args = 0..=1, default_missing_value = config::calibration::ENDPOINT)]
    calibrate: Option<String>,

    /// Seconds to wait for outstanding calibrations
    #[arg(long, default_value = "30")]
    calibration_wait: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = Args::parse();
    let capture = Capture::load(&args.capture)?;
    let session_config = SessionConfig {
        response_timeout: Duration::from_millis(args.timeout_ms),
    };

    println!("{}", "Spectro-Link Replay".bold());
    println!("Capture: {}", args.capture.display());
    println!("Exchanges: {}", capture.exchanges.len());

    let report = match args.calibrate {
        Some(endpoint) => {
            let wait = Duration::from_secs(args.calibration_wait);
            replay_with_calibration(&capture, session_config, endpoint, wait).await?
        }
        None => {
            println!();
            let mut session = CommandSession::new(session_config, DryRun);
            ReplayReport {
                exchanges: replay_capture(&mut session, &capture),
                calibration: None,
            }
        }
    };

    report.print();

    // Exit with error code if any check failed
    if report.failed() > 0 {
        std::process::exit(1);
    }

    Ok(())
}

/// Replay the capture, calibrating every validated scan against `endpoint`.
async fn replay_with_calibration(
    capture: &Capture,
    session_config: SessionConfig,
    endpoint: String,
    wait: Duration,
) -> anyhow::Result<ReplayReport> {
    let calibrator = HttpCalibrator::new(&CalibrationConfig { endpoint })?;
    println!("Calibration: {}", calibrator.endpoint());
    println!();

    let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let recorder = tokio::spawn(history_task(CalibratedHistory::new(), outcome_rx, event_tx));

    let dispatcher = CalibrationDispatcher::new(calibrator, Handle::current(), outcome_tx);
    let mut session = CommandSession::new(session_config, dispatcher);
    let exchanges = replay_capture(&mut session, capture);

    // The recorder stops once the last in-flight calibration has reported
    drop(session);
    println!("  Waiting for calibration results...");

    let history = tokio::time::timeout(wait, recorder)
        .await
        .context("Calibration did not finish in time")??;

    let mut calibrated = 0;
    let mut failures = Vec::new();
    while let Ok(event) = event_rx.try_recv() {
        match event {
            SessionEvent::History(_) => calibrated += 1,
            SessionEvent::Failed(failure) => failures.push(failure.to_string()),
            _ => {}
        }
    }

    let tally = CalibrationTally {
        dispatched: exchanges.iter().filter(|v| v.outcome == "scan").count(),
        calibrated,
        failures,
        history_len: history.len(),
    };

    Ok(ReplayReport {
        exchanges,
        calibration: Some(tally),
    })
}
