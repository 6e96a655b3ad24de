//! Replays captured exchanges through a command session.

use std::time::Instant;

use spectro_link::calibration::CalibrationSink;
use spectro_link::protocol::SensorId;
use spectro_link::session::{ChunkOutcome, CommandSession, Completion};

use crate::capture::{Capture, Exchange, Expectation};
use crate::report::ExchangeVerdict;

/// Sink used when no calibration endpoint is given.
pub struct DryRun;

impl CalibrationSink for DryRun {
    fn dispatch(&self, sensor_id: SensorId, payload: String) {
        log::info!(
            "Skipping calibration of {} byte scan from sensor {}",
            payload.len(),
            sensor_id
        );
    }
}

/// Replay every exchange in order, printing verdicts as it goes.
pub fn replay_capture<S: CalibrationSink>(
    session: &mut CommandSession<S>,
    capture: &Capture,
) -> Vec<ExchangeVerdict> {
    capture
        .exchanges
        .iter()
        .map(|exchange| {
            print!("  {} ... ", exchange.name);
            std::io::Write::flush(&mut std::io::stdout()).ok();

            let verdict = replay_exchange(session, exchange);
            verdict.print_inline();
            verdict
        })
        .collect()
}

fn replay_exchange<S: CalibrationSink>(
    session: &mut CommandSession<S>,
    exchange: &Exchange,
) -> ExchangeVerdict {
    let (outcome, mismatch) = match feed(session, exchange) {
        Ok(outcome) => (outcome_label(&outcome), check(&outcome, &exchange.expect).err()),
        Err(message) => ("not issued".to_string(), Some(message)),
    };

    ExchangeVerdict {
        name: exchange.name.clone(),
        command: exchange.command.into(),
        outcome,
        mismatch,
    }
}

/// Short name of what the session made of an exchange
fn outcome_label(outcome: &ChunkOutcome) -> String {
    match outcome {
        ChunkOutcome::Completed(Completion::Info(_)) => "info".into(),
        ChunkOutcome::Completed(Completion::Scan(_)) => "scan".into(),
        ChunkOutcome::Failed(failure) => failure.kind().into(),
        ChunkOutcome::Pending | ChunkOutcome::Ignored => "unfinished".into(),
    }
}

/// Issue the exchange's command and feed its chunks until it terminates.
///
/// A capture that ends before the terminator is treated as having waited
/// out the response timeout.
fn feed<S: CalibrationSink>(
    session: &mut CommandSession<S>,
    exchange: &Exchange,
) -> Result<ChunkOutcome, String> {
    session
        .issue(exchange.command.into(), Instant::now())
        .map_err(|failure| format!("Could not issue command: {}", failure))?;

    let mut chunks = exchange.chunks.iter();
    for chunk in chunks.by_ref() {
        match session.handle_chunk(chunk) {
            ChunkOutcome::Pending => continue,
            outcome => {
                let leftover = chunks.len();
                if leftover > 0 {
                    log::warn!("{} chunks after the terminator were not replayed", leftover);
                }
                return Ok(outcome);
            }
        }
    }

    let deadline = session.deadline().ok_or("Session went idle without a result")?;
    session
        .check_timeout(deadline)
        .map(ChunkOutcome::Failed)
        .ok_or_else(|| "Response did not time out at its deadline".to_string())
}

fn check(outcome: &ChunkOutcome, expect: &Expectation) -> Result<(), String> {
    match (outcome, expect) {
        (ChunkOutcome::Completed(Completion::Info(text)), Expectation::Info { text: expected }) => {
            if text == expected {
                Ok(())
            } else {
                Err(format!("Expected info {:?}, got {:?}", expected, text))
            }
        }
        (
            ChunkOutcome::Completed(Completion::Scan(report)),
            Expectation::Scan {
                sensor_id,
                measurements,
            },
        ) => {
            let actual_id = report.record.sensor_id.to_string();
            if let Some(expected) = sensor_id.as_ref().filter(|id| **id != actual_id) {
                return Err(format!("Expected sensor {}, got {}", expected, actual_id));
            }
            let count = report.record.measurements.len();
            if let Some(expected) = measurements.filter(|n| *n != count) {
                return Err(format!("Expected {} measurements, got {}", expected, count));
            }
            Ok(())
        }
        (ChunkOutcome::Failed(failure), Expectation::Failure { kind }) => {
            if failure.kind() == kind {
                Ok(())
            } else {
                Err(format!("Expected {} failure, got: {}", kind, failure))
            }
        }
        (ChunkOutcome::Failed(failure), _) => Err(format!("Unexpected failure: {}", failure)),
        (outcome, expect) => Err(format!("Expected {:?}, got {:?}", expect, outcome)),
    }
}
