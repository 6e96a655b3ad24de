//! Command session state machine
//!
//! Tracks the single outstanding command and owns the buffer its response
//! is reassembled in.
//!
//! ```text
//!          issue(cmd)                 terminator, error,
//!   Idle ──────────────▶ Awaiting ──  timeout or reset  ──▶ Idle
//!                         │    ▲
//!                         └────┘ start / continuation
//! ```
//!
//! A completed scan runs the validation pipeline before the session returns
//! to idle, then hands the payload to calibration without waiting for it.

use std::time::Instant;

use crate::calibration::CalibrationSink;
use crate::commands::{Command, Failure};
use crate::config::SessionConfig;
use crate::protocol::{validate_scan, CompletedResponse, Progress, ResponseAccumulator, ScanReport};

/// Successful end of a command
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    /// Info string reported by the device
    Info(String),
    /// Validated scan, already dispatched for calibration
    Scan(ScanReport),
}

/// What handling a notification led to
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkOutcome {
    /// No command is outstanding; the notification was dropped
    Ignored,
    /// The response is still incomplete
    Pending,
    /// The command completed; the session is idle again
    Completed(Completion),
    /// The command failed; the session is idle again
    Failed(Failure),
}

enum State {
    Idle,
    Awaiting {
        issued_at: Instant,
        accumulator: ResponseAccumulator,
    },
}

/// Session with a single sensor
pub struct CommandSession<S> {
    config: SessionConfig,
    state: State,
    calibration: S,
}

impl<S: CalibrationSink> CommandSession<S> {
    /// Create an idle session
    pub fn new(config: SessionConfig, calibration: S) -> Self {
        Self {
            config,
            state: State::Idle,
            calibration,
        }
    }

    /// Command currently awaiting its response, if any
    pub fn outstanding(&self) -> Option<Command> {
        match &self.state {
            State::Idle => None,
            State::Awaiting { accumulator, .. } => Some(accumulator.command()),
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.state, State::Idle)
    }

    /// Receiver of validated scans
    pub fn calibration(&self) -> &S {
        &self.calibration
    }

    /// Commit to `command`, returning the bytes to write to the device
    ///
    /// Fails with [`Failure::Busy`] while another command is outstanding;
    /// the outstanding command is unaffected.
    pub fn issue(&mut self, command: Command, now: Instant) -> Result<&'static [u8], Failure> {
        if let Some(outstanding) = self.outstanding() {
            log::warn!("Cannot issue {}: {} is in progress", command, outstanding);
            return Err(Failure::Busy(outstanding));
        }

        log::info!("Issuing {}", command);
        self.state = State::Awaiting {
            issued_at: now,
            accumulator: ResponseAccumulator::new(command),
        };
        Ok(command.as_bytes())
    }

    /// Handle one notification from the device
    pub fn handle_chunk(&mut self, chunk: &str) -> ChunkOutcome {
        let State::Awaiting { accumulator, .. } = &mut self.state else {
            log::warn!("Unexpected notification: {:?}", chunk);
            return ChunkOutcome::Ignored;
        };

        log::debug!("Notification: {:?}", chunk);
        let command = accumulator.command();
        let progress = accumulator.push(chunk);

        let outcome = match progress {
            Progress::Pending => return ChunkOutcome::Pending,
            Progress::Rejected { code } => Err(Failure::CommandError { command, code }),
            Progress::MissingStart => Err(Failure::MissingStart(command)),
            Progress::Complete(CompletedResponse::Info { text }) => {
                log::info!("Info: {}", text);
                Ok(Completion::Info(text))
            }
            Progress::Complete(CompletedResponse::Scan {
                declared_length,
                payload,
            }) => validate_scan(declared_length, payload).map(|report| {
                self.calibration
                    .dispatch(report.record.sensor_id.clone(), report.payload.clone());
                Completion::Scan(report)
            }),
        };

        self.state = State::Idle;
        match outcome {
            Ok(completion) => ChunkOutcome::Completed(completion),
            Err(failure) => {
                log::warn!("{}", failure);
                ChunkOutcome::Failed(failure)
            }
        }
    }

    /// Instant at which the outstanding command times out
    pub fn deadline(&self) -> Option<Instant> {
        match &self.state {
            State::Idle => None,
            State::Awaiting { issued_at, .. } => Some(*issued_at + self.config.response_timeout),
        }
    }

    /// Fail the outstanding command if its response is overdue at `now`
    pub fn check_timeout(&mut self, now: Instant) -> Option<Failure> {
        let deadline = self.deadline()?;
        if now < deadline {
            return None;
        }

        let command = self.reset()?;
        log::warn!("{} timed out", command);
        Some(Failure::Timeout(command))
    }

    /// Withdraw a command whose bytes never reached the device
    ///
    /// Only a command with no response text yet is withdrawn. Returns it.
    pub fn abort_issue(&mut self) -> Option<Command> {
        let unanswered = matches!(
            &self.state,
            State::Awaiting { accumulator, .. } if accumulator.is_empty()
        );
        if unanswered {
            self.reset()
        } else {
            None
        }
    }

    /// Return to idle, discarding any partial response
    ///
    /// Used when the link goes down. Returns the command that was
    /// outstanding.
    pub fn reset(&mut self) -> Option<Command> {
        let command = self.outstanding();
        self.state = State::Idle;
        command
    }
}
