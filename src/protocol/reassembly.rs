//! Response accumulator for fragmented AT notifications
//!
//! Accumulates notification text for one outstanding command until its
//! terminator arrives. The result does not depend on where the transport
//! split the response: text before the start line is held until it can be
//! classified, and the `\nOK\n` trailer is matched against the whole body.

use crate::commands::grammar::{Classification, ResponseGrammar};
use crate::commands::types::Command;
use crate::config::protocol::OK_TERMINATOR;

/// A fully reassembled response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletedResponse {
    /// Body of an `AT+SCAN` response and the length the device announced for it
    Scan {
        declared_length: usize,
        payload: String,
    },
    /// Body of an `AT+INFO` response
    Info { text: String },
}

/// Result of pushing a notification into the accumulator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress {
    /// More notifications are needed
    Pending,
    /// The terminator arrived
    Complete(CompletedResponse),
    /// The device answered `ERROR: <code>`
    Rejected { code: u32 },
    /// The terminator arrived before any start line
    MissingStart,
}

enum Phase {
    /// Nothing recognised yet; text is held until it classifies
    AwaitingStart { preamble: String },
    /// Start line seen; body accumulates until the terminator
    Body {
        declared_length: usize,
        buffer: String,
    },
}

/// Accumulates the response to a single command.
pub struct ResponseAccumulator {
    command: Command,
    grammar: ResponseGrammar,
    phase: Phase,
}

impl ResponseAccumulator {
    /// Create an accumulator for the response to `command`.
    pub fn new(command: Command) -> Self {
        Self {
            command,
            grammar: ResponseGrammar::new(),
            phase: Phase::AwaitingStart {
                preamble: String::new(),
            },
        }
    }

    /// Command whose response is being accumulated
    pub fn command(&self) -> Command {
        self.command
    }

    /// Push one notification into the accumulator.
    ///
    /// Returns [`Progress::Pending`] until the response terminates one way
    /// or the other.
    pub fn push(&mut self, chunk: &str) -> Progress {
        let phase = core::mem::replace(
            &mut self.phase,
            Phase::AwaitingStart {
                preamble: String::new(),
            },
        );

        match phase {
            Phase::AwaitingStart { mut preamble } => {
                preamble.push_str(chunk);
                let classification = match self.grammar.classify(self.command, &preamble) {
                    start @ Classification::Start { .. } => start,
                    // Stray text ahead of a marker must not hide it
                    joined => match self.grammar.classify(self.command, chunk) {
                        marker @ (Classification::Start { .. }
                        | Classification::TerminalError { .. }) => {
                            let stray = preamble.len() - chunk.len();
                            log::debug!("Dropping {} bytes of stray text", stray);
                            marker
                        }
                        _ => joined,
                    },
                };

                match classification {
                    Classification::Start {
                        declared_length,
                        payload,
                    } => {
                        log::debug!("Start of {} response detected", self.command);
                        self.begin(declared_length, payload);
                        self.check_terminated()
                    }
                    Classification::TerminalSuccess { .. } => Progress::MissingStart,
                    Classification::TerminalError { code } => Progress::Rejected { code },
                    Classification::Continuation => {
                        self.trim_preamble(&mut preamble);
                        self.phase = Phase::AwaitingStart { preamble };
                        Progress::Pending
                    }
                }
            }
            Phase::Body {
                declared_length,
                mut buffer,
            } => match self.grammar.classify(self.command, chunk) {
                Classification::Start {
                    declared_length,
                    payload,
                } => {
                    // Device started over; the earlier body is stale
                    log::warn!("{} response restarted mid-stream", self.command);
                    self.begin(declared_length, payload);
                    self.check_terminated()
                }
                Classification::TerminalError { code } => Progress::Rejected { code },
                Classification::TerminalSuccess { .. } | Classification::Continuation => {
                    buffer.push_str(chunk);
                    self.phase = Phase::Body {
                        declared_length,
                        buffer,
                    };
                    self.check_terminated()
                }
            },
        }
    }

    /// Reset the accumulator, discarding any partial response.
    pub fn reset(&mut self) {
        self.phase = Phase::AwaitingStart {
            preamble: String::new(),
        };
    }

    /// Returns true if no text is held.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the number of bytes held.
    pub fn len(&self) -> usize {
        match &self.phase {
            Phase::AwaitingStart { preamble } => preamble.len(),
            Phase::Body { buffer, .. } => buffer.len(),
        }
    }

    fn begin(&mut self, declared_length: Option<usize>, payload: &str) {
        self.phase = Phase::Body {
            // Info responses carry no length
            declared_length: declared_length.unwrap_or(0),
            buffer: payload.to_owned(),
        };
    }

    /// Drop preamble text that can no longer become a marker
    ///
    /// Keeps the earliest suffix that is still a partial start or error
    /// line. Failing that, keeps just enough to complete a split `\nOK\n`.
    fn trim_preamble(&self, preamble: &mut String) {
        let marker = preamble
            .char_indices()
            .map(|(i, _)| i)
            .find(|&i| self.grammar.is_partial_marker(self.command, &preamble[i..]));

        let mut cut = match marker {
            Some(i) => i,
            None => preamble.len().saturating_sub(OK_TERMINATOR.len() - 1),
        };
        while !preamble.is_char_boundary(cut) {
            cut -= 1;
        }
        preamble.drain(..cut);
    }

    fn check_terminated(&self) -> Progress {
        let Phase::Body {
            declared_length,
            buffer,
        } = &self.phase
        else {
            return Progress::Pending;
        };

        match self.grammar.terminal_success(buffer) {
            Some(body) => {
                log::debug!("End of {} response detected", self.command);
                let response = match self.command {
                    Command::Scan => CompletedResponse::Scan {
                        declared_length: *declared_length,
                        payload: body.to_owned(),
                    },
                    Command::Info => CompletedResponse::Info {
                        text: body.to_owned(),
                    },
                };
                Progress::Complete(response)
            }
            None => Progress::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::testing::{encode_record, scan_payload, scan_response};

    fn feed(command: Command, chunks: &[&str]) -> Progress {
        let mut acc = ResponseAccumulator::new(command);
        let mut progress = Progress::Pending;
        for chunk in chunks {
            assert_eq!(progress, Progress::Pending, "response ended early");
            progress = acc.push(chunk);
        }
        progress
    }

    #[test]
    fn test_scan_in_three_chunks() {
        let progress = feed(Command::Scan, &["+SCAN: 8\nAAAA", "AAAA", "\nOK\n"]);
        assert_eq!(
            progress,
            Progress::Complete(CompletedResponse::Scan {
                declared_length: 8,
                payload: "AAAAAAAA".into(),
            })
        );
    }

    #[test]
    fn test_info_response() {
        let progress = feed(Command::Info, &["+INFO: v1.2.3", "\nOK\n"]);
        assert_eq!(
            progress,
            Progress::Complete(CompletedResponse::Info {
                text: "v1.2.3".into(),
            })
        );
    }

    #[test]
    fn test_error_response() {
        assert_eq!(
            feed(Command::Scan, &["ERROR: 12\n"]),
            Progress::Rejected { code: 12 }
        );
        assert_eq!(
            feed(Command::Scan, &["+SCAN: 8\nAAAA", "ERROR: 7\n"]),
            Progress::Rejected { code: 7 }
        );
    }

    #[test]
    fn test_terminator_without_start() {
        assert_eq!(feed(Command::Info, &["\nOK\n"]), Progress::MissingStart);
    }

    #[test]
    fn test_restart_discards_stale_body() {
        let progress = feed(Command::Scan, &["+SCAN: 8\nBBBB", "+SCAN: 4\nAAAA", "\nOK\n"]);
        assert_eq!(
            progress,
            Progress::Complete(CompletedResponse::Scan {
                declared_length: 4,
                payload: "AAAA".into(),
            })
        );
    }

    #[test]
    fn test_single_split_anywhere() {
        let payload = scan_payload(&encode_record("AS7265X-0042", &[1, 2, 3, 4, 5, 6]));
        let response = scan_response(&payload);
        let expected = feed(Command::Scan, &[&response]);
        assert!(matches!(expected, Progress::Complete(_)));

        for split in 1..response.len() {
            let (head, tail) = response.split_at(split);
            assert_eq!(feed(Command::Scan, &[head, tail]), expected, "split at {split}");
        }
    }

    #[test]
    fn test_double_split_anywhere() {
        let response = "+SCAN: 12\nQUJDREVGR0g=\nOK\n";
        let expected = feed(Command::Scan, &[response]);

        for first in 1..response.len() - 1 {
            for second in first + 1..response.len() {
                let chunks = [
                    &response[..first],
                    &response[first..second],
                    &response[second..],
                ];
                assert_eq!(
                    feed(Command::Scan, &chunks),
                    expected,
                    "split at {first}/{second}"
                );
            }
        }
    }

    #[test]
    fn test_stray_text_before_scan_start() {
        let payload = scan_payload(&encode_record("AS7265X-0042", &[4, 5, 6]));
        let start = format!("+SCAN: {}\n{}", payload.len(), payload);

        assert_eq!(
            feed(Command::Scan, &["QUJD", &start, "\nOK\n"]),
            Progress::Complete(CompletedResponse::Scan {
                declared_length: payload.len(),
                payload,
            })
        );
    }

    #[test]
    fn test_stray_text_before_error() {
        assert_eq!(
            feed(Command::Info, &["QUJD", "ERROR: 12\n"]),
            Progress::Rejected { code: 12 }
        );
    }

    #[test]
    fn test_stray_text_before_info_start() {
        assert_eq!(
            feed(Command::Info, &["late", "+INFO: v1.2.3", "\nOK\n"]),
            Progress::Complete(CompletedResponse::Info {
                text: "v1.2.3".into(),
            })
        );
    }

    #[test]
    fn test_stray_text_before_split_start() {
        assert_eq!(
            feed(Command::Scan, &["noise", "+S", "CAN: 4\nAAAA", "\nOK\n"]),
            Progress::Complete(CompletedResponse::Scan {
                declared_length: 4,
                payload: "AAAA".into(),
            })
        );
        assert_eq!(
            feed(Command::Scan, &["noise", "ERR", "OR: 5\n"]),
            Progress::Rejected { code: 5 }
        );
    }

    #[test]
    fn test_preamble_stays_bounded() {
        let mut acc = ResponseAccumulator::new(Command::Scan);
        for _ in 0..100 {
            assert_eq!(acc.push("QUJDREVG"), Progress::Pending);
        }
        assert!(acc.len() < OK_TERMINATOR.len());

        // A terminator split across notifications is still seen
        assert_eq!(acc.push("\nO"), Progress::Pending);
        assert_eq!(acc.push("K\n"), Progress::MissingStart);
    }

    #[test]
    fn test_reset() {
        let mut acc = ResponseAccumulator::new(Command::Scan);
        assert_eq!(acc.push("+SCAN: 8\nAAAA"), Progress::Pending);
        assert_eq!(acc.len(), 4);

        acc.reset();
        assert!(acc.is_empty());

        assert_eq!(
            acc.push("+SCAN: 4\nAAAA\nOK\n"),
            Progress::Complete(CompletedResponse::Scan {
                declared_length: 4,
                payload: "AAAA".into(),
            })
        );
    }
}
