//! Command and failure types for the AT notification protocol
//!
//! # Protocol Format
//!
//! Commands are newline-terminated ASCII written to the device:
//! ```text
//! AT+SCAN\n
//! AT+INFO\n
//! ```
//!
//! Responses arrive as notifications, fragmented at arbitrary points:
//! ```text
//! +SCAN: <base64 length>\n<base64 payload>\nOK\n
//! +INFO: <text>\nOK\n
//! ERROR: <code>\n
//! ```
//!
//! The base64 payload of a scan decodes to `[CBOR record][SHA-256 of record]`.

use core::fmt;

use crate::calibration::CalibrationError;
use crate::config::protocol::{CMD_INFO, CMD_SCAN};
use crate::session::transport::TransportError;

/// AT commands understood by the sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Take a measurement (`AT+SCAN`)
    ///
    /// - Response: `+SCAN: <n>\n` followed by `n` base64 characters and `\nOK\n`
    Scan,

    /// Query the device info string (`AT+INFO`)
    ///
    /// - Response: `+INFO: <text>` followed by `\nOK\n`
    Info,
}

impl Command {
    /// Command text as written to the device
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Scan => CMD_SCAN,
            Command::Info => CMD_INFO,
        }
    }

    /// Command bytes as written to the device
    pub fn as_bytes(&self) -> &'static [u8] {
        self.as_str().as_bytes()
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str().trim_end())
    }
}

/// Terminal failure of a command
///
/// Every fault detected by the engine is converted into one of these at the
/// point of detection. None of them is retried.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Failure {
    /// A command was issued while another one is still outstanding
    #[error("{0} is still in progress")]
    Busy(Command),

    /// The device answered with `ERROR: <code>`
    #[error("{command} failed. Error: {code}")]
    CommandError { command: Command, code: u32 },

    /// The response terminator arrived before any start marker
    #[error("{0} response ended before it started")]
    MissingStart(Command),

    /// Accumulated base64 length differs from the length announced by the device
    #[error("invalid message length. Expected: {declared} Actual: {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    /// Scan payload is not valid base64
    #[error("invalid base64 payload: {0}")]
    DecodeFault(String),

    /// Decoded payload cannot hold the trailing digest
    #[error("payload of {len} bytes is shorter than its digest")]
    PayloadTooShort { len: usize },

    /// Digest over the record does not match the transmitted digest
    #[error("invalid SHA256. Expected: {expected} Actual: {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    /// Record bytes are not a well-formed sensor record
    #[error("malformed sensor record: {0}")]
    MalformedRecord(String),

    /// The calibration service rejected or failed to process the payload
    #[error("error calibrating sensor measurement: {0}")]
    CalibrationFailed(#[from] CalibrationError),

    /// No terminal marker arrived within the response timeout
    #[error("{0} timed out waiting for a response")]
    Timeout(Command),

    /// The link went down while the command was outstanding
    #[error("device disconnected during {0}")]
    Disconnected(Command),

    /// The command could not be written to the device
    #[error("failed to send {command}: {error}")]
    Transport {
        command: Command,
        error: TransportError,
    },
}

impl Failure {
    /// Short snake_case name of the failure, for matching in captures and logs
    pub fn kind(&self) -> &'static str {
        match self {
            Failure::Busy(_) => "busy",
            Failure::CommandError { .. } => "command_error",
            Failure::MissingStart(_) => "missing_start",
            Failure::LengthMismatch { .. } => "length_mismatch",
            Failure::DecodeFault(_) => "decode_fault",
            Failure::PayloadTooShort { .. } => "payload_too_short",
            Failure::ChecksumMismatch { .. } => "checksum_mismatch",
            Failure::MalformedRecord(_) => "malformed_record",
            Failure::CalibrationFailed(_) => "calibration_failed",
            Failure::Timeout(_) => "timeout",
            Failure::Disconnected(_) => "disconnected",
            Failure::Transport { .. } => "transport",
        }
    }
}
