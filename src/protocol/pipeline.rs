//! Scan completion pipeline
//!
//! Validates a reassembled `AT+SCAN` payload step by step. Each step is a
//! hard gate: the first failure ends the pipeline with its own [`Failure`].
//!
//! 1. Length check against the length announced in the start line
//! 2. Base64 decode
//! 3. Split off the trailing 32-byte digest
//! 4. SHA-256 verification of the record bytes
//! 5. CBOR decode of the record

use crate::commands::types::Failure;
use crate::config::protocol::DIGEST_LEN;
use crate::protocol::digest::{self, Digest};
use crate::protocol::record::{decode_record, SensorRecord};
use crate::protocol::{base64, digest::to_hex};

/// A scan payload that passed every check
#[derive(Debug, Clone, PartialEq)]
pub struct ScanReport {
    pub record: SensorRecord,
    /// The validated base64 text, as forwarded to calibration
    pub payload: String,
    pub digest: Digest,
}

/// Run the validation steps over a reassembled scan payload
pub fn validate_scan(declared_length: usize, payload: String) -> Result<ScanReport, Failure> {
    if payload.len() != declared_length {
        return Err(Failure::LengthMismatch {
            declared: declared_length,
            actual: payload.len(),
        });
    }

    let decoded = base64::decode(&payload).map_err(|e| Failure::DecodeFault(e.to_string()))?;

    let (record_bytes, expected) = decoded
        .split_last_chunk::<DIGEST_LEN>()
        .ok_or(Failure::PayloadTooShort { len: decoded.len() })?;

    if !digest::verify(record_bytes, expected) {
        return Err(Failure::ChecksumMismatch {
            expected: to_hex(expected),
            actual: to_hex(&digest::digest(record_bytes)),
        });
    }

    let record =
        decode_record(record_bytes).map_err(|e| Failure::MalformedRecord(e.to_string()))?;

    log::info!("Sensor ID: {}", record.sensor_id);
    log::info!("Number of measurements: {}", record.measurements.len());

    Ok(ScanReport {
        record,
        payload,
        digest: *expected,
    })
}
