//! Protocol constants and runtime configuration for the sensor link

use std::time::Duration;

/// AT command protocol spoken over the Nordic UART Service
pub mod protocol {
    /// Command text written to the device to start a scan
    pub const CMD_SCAN: &str = "AT+SCAN\n";

    /// Command text written to the device to query its info string
    pub const CMD_INFO: &str = "AT+INFO\n";

    /// Tag opening an `AT+SCAN` response, followed by the base64 length
    pub const SCAN_TAG: &str = "+SCAN: ";

    /// Tag opening an `AT+INFO` response
    pub const INFO_TAG: &str = "+INFO:";

    /// Tag of a device-reported failure, followed by the error code
    pub const ERROR_TAG: &str = "ERROR: ";

    /// Trailer closing every successful response
    pub const OK_TERMINATOR: &str = "\nOK\n";

    /// Length of the SHA-256 digest appended to the CBOR record
    pub const DIGEST_LEN: usize = 32;

    /// Maximum nesting of arrays and maps accepted in a sensor record
    pub const MAX_RECORD_DEPTH: usize = 32;
}

/// Calibrated history
pub mod history {
    /// Number of calibrated spectra kept for display
    pub const CAPACITY: usize = 10;
}

/// Spectral axis of the sensor
pub mod spectrum {
    pub const WAVELENGTH_START_NM: u32 = 750;
    pub const WAVELENGTH_END_NM: u32 = 1050;
    pub const WAVELENGTH_STEP_NM: u32 = 1;

    /// Number of wavelength bins in a calibrated spectrum
    pub const BIN_COUNT: usize =
        ((WAVELENGTH_END_NM - WAVELENGTH_START_NM) / WAVELENGTH_STEP_NM) as usize + 1;

    /// Wavelength of every bin, in nanometres
    pub fn wavelengths() -> impl Iterator<Item = u32> {
        (WAVELENGTH_START_NM..=WAVELENGTH_END_NM).step_by(WAVELENGTH_STEP_NM as usize)
    }
}

/// Session defaults
pub mod session {
    /// Time a command may stay outstanding before it is failed
    pub const RESPONSE_TIMEOUT_MS: u64 = 10_000;
}

/// Calibration service defaults
pub mod calibration {
    pub const ENDPOINT: &str = "http://127.0.0.1:8000/calibrate";

    /// Content type of the request body (the raw base64 payload)
    pub const CONTENT_TYPE: &str = "application/octet-stream";
}

/// Runtime configuration of a command session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How long an issued command may wait for its terminal marker
    pub response_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            response_timeout: Duration::from_millis(session::RESPONSE_TIMEOUT_MS),
        }
    }
}

/// Runtime configuration of the calibration client
#[derive(Debug, Clone)]
pub struct CalibrationConfig {
    /// URL the validated payload is POSTed to
    pub endpoint: String,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            endpoint: calibration::ENDPOINT.to_string(),
        }
    }
}
