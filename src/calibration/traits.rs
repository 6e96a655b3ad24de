//! Calibration service trait for abstraction and testability
//!
//! The calibration algorithm runs outside this crate. This trait lets the
//! dispatcher work with either the HTTP client or a mock for testing.

use core::future::Future;

use serde::{Deserialize, Serialize};

/// Errors that can occur while calibrating a scan
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CalibrationError {
    /// The service answered with a non-success status
    #[error("HTTP status: {0}")]
    Status(u16),
    /// The request could not be built or sent
    #[error("request failed: {0}")]
    Request(String),
    /// The response body is not a JSON array of numbers
    #[error("invalid response body: {0}")]
    InvalidBody(String),
}

/// Reflectance per wavelength bin, as returned by the calibration service
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CalibratedSpectrum(pub Vec<f64>);

impl CalibratedSpectrum {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Abstract calibration service
pub trait Calibrator {
    /// Calibrate a validated scan
    ///
    /// `payload` is the base64 text exactly as the device sent it, not the
    /// decoded record.
    fn calibrate(
        &self,
        payload: String,
    ) -> impl Future<Output = Result<CalibratedSpectrum, CalibrationError>> + Send;
}
