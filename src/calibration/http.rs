//! HTTP client for the calibration service
//!
//! POSTs the validated base64 payload as an opaque octet stream and expects
//! a JSON array of reflectance values back.

use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::{header, Method, Request, Uri};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;

use crate::calibration::traits::{CalibratedSpectrum, CalibrationError, Calibrator};
use crate::config::calibration::CONTENT_TYPE;
use crate::config::spectrum::BIN_COUNT;
use crate::config::CalibrationConfig;

/// Calibration service reached over HTTP
pub struct HttpCalibrator {
    client: Client<HttpConnector, Full<Bytes>>,
    endpoint: Uri,
}

impl HttpCalibrator {
    /// Create a client for the endpoint in `config`
    pub fn new(config: &CalibrationConfig) -> Result<Self, CalibrationError> {
        let endpoint = config
            .endpoint
            .parse::<Uri>()
            .map_err(|e| CalibrationError::Request(format!("invalid endpoint: {e}")))?;

        Ok(Self {
            client: Client::builder(TokioExecutor::new()).build_http(),
            endpoint,
        })
    }

    pub fn endpoint(&self) -> &Uri {
        &self.endpoint
    }
}

impl Calibrator for HttpCalibrator {
    async fn calibrate(&self, payload: String) -> Result<CalibratedSpectrum, CalibrationError> {
        let request = Request::builder()
            .method(Method::POST)
            .uri(self.endpoint.clone())
            .header(header::CONTENT_TYPE, CONTENT_TYPE)
            .body(Full::new(Bytes::from(payload)))
            .map_err(|e| CalibrationError::Request(e.to_string()))?;

        let response = self
            .client
            .request(request)
            .await
            .map_err(|e| CalibrationError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            log::error!(
                "Error calibrating sensor measurements. HTTP status: {}",
                status.as_u16()
            );
            return Err(CalibrationError::Status(status.as_u16()));
        }

        let body = response
            .into_body()
            .collect()
            .await
            .map_err(|e| CalibrationError::Request(e.to_string()))?
            .to_bytes();

        let spectrum: CalibratedSpectrum = serde_json::from_slice(&body)
            .map_err(|e| CalibrationError::InvalidBody(e.to_string()))?;

        if spectrum.len() != BIN_COUNT {
            log::warn!(
                "Calibrated spectrum has {} bins, expected {}",
                spectrum.len(),
                BIN_COUNT
            );
        }

        Ok(spectrum)
    }
}
