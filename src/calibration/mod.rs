pub mod dispatch;
pub mod http;
pub mod traits;

pub use dispatch::{CalibrationDispatcher, CalibrationOutcome, CalibrationSink};
pub use http::HttpCalibrator;
pub use traits::{CalibratedSpectrum, CalibrationError, Calibrator};
