pub mod base64;
pub mod digest;
pub mod pipeline;
pub mod reassembly;
pub mod record;

pub use pipeline::{validate_scan, ScanReport};
pub use reassembly::{CompletedResponse, Progress, ResponseAccumulator};
pub use record::{SensorId, SensorRecord};
