//! Calibration dispatch
//!
//! Calibration runs outside the command session's lifecycle. Each validated
//! scan is handed to an independent task; its outcome is delivered later
//! over a channel to whoever owns the calibrated history. The session never
//! waits for it and may complete further commands in the meantime.

use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::mpsc;

use crate::calibration::traits::{CalibratedSpectrum, CalibrationError, Calibrator};
use crate::protocol::record::SensorId;

/// Result of one calibration request
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationOutcome {
    /// Sensor that produced the scan
    pub sensor_id: SensorId,
    pub result: Result<CalibratedSpectrum, CalibrationError>,
}

/// Receiver of validated scans awaiting calibration
pub trait CalibrationSink {
    /// Start calibrating `payload` without waiting for the result
    fn dispatch(&self, sensor_id: SensorId, payload: String);
}

/// Spawns one calibration task per scan on a tokio runtime
pub struct CalibrationDispatcher<C> {
    calibrator: Arc<C>,
    runtime: Handle,
    outcomes: mpsc::UnboundedSender<CalibrationOutcome>,
}

impl<C> CalibrationDispatcher<C>
where
    C: Calibrator + Send + Sync + 'static,
{
    /// Create a dispatcher delivering outcomes to `outcomes`
    pub fn new(
        calibrator: C,
        runtime: Handle,
        outcomes: mpsc::UnboundedSender<CalibrationOutcome>,
    ) -> Self {
        Self {
            calibrator: Arc::new(calibrator),
            runtime,
            outcomes,
        }
    }
}

impl<C> CalibrationSink for CalibrationDispatcher<C>
where
    C: Calibrator + Send + Sync + 'static,
{
    fn dispatch(&self, sensor_id: SensorId, payload: String) {
        let calibrator = Arc::clone(&self.calibrator);
        let outcomes = self.outcomes.clone();

        log::debug!("Calibrating scan from sensor {}", sensor_id);
        self.runtime.spawn(async move {
            let result = calibrator.calibrate(payload).await;
            if outcomes.send(CalibrationOutcome { sensor_id, result }).is_err() {
                log::warn!("Calibration outcome dropped, history is gone");
            }
        });
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::traits::mock::MockCalibrator;

    #[tokio::test]
    async fn test_dispatch_delivers_outcome() {
        let calibrator = MockCalibrator::new();
        calibrator.queue_result(Ok(CalibratedSpectrum(vec![0.25, 0.5])));

        let (tx, mut rx) = mpsc::unbounded_channel();
        let dispatcher = CalibrationDispatcher::new(calibrator, Handle::current(), tx);

        dispatcher.dispatch(SensorId::Text("A".into()), "AAAA".into());

        let outcome = rx.recv().await.expect("Should deliver outcome");
        assert_eq!(outcome.sensor_id, SensorId::Text("A".into()));
        assert_eq!(outcome.result, Ok(CalibratedSpectrum(vec![0.25, 0.5])));
        assert_eq!(dispatcher.calibrator.get_requests(), vec!["AAAA"]);
    }

    #[tokio::test]
    async fn test_dispatch_delivers_failure() {
        let calibrator = MockCalibrator::new();
        calibrator.queue_result(Err(CalibrationError::Status(502)));

        let (tx, mut rx) = mpsc::unbounded_channel();
        let dispatcher = CalibrationDispatcher::new(calibrator, Handle::current(), tx);

        dispatcher.dispatch(SensorId::Number(7), "BBBB".into());

        let outcome = rx.recv().await.expect("Should deliver outcome");
        assert_eq!(outcome.result, Err(CalibrationError::Status(502)));
    }

    #[tokio::test]
    async fn test_dispatch_does_not_block() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let dispatcher = CalibrationDispatcher::new(MockCalibrator::new(), Handle::current(), tx);

        // Both dispatches return before either calibration has run
        dispatcher.dispatch(SensorId::Number(1), "AAAA".into());
        dispatcher.dispatch(SensorId::Number(2), "BBBB".into());
        assert!(rx.try_recv().is_err());

        let mut sensors = vec![
            rx.recv().await.unwrap().sensor_id,
            rx.recv().await.unwrap().sensor_id,
        ];
        sensors.sort_by_key(|id| id.to_string());
        assert_eq!(sensors, vec![SensorId::Number(1), SensorId::Number(2)]);
    }
}
