//! Calibrated history buffer
//!
//! Keeps the most recent calibrated spectra for display. Insertion order is
//! the only order that matters: once full, every new spectrum evicts the
//! oldest one.

use heapless::Deque;
use tokio::sync::mpsc;

use crate::calibration::{CalibratedSpectrum, CalibrationOutcome};
use crate::commands::Failure;
use crate::config::history::CAPACITY;
use crate::session::SessionEvent;

/// Bounded FIFO of calibrated spectra
pub struct CalibratedHistory {
    entries: Deque<CalibratedSpectrum, CAPACITY>,
}

impl CalibratedHistory {
    /// Create an empty history.
    pub fn new() -> Self {
        Self {
            entries: Deque::new(),
        }
    }

    /// Append a spectrum.
    ///
    /// Returns the evicted spectrum when the history was already full.
    pub fn push(&mut self, spectrum: CalibratedSpectrum) -> Option<CalibratedSpectrum> {
        let evicted = if self.entries.is_full() {
            self.entries.pop_front()
        } else {
            None
        };
        // Cannot fail: a slot was freed above if needed
        let _ = self.entries.push_back(spectrum);
        evicted
    }

    /// Point-in-time copy of every spectrum, oldest first.
    pub fn snapshot(&self) -> Vec<CalibratedSpectrum> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for CalibratedHistory {
    fn default() -> Self {
        Self::new()
    }
}

/// Task that records calibration outcomes into `history`.
///
/// Every calibrated spectrum is appended and the new snapshot published to
/// the display; every failure is published as
/// [`Failure::CalibrationFailed`]. Returns the history once all dispatchers
/// are gone.
pub async fn history_task(
    mut history: CalibratedHistory,
    mut outcomes: mpsc::UnboundedReceiver<CalibrationOutcome>,
    events: mpsc::UnboundedSender<SessionEvent>,
) -> CalibratedHistory {
    while let Some(outcome) = outcomes.recv().await {
        match outcome.result {
            Ok(spectrum) => {
                log::info!(
                    "Calibrated scan from sensor {} ({} bins)",
                    outcome.sensor_id,
                    spectrum.len()
                );
                history.push(spectrum);
                let _ = events.send(SessionEvent::History(history.snapshot()));
                let _ = events.send(SessionEvent::Status("Done".into()));
            }
            Err(error) => {
                log::error!(
                    "Calibration of scan from sensor {} failed: {}",
                    outcome.sensor_id,
                    error
                );
                let _ = events.send(SessionEvent::Failed(Failure::CalibrationFailed(error)));
            }
        }
    }
    history
}
