//! Session driver task
//!
//! Owns the [`CommandSession`] and feeds it from three sources: command
//! requests from the UI, input from the BLE link, and the response deadline.
//! Everything the display needs to know is published as a [`SessionEvent`].

use std::time::Instant;

use tokio::sync::mpsc;

use crate::calibration::{CalibratedSpectrum, CalibrationSink};
use crate::commands::{Command, Failure};
use crate::protocol::ScanReport;
use crate::session::machine::{ChunkOutcome, CommandSession, Completion};
use crate::session::transport::{Transport, TransportInput};

/// Updates published to the display layer
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Human-readable progress text
    Status(String),
    /// Device info string
    Info(String),
    /// A scan passed validation
    Scanned(ScanReport),
    /// Calibrated history after a new spectrum, oldest first
    History(Vec<CalibratedSpectrum>),
    /// A command or calibration failed
    Failed(Failure),
}

/// Current time on the tokio clock, so paused test clocks apply
fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}

/// Resolve at `deadline`, or never when there is none
async fn wait_for(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline.into()).await,
        None => core::future::pending().await,
    }
}

/// Drive `session` until the request or link channel closes.
pub async fn run_session<S, T>(
    session: &mut CommandSession<S>,
    transport: &mut T,
    mut requests: mpsc::Receiver<Command>,
    mut inbound: mpsc::Receiver<TransportInput>,
    events: mpsc::UnboundedSender<SessionEvent>,
) where
    S: CalibrationSink,
    T: Transport,
{
    let publish = |event: SessionEvent| {
        if events.send(event).is_err() {
            log::debug!("Display is gone, event dropped");
        }
    };

    loop {
        let deadline = session.deadline();

        // Requests first, so a command sent before its response is issued
        // before that response is handled
        tokio::select! {
            biased;

            request = requests.recv() => {
                let Some(command) = request else {
                    log::info!("Request channel closed, stopping session");
                    break;
                };
                issue(session, transport, command, &publish).await;
            }
            input = inbound.recv() => match input {
                Some(TransportInput::Notification(chunk)) => {
                    handle_notification(session, &chunk, &publish);
                }
                Some(TransportInput::Disconnected) => {
                    log::warn!("Device disconnected");
                    if let Some(command) = session.reset() {
                        publish(SessionEvent::Failed(Failure::Disconnected(command)));
                    }
                }
                None => {
                    log::info!("Link closed, stopping session");
                    break;
                }
            },
            _ = wait_for(deadline) => {
                if let Some(failure) = session.check_timeout(now()) {
                    publish(SessionEvent::Failed(failure));
                }
            }
        }
    }

    session.reset();
}

async fn issue<S, T>(
    session: &mut CommandSession<S>,
    transport: &mut T,
    command: Command,
    publish: &impl Fn(SessionEvent),
) where
    S: CalibrationSink,
    T: Transport,
{
    let bytes = match session.issue(command, now()) {
        Ok(bytes) => bytes,
        Err(failure) => {
            publish(SessionEvent::Failed(failure));
            return;
        }
    };

    if command == Command::Scan {
        publish(SessionEvent::Status("Read sensor".into()));
    }

    if let Err(error) = transport.write(bytes).await {
        log::error!("Failed to send {}: {}", command, error);
        session.abort_issue();
        publish(SessionEvent::Failed(Failure::Transport { command, error }));
    }
}

fn handle_notification<S: CalibrationSink>(
    session: &mut CommandSession<S>,
    chunk: &str,
    publish: &impl Fn(SessionEvent),
) {
    match session.handle_chunk(chunk) {
        ChunkOutcome::Ignored | ChunkOutcome::Pending => {}
        ChunkOutcome::Completed(Completion::Info(text)) => {
            publish(SessionEvent::Info(text));
        }
        ChunkOutcome::Completed(Completion::Scan(report)) => {
            publish(SessionEvent::Status("Scan finished".into()));
            publish(SessionEvent::Scanned(report));
            publish(SessionEvent::Status("Calibrate measurements".into()));
        }
        ChunkOutcome::Failed(failure) => {
            publish(SessionEvent::Failed(failure));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::dispatch::mock::RecordingSink;
    use crate::calibration::{CalibrationDispatcher, CalibrationError, Calibrator};
    use crate::config::SessionConfig;
    use crate::history::{history_task, CalibratedHistory};
    use crate::protocol::testing::{encode_record, scan_payload, scan_response};
    use crate::session::transport::mock::MockTransport;
    use crate::session::transport::TransportError;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::runtime::Handle;
    use tokio::sync::Notify;

    struct Harness {
        requests: mpsc::Sender<Command>,
        inbound: mpsc::Sender<TransportInput>,
        events: mpsc::UnboundedReceiver<SessionEvent>,
    }

    impl Harness {
        async fn notify(&self, chunk: &str) {
            self.inbound
                .send(TransportInput::Notification(chunk.into()))
                .await
                .unwrap();
        }

        async fn next_event(&mut self) -> SessionEvent {
            self.events.recv().await.expect("Should publish an event")
        }
    }

    /// Run a session on the current task while `script` drives it
    async fn drive<F, Fut>(
        config: SessionConfig,
        transport: &mut MockTransport,
        script: F,
    ) -> CommandSession<RecordingSink>
    where
        F: FnOnce(Harness) -> Fut,
        Fut: core::future::Future<Output = ()>,
    {
        let (request_tx, request_rx) = mpsc::channel(4);
        let (inbound_tx, inbound_rx) = mpsc::channel(4);
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let mut session = CommandSession::new(config, RecordingSink::new());

        let harness = Harness {
            requests: request_tx,
            inbound: inbound_tx,
            events: event_rx,
        };

        tokio::join!(
            run_session(&mut session, transport, request_rx, inbound_rx, event_tx),
            script(harness),
        );
        session
    }

    #[tokio::test]
    async fn test_scan_events() {
        let mut transport = MockTransport::new();
        let payload = scan_payload(&encode_record("AS7265X-0042", &[1, 2, 3]));
        let response = scan_response(&payload);

        let session = drive(SessionConfig::default(), &mut transport, |mut h| async move {
            h.requests.send(Command::Scan).await.unwrap();
            assert_eq!(h.next_event().await, SessionEvent::Status("Read sensor".into()));

            let (head, tail) = response.split_at(10);
            h.notify(head).await;
            h.notify(tail).await;

            assert_eq!(h.next_event().await, SessionEvent::Status("Scan finished".into()));
            match h.next_event().await {
                SessionEvent::Scanned(report) => {
                    assert_eq!(report.record.measurements, vec![1.0, 2.0, 3.0]);
                }
                other => panic!("Expected scan report, got {:?}", other),
            }
            assert_eq!(
                h.next_event().await,
                SessionEvent::Status("Calibrate measurements".into())
            );
        })
        .await;

        assert_eq!(transport.get_written(), &[b"AT+SCAN\n".to_vec()]);
        assert_eq!(session.calibration().get_dispatched().len(), 1);
        assert!(session.is_idle());
    }

    #[tokio::test]
    async fn test_info_and_busy() {
        let mut transport = MockTransport::new();

        drive(SessionConfig::default(), &mut transport, |mut h| async move {
            h.requests.send(Command::Info).await.unwrap();
            h.requests.send(Command::Scan).await.unwrap();
            assert_eq!(
                h.next_event().await,
                SessionEvent::Failed(Failure::Busy(Command::Info))
            );

            h.notify("+INFO: v1.2.3\nOK\n").await;
            assert_eq!(h.next_event().await, SessionEvent::Info("v1.2.3".into()));
        })
        .await;

        assert_eq!(transport.get_written(), &[b"AT+INFO\n".to_vec()]);
    }

    #[tokio::test]
    async fn test_device_error() {
        let mut transport = MockTransport::new();

        drive(SessionConfig::default(), &mut transport, |mut h| async move {
            h.requests.send(Command::Scan).await.unwrap();
            assert_eq!(h.next_event().await, SessionEvent::Status("Read sensor".into()));

            h.notify("ERROR: 12\n").await;
            assert_eq!(
                h.next_event().await,
                SessionEvent::Failed(Failure::CommandError {
                    command: Command::Scan,
                    code: 12,
                })
            );
        })
        .await;
    }

    #[tokio::test]
    async fn test_disconnect_resets() {
        let mut transport = MockTransport::new();

        let session = drive(SessionConfig::default(), &mut transport, |mut h| async move {
            h.requests.send(Command::Info).await.unwrap();
            h.notify("+INFO: v1").await;
            h.inbound.send(TransportInput::Disconnected).await.unwrap();
            assert_eq!(
                h.next_event().await,
                SessionEvent::Failed(Failure::Disconnected(Command::Info))
            );

            h.requests.send(Command::Info).await.unwrap();
            h.notify("+INFO: v2\nOK\n").await;
            assert_eq!(h.next_event().await, SessionEvent::Info("v2".into()));
        })
        .await;

        assert!(session.is_idle());
    }

    #[tokio::test]
    async fn test_timeout() {
        let mut transport = MockTransport::new();
        let config = SessionConfig {
            response_timeout: Duration::from_millis(50),
        };

        drive(config, &mut transport, |mut h| async move {
            h.requests.send(Command::Info).await.unwrap();
            assert_eq!(
                h.next_event().await,
                SessionEvent::Failed(Failure::Timeout(Command::Info))
            );

            // Session accepts a new command afterwards
            h.requests.send(Command::Info).await.unwrap();
            h.notify("+INFO: late\nOK\n").await;
            assert_eq!(h.next_event().await, SessionEvent::Info("late".into()));
        })
        .await;
    }

    #[tokio::test]
    async fn test_write_failure() {
        let mut transport = MockTransport::new();
        transport.set_next_write_error(TransportError::NotConnected);

        let session = drive(SessionConfig::default(), &mut transport, |mut h| async move {
            h.requests.send(Command::Info).await.unwrap();
            assert_eq!(
                h.next_event().await,
                SessionEvent::Failed(Failure::Transport {
                    command: Command::Info,
                    error: TransportError::NotConnected,
                })
            );
        })
        .await;

        assert!(session.is_idle());
        assert!(transport.get_written().is_empty());
    }

    /// Calibrator that holds every request until the gate opens
    struct GatedCalibrator {
        gate: Arc<Notify>,
    }

    impl Calibrator for GatedCalibrator {
        async fn calibrate(&self, _payload: String) -> Result<CalibratedSpectrum, CalibrationError> {
            self.gate.notified().await;
            Ok(CalibratedSpectrum(vec![0.5, 0.25]))
        }
    }

    #[tokio::test]
    async fn test_info_completes_while_calibration_in_flight() {
        let gate = Arc::new(Notify::new());
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let recorder = tokio::spawn(history_task(
            CalibratedHistory::new(),
            outcome_rx,
            event_tx.clone(),
        ));

        let calibrator = GatedCalibrator {
            gate: Arc::clone(&gate),
        };
        let dispatcher = CalibrationDispatcher::new(calibrator, Handle::current(), outcome_tx);
        let mut session = CommandSession::new(SessionConfig::default(), dispatcher);
        let mut transport = MockTransport::new();

        let (request_tx, request_rx) = mpsc::channel(4);
        let (inbound_tx, inbound_rx) = mpsc::channel(4);
        let payload = scan_payload(&encode_record("AS7265X-0042", &[1, 2, 3]));
        let response = scan_response(&payload);

        let script = async move {
            request_tx.send(Command::Scan).await.unwrap();
            inbound_tx
                .send(TransportInput::Notification(response))
                .await
                .unwrap();

            let mut event = event_rx.recv().await.unwrap();
            while event != SessionEvent::Status("Calibrate measurements".into()) {
                assert!(!matches!(event, SessionEvent::Failed(_)), "{:?}", event);
                event = event_rx.recv().await.unwrap();
            }

            // Calibration is still held; the session takes the next command
            request_tx.send(Command::Info).await.unwrap();
            inbound_tx
                .send(TransportInput::Notification("+INFO: v1.2.3\nOK\n".into()))
                .await
                .unwrap();
            assert_eq!(
                event_rx.recv().await,
                Some(SessionEvent::Info("v1.2.3".into()))
            );

            gate.notify_one();
            assert_eq!(
                event_rx.recv().await,
                Some(SessionEvent::History(vec![CalibratedSpectrum(vec![0.5, 0.25])]))
            );
            assert_eq!(
                event_rx.recv().await,
                Some(SessionEvent::Status("Done".into()))
            );
        };

        tokio::join!(
            run_session(&mut session, &mut transport, request_rx, inbound_rx, event_tx),
            script,
        );

        assert!(session.is_idle());
        assert_eq!(
            transport.get_written(),
            &[b"AT+SCAN\n".to_vec(), b"AT+INFO\n".to_vec()]
        );

        // Dropping the session drops the last outcome sender
        drop(session);
        let history = recorder.await.unwrap();
        assert_eq!(history.len(), 1);
    }
}
