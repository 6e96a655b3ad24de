//! Transport trait for abstraction and testability
//!
//! The BLE link itself lives outside this crate. This trait lets the
//! session task write commands through either a real link or a mock, and
//! [`TransportInput`] is what the link feeds back into the session.

use core::future::Future;

/// Errors that can occur while writing to the device
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// No device is connected
    #[error("not connected")]
    NotConnected,
    /// The write was rejected by the link
    #[error("write failed: {0}")]
    WriteFailed(String),
}

/// Events delivered by the link, in arrival order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportInput {
    /// One notification from the device, decoded as UTF-8
    Notification(String),
    /// The link went down
    Disconnected,
}

/// Abstract link to the device
pub trait Transport {
    /// Write command bytes to the device
    fn write(&mut self, data: &[u8]) -> impl Future<Output = Result<(), TransportError>>;
}
