//! Host-side protocol engine for a BLE spectral sensor
//!
//! Issues AT commands over a Nordic UART style link, reassembles the
//! fragmented notifications that answer them, validates scan payloads
//! (base64, SHA-256, CBOR) and forwards them to a calibration service.

pub mod calibration;
pub mod commands;
pub mod config;
pub mod history;
pub mod protocol;
pub mod session;
