//! Command session with the sensor
//!
//! [`machine`] holds the protocol state for the one outstanding command,
//! [`task`] drives it from the link and the UI, and [`transport`] is the
//! seam to the BLE link.

pub mod machine;
pub mod task;
pub mod transport;

pub use machine::{ChunkOutcome, CommandSession, Completion};
pub use task::{run_session, SessionEvent};
pub use transport::{Transport, TransportError, TransportInput};
