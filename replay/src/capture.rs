//! Recorded notification captures.
//!
//! A capture is a JSON file listing, for each command sent to the sensor,
//! the notifications it answered with and what the session should make of
//! them:
//!
//! ```json
//! {
//!   "exchanges": [
//!     {
//!       "name": "Device info",
//!       "command": "info",
//!       "chunks": ["+INFO: fw 1.2.3", "\nOK\n"],
//!       "expect": { "outcome": "info", "text": "fw 1.2.3" }
//!     }
//!   ]
//! }
//! ```

use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

use spectro_link::commands::Command;

/// All exchanges recorded in one session.
#[derive(Debug, Deserialize)]
pub struct Capture {
    pub exchanges: Vec<Exchange>,
}

/// One command and the notifications that answered it.
#[derive(Debug, Deserialize)]
pub struct Exchange {
    pub name: String,
    pub command: CapturedCommand,
    /// Notification payloads in arrival order
    pub chunks: Vec<String>,
    pub expect: Expectation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapturedCommand {
    Scan,
    Info,
}

impl From<CapturedCommand> for Command {
    fn from(command: CapturedCommand) -> Self {
        match command {
            CapturedCommand::Scan => Command::Scan,
            CapturedCommand::Info => Command::Info,
        }
    }
}

/// Expected end of an exchange.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Expectation {
    Info {
        text: String,
    },
    Scan {
        #[serde(default)]
        sensor_id: Option<String>,
        #[serde(default)]
        measurements: Option<usize>,
    },
    /// Failure named by [`Failure::kind`](spectro_link::commands::Failure::kind)
    Failure {
        kind: String,
    },
}

impl Capture {
    /// Load a capture from a JSON file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read capture {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("Invalid capture {}", path.display()))
    }

    pub fn parse(text: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}
