//! Response grammar for AT notifications
//!
//! Classifies notification text as the start of a response, a successful or
//! failed terminator, or a continuation. Tags and the `OK` trailer match
//! ASCII case-insensitively.

use crate::commands::types::Command;
use crate::config::protocol::{ERROR_TAG, INFO_TAG, OK_TERMINATOR, SCAN_TAG};

/// How a piece of notification text relates to the outstanding command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification<'a> {
    /// Opens a response
    ///
    /// `declared_length` is the announced base64 length (scan only).
    /// `payload` is the response body that followed the start line.
    Start {
        declared_length: Option<usize>,
        payload: &'a str,
    },
    /// Ends with `\nOK\n`; `fragment` is everything before the trailer
    TerminalSuccess { fragment: &'a str },
    /// The whole text is `ERROR: <code>\n`
    TerminalError { code: u32 },
    /// None of the above
    Continuation,
}

/// Grammar of the responses to [`Command::Scan`] and [`Command::Info`]
pub struct ResponseGrammar;

impl ResponseGrammar {
    /// Create a new response grammar
    pub fn new() -> Self {
        Self
    }

    /// Classify `text` in the context of `command`
    ///
    /// Patterns are tried in order: start, terminal success, terminal error.
    /// The first match wins; text matching none is a continuation.
    pub fn classify<'a>(&self, command: Command, text: &'a str) -> Classification<'a> {
        if let Some(start) = self.start(command, text) {
            return start;
        }
        if let Some(fragment) = self.terminal_success(text) {
            return Classification::TerminalSuccess { fragment };
        }
        if let Some(code) = self.terminal_error(text) {
            return Classification::TerminalError { code };
        }
        Classification::Continuation
    }

    /// Match the start line of `command`'s response
    pub fn start<'a>(&self, command: Command, text: &'a str) -> Option<Classification<'a>> {
        match command {
            Command::Scan => {
                let rest = strip_prefix_ignore_case(text, SCAN_TAG)?;
                let (declared, rest) = split_decimal::<usize>(rest)?;
                let payload = rest.strip_prefix('\n')?;
                Some(Classification::Start {
                    declared_length: Some(declared),
                    payload,
                })
            }
            Command::Info => {
                let rest = strip_prefix_ignore_case(text, INFO_TAG)?;
                let mut chars = rest.chars();
                if !chars.next()?.is_whitespace() {
                    return None;
                }
                let payload = chars.as_str();
                match payload.chars().next() {
                    Some('\n') | Some('\r') | None => None,
                    Some(_) => Some(Classification::Start {
                        declared_length: None,
                        payload,
                    }),
                }
            }
        }
    }

    /// Match a successful terminator, returning the text before it
    pub fn terminal_success<'a>(&self, text: &'a str) -> Option<&'a str> {
        strip_suffix_ignore_case(text, OK_TERMINATOR)
    }

    /// Match a device error line, returning its code
    pub fn terminal_error(&self, text: &str) -> Option<u32> {
        let rest = strip_prefix_ignore_case(text, ERROR_TAG)?;
        let (code, rest) = split_decimal::<u32>(rest)?;
        (rest == "\n").then_some(code)
    }

    /// Whether `text` could still grow into a start line or an error line
    ///
    /// True for a partial tag, or a complete tag followed only by the digits
    /// (or single whitespace character) that precede the rest of the line.
    pub fn is_partial_marker(&self, command: Command, text: &str) -> bool {
        let start = match command {
            Command::Scan => is_partial_tagged_number(text, SCAN_TAG),
            Command::Info => is_partial_info(text),
        };
        start || is_partial_tagged_number(text, ERROR_TAG)
    }
}

impl Default for ResponseGrammar {
    fn default() -> Self {
        Self::new()
    }
}

fn strip_prefix_ignore_case<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let head = text.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        text.get(prefix.len()..)
    } else {
        None
    }
}

fn strip_suffix_ignore_case<'a>(text: &'a str, suffix: &str) -> Option<&'a str> {
    let split = text.len().checked_sub(suffix.len())?;
    let tail = text.get(split..)?;
    if tail.eq_ignore_ascii_case(suffix) {
        text.get(..split)
    } else {
        None
    }
}

fn is_prefix_ignore_case(text: &str, tag: &str) -> bool {
    tag.as_bytes()
        .get(..text.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(text.as_bytes()))
}

fn is_partial_tagged_number(text: &str, tag: &str) -> bool {
    if text.len() <= tag.len() {
        return is_prefix_ignore_case(text, tag);
    }
    strip_prefix_ignore_case(text, tag).is_some_and(|rest| rest.bytes().all(|b| b.is_ascii_digit()))
}

fn is_partial_info(text: &str) -> bool {
    if text.len() <= INFO_TAG.len() {
        return is_prefix_ignore_case(text, INFO_TAG);
    }
    strip_prefix_ignore_case(text, INFO_TAG).is_some_and(|rest| {
        let mut chars = rest.chars();
        chars.next().is_some_and(char::is_whitespace) && chars.next().is_none()
    })
}

/// Split a leading run of ASCII digits off `text` and parse it
///
/// Returns `None` when there are no digits or the value overflows `T`.
fn split_decimal<T: core::str::FromStr>(text: &str) -> Option<(T, &str)> {
    let digits = text.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return None;
    }
    let value = text[..digits].parse().ok()?;
    Some((value, &text[digits..]))
}
