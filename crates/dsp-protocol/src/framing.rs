//! Line framing
//!
//! Outbound commands are sent as `#<command>\r\n`. Inbound traffic is a stream
//! of CR LF terminated text lines. Besides structured replies the device emits
//! bare prompts and error reports, which [`classify_line`] separates out before
//! anything reaches the response dispatcher.

use crate::command::{BARE_REPLY_PREFIX, OK_REPLY_PREFIX};
use crate::error::ParseError;

/// Line delimiter in both directions
pub const LINE_TERMINATOR: &str = "\r\n";

/// Maximum buffered line length before the codec discards input
const MAX_LINE_LEN: usize = 512;

/// Frame command text for transmission
pub fn frame_command(command: &str) -> String {
    format!("#{}{}", command, LINE_TERMINATOR)
}

/// What a received line means to the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    /// Empty line or a bare prompt
    Noise,
    /// Device-reported error
    Error,
    /// Candidate response for the dispatcher
    Response,
}

/// Classify a de-framed line
pub fn classify_line(line: &str) -> LineKind {
    if line.is_empty() || line == "> " || line == "OK> " {
        LineKind::Noise
    } else if line.contains("ERROR") {
        LineKind::Error
    } else {
        LineKind::Response
    }
}

/// Whether a line has one of the prefixes that denote a structured device reply
pub fn is_structured_reply(line: &str) -> bool {
    line.starts_with(OK_REPLY_PREFIX) || line.starts_with(BARE_REPLY_PREFIX)
}

/// Streaming CR LF line splitter
///
/// Bytes are pushed as they arrive from the transport; complete lines are
/// pulled out with [`LineCodec::next_line`]. Lines are decoded lossily as
/// UTF-8 since the device only speaks ASCII.
pub struct LineCodec {
    buffer: Vec<u8>,
}

impl LineCodec {
    /// Create a new line codec
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(128),
        }
    }

    /// Push raw bytes into the codec buffer
    pub fn push_bytes(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Extract the next complete line, without its terminator
    ///
    /// Returns `Some(Err(_))` once if the buffer grows past the line limit
    /// without a terminator; the oversized data is dropped.
    pub fn next_line(&mut self) -> Option<Result<String, ParseError>> {
        match self.buffer.windows(2).position(|w| w == b"\r\n") {
            Some(pos) => {
                let line: Vec<u8> = self.buffer.drain(..pos + 2).take(pos).collect();
                Some(Ok(String::from_utf8_lossy(&line).into_owned()))
            }
            None if self.buffer.len() > MAX_LINE_LEN => {
                let len = self.buffer.len();
                // Keep a trailing CR, it may be the start of the next terminator
                let keep = usize::from(self.buffer.last() == Some(&b'\r'));
                self.buffer.drain(..len - keep);
                Some(Err(ParseError::LineTooLong(len)))
            }
            None => None,
        }
    }

    /// Bytes buffered but not yet terminated
    pub fn pending(&self) -> &[u8] {
        &self.buffer
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}
