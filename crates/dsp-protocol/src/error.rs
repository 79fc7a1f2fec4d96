//! Error types for DSP protocol parsing and encoding

use thiserror::Error;

/// Errors that can occur while parsing protocol data
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Numeric field is not a valid decimal literal
    #[error("invalid number: {0:?}")]
    InvalidNumber(String),

    /// Byte does not correspond to any known device type
    #[error("unknown device type: 0x{0:02X}")]
    UnknownDeviceType(u8),

    /// Byte does not correspond to any known signal group
    #[error("unknown group: 0x{0:02X}")]
    UnknownGroup(u8),

    /// Device id outside `0`..`B` and not the `*` wildcard
    #[error("invalid device id: {0:?}")]
    InvalidDeviceId(char),

    /// A required field was missing from a response line
    #[error("missing field: {0}")]
    MissingField(&'static str),

    /// Line exceeded the maximum buffered length before a terminator arrived
    #[error("line too long: {0} bytes")]
    LineTooLong(usize),
}

/// Higher-level protocol errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProtocolError {
    /// Parse error
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// Scaling input range is empty or inverted
    #[error("invalid input range for scaling: min {min} max {max}")]
    InvalidRange {
        /// Lower bound of the input range
        min: f64,
        /// Upper bound of the input range
        max: f64,
    },
}
