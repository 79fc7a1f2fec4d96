//! Error types for the protocol engine

use thiserror::Error;

/// Errors that can occur in the engine and its transport
#[derive(Debug, Error)]
pub enum EngineError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serial port could not be opened
    #[error("serial port error: {0}")]
    Serial(#[from] tokio_serial::Error),

    /// Protocol error
    #[error("protocol error: {0}")]
    Protocol(#[from] dsp_protocol::ProtocolError),

    /// Configuration could not be read
    #[error("configuration error: {0}")]
    Config(#[from] serde_json::Error),

    /// No control point registered under this key
    #[error("control point not found: {0}")]
    UnknownControlPoint(String),

    /// A control point is already registered under this key
    #[error("control point already exists: {0}")]
    DuplicateControlPoint(String),

    /// The engine actor is no longer running
    #[error("engine actor stopped")]
    EngineStopped,
}
