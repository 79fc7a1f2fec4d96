//! Event stream published by the engine
//!
//! Feedback, traffic and link state all go out through one broadcast
//! channel, so a console or bridge sees them in the order the engine
//! produced them.

use crate::control::ControlPointId;
use crate::devices::DeviceInfoRecord;
use crate::monitor::MonitorStatus;

/// Everything observable about the engine
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    // -------------------------------------------------------------------------
    // Feedback
    // -------------------------------------------------------------------------
    /// A control point's mute state changed
    MuteChanged {
        /// Control point index
        id: ControlPointId,
        /// Control point key
        key: String,
        /// New mute state
        muted: bool,
    },

    /// A control point's level changed
    LevelChanged {
        /// Control point index
        id: ControlPointId,
        /// Control point key
        key: String,
        /// New level, 0..=65535
        level: u16,
    },

    /// A unit announced its version
    DeviceInfo {
        /// Device key, type character then id character
        key: String,
        /// Recorded identity
        record: DeviceInfoRecord,
    },

    // -------------------------------------------------------------------------
    // Traffic
    // -------------------------------------------------------------------------
    /// Command text handed to the transport, without framing
    CommandSent {
        /// Command text
        text: String,
    },

    /// Response line accepted into the inbox
    LineReceived {
        /// Line text
        line: String,
    },

    /// The device reported an error
    DeviceError {
        /// Line text
        line: String,
    },

    /// The in-flight command got no reply in time
    CommandTimedOut {
        /// Command text
        text: String,
    },

    // -------------------------------------------------------------------------
    // Link
    // -------------------------------------------------------------------------
    /// The transport is up
    Connected,

    /// The transport went down
    Disconnected,

    /// The communication monitor status changed
    StatusChanged {
        /// New status
        status: MonitorStatus,
    },

    /// Error reported by a task around the engine
    Error {
        /// Where the error came from
        source: String,
        /// Error message
        message: String,
    },
}

impl EngineEvent {
    /// Whether this is mute or level feedback
    pub fn is_feedback(&self) -> bool {
        matches!(
            self,
            EngineEvent::MuteChanged { .. } | EngineEvent::LevelChanged { .. }
        )
    }

    /// Control point this event concerns, if any
    pub fn control_point(&self) -> Option<ControlPointId> {
        match self {
            EngineEvent::MuteChanged { id, .. } | EngineEvent::LevelChanged { id, .. } => {
                Some(*id)
            }
            _ => None,
        }
    }
}
