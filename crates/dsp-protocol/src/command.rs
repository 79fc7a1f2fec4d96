//! Command stems and value fields
//!
//! A command is a stem optionally followed by a space and a value field:
//!
//! ```text
//! <type><id> MUTE <channel> <group> [0|1|2]
//! <type><id> GAIN <channel> <group> [<db> A|R]
//! ```
//!
//! A stem without a value is a query. The device echoes the stem in its
//! reply, which is how replies are correlated back to the control that asked.

use std::fmt;

use crate::types::{DeviceId, DeviceType, Group};

/// Global query asking every unit on the bus to report its firmware version
pub const VERSION_QUERY: &str = "** VER";

/// Prefix of a structured reply that echoes a command
pub const OK_REPLY_PREFIX: &str = "OK> #";

/// Prefix of a structured reply without the `OK` status
pub const BARE_REPLY_PREFIX: &str = "> #";

/// Parameter addressed by a stem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Parameter {
    /// Mute state
    Mute,
    /// Gain in dB
    Gain,
}

impl Parameter {
    /// Keyword used on the wire
    pub fn keyword(&self) -> &'static str {
        match self {
            Parameter::Mute => "MUTE",
            Parameter::Gain => "GAIN",
        }
    }
}

/// Mute value field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MuteValue {
    /// Unmuted (`0`)
    Off,
    /// Muted (`1`)
    On,
    /// Invert the current state (`2`); outbound only
    Toggle,
}

impl MuteValue {
    /// Value field on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            MuteValue::Off => "0",
            MuteValue::On => "1",
            MuteValue::Toggle => "2",
        }
    }

    /// Parse a mute feedback field
    ///
    /// Only `0` and `1` are valid in feedback; toggle is never reported back.
    pub fn from_feedback(field: &str) -> Option<bool> {
        match field {
            "0" => Some(false),
            "1" => Some(true),
            _ => None,
        }
    }
}

/// Fixed text identifying one parameter on one channel of one unit
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CommandStem(String);

impl CommandStem {
    /// Build a stem for the given address
    pub fn new(
        device_type: DeviceType,
        device_id: DeviceId,
        parameter: Parameter,
        channel: &str,
        group: Group,
    ) -> Self {
        Self(format!(
            "{}{} {} {} {}",
            device_type.to_char(),
            device_id.to_char(),
            parameter.keyword(),
            channel,
            group.to_char()
        ))
    }

    /// Stem text
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Command text carrying a value field
    pub fn with_value(&self, value: &str) -> String {
        format!("{} {}", self.0, value)
    }

    /// Prefix of an `OK` reply for this stem, including the separating space
    pub fn reply_prefix(&self) -> String {
        format!("{}{} ", OK_REPLY_PREFIX, self.0)
    }
}

impl fmt::Display for CommandStem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
