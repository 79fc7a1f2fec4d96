//! Addressing types shared by commands and responses
//!
//! Every command stem starts with a device-type character and a device-id
//! character, and ends with a group character. The enums here carry the
//! byte value the hardware uses for each variant, so encoding is a direct
//! byte-to-ASCII conversion. Decoding is only total over the listed variants.

use std::fmt;

use crate::error::ParseError;

/// Hardware model code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum DeviceType {
    /// 880 mixer (`1`)
    ClearOne880 = 0x31,
    /// TH20 telephone hybrid (`2`)
    ClearOneTH20 = 0x32,
    /// 840T mixer (`3`)
    ClearOne840T = 0x33,
    /// 8i mixer (`A`)
    ClearOne8i = 0x41,
    /// 880T mixer (`D`)
    ClearOne880T = 0x44,
    /// SR1212 matrix (`G`)
    ClearOneSR1212 = 0x47,
    /// 880TA mixer (`H`)
    ClearOne880TA = 0x48,
    /// SR1212A matrix (`I`)
    ClearOneSR1212A = 0x49,
    /// Beamforming microphone array (`N`)
    ClearOneBeamMic = 0x4E,
    /// Dante interface (`S`)
    #[cfg_attr(feature = "serde", serde(rename = "ClearOneDANTE"))]
    ClearOneDante = 0x53,
    /// Wildcard addressing every model (`*`)
    Any = 0x2A,
}

impl DeviceType {
    /// Every device type, in declaration order
    pub const ALL: [DeviceType; 11] = [
        DeviceType::ClearOne880,
        DeviceType::ClearOneTH20,
        DeviceType::ClearOne840T,
        DeviceType::ClearOne8i,
        DeviceType::ClearOne880T,
        DeviceType::ClearOneSR1212,
        DeviceType::ClearOne880TA,
        DeviceType::ClearOneSR1212A,
        DeviceType::ClearOneBeamMic,
        DeviceType::ClearOneDante,
        DeviceType::Any,
    ];

    /// Wire byte for this model
    pub const fn as_byte(self) -> u8 {
        self as u8
    }

    /// Wire character for this model
    pub const fn to_char(self) -> char {
        self as u8 as char
    }

    /// Decode a wire byte back into a device type
    pub fn from_byte(byte: u8) -> Result<Self, ParseError> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_byte() == byte)
            .ok_or(ParseError::UnknownDeviceType(byte))
    }

    /// Decode a wire character back into a device type
    pub fn from_char(c: char) -> Result<Self, ParseError> {
        u8::try_from(c)
            .map_err(|_| ParseError::UnknownDeviceType(0xFF))
            .and_then(Self::from_byte)
    }

    /// Returns a human-readable model name
    pub fn name(&self) -> &'static str {
        match self {
            DeviceType::ClearOne880 => "880",
            DeviceType::ClearOneTH20 => "TH20",
            DeviceType::ClearOne840T => "840T",
            DeviceType::ClearOne8i => "8i",
            DeviceType::ClearOne880T => "880T",
            DeviceType::ClearOneSR1212 => "SR1212",
            DeviceType::ClearOne880TA => "880TA",
            DeviceType::ClearOneSR1212A => "SR1212A",
            DeviceType::ClearOneBeamMic => "Beamforming Mic",
            DeviceType::ClearOneDante => "Dante",
            DeviceType::Any => "Any",
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Logical signal group a channel belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum Group {
    /// `I`
    Input = 0x49,
    /// `O`
    Output = 0x4F,
    /// `M`
    Mic = 0x4D,
    /// `J`
    AmpOut = 0x4A,
    /// `P`
    Processing = 0x50,
    /// `L`
    LineInput = 0x4C,
    /// `X`
    Fader = 0x58,
    /// `F`
    Preset = 0x46,
}

impl Group {
    /// Every group, in declaration order
    pub const ALL: [Group; 8] = [
        Group::Input,
        Group::Output,
        Group::Mic,
        Group::AmpOut,
        Group::Processing,
        Group::LineInput,
        Group::Fader,
        Group::Preset,
    ];

    /// Wire byte for this group
    pub const fn as_byte(self) -> u8 {
        self as u8
    }

    /// Wire character for this group
    pub const fn to_char(self) -> char {
        self as u8 as char
    }

    /// Decode a wire byte back into a group
    pub fn from_byte(byte: u8) -> Result<Self, ParseError> {
        Self::ALL
            .into_iter()
            .find(|g| g.as_byte() == byte)
            .ok_or(ParseError::UnknownGroup(byte))
    }

    /// Decode a wire character back into a group
    pub fn from_char(c: char) -> Result<Self, ParseError> {
        u8::try_from(c)
            .map_err(|_| ParseError::UnknownGroup(0xFF))
            .and_then(Self::from_byte)
    }
}

// Each variant is concatenated into command text as exactly one character.
const _: () = {
    let mut i = 0;
    while i < DeviceType::ALL.len() {
        assert!(DeviceType::ALL[i].as_byte().is_ascii_graphic());
        i += 1;
    }
    let mut i = 0;
    while i < Group::ALL.len() {
        assert!(Group::ALL[i].as_byte().is_ascii_graphic());
        i += 1;
    }
};

/// Unit id of a device on the bus: `0`..`9`, `A`, `B`, or the `*` wildcard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "char", into = "char")
)]
pub struct DeviceId(char);

impl DeviceId {
    /// Wildcard id addressing every unit
    pub const ANY: DeviceId = DeviceId('*');

    /// Validate a device id character
    pub fn new(c: char) -> Result<Self, ParseError> {
        match c {
            '0'..='9' | 'A' | 'B' | '*' => Ok(Self(c)),
            _ => Err(ParseError::InvalidDeviceId(c)),
        }
    }

    /// Wire character for this id
    pub fn to_char(self) -> char {
        self.0
    }
}

impl TryFrom<char> for DeviceId {
    type Error = ParseError;

    fn try_from(c: char) -> Result<Self, Self::Error> {
        Self::new(c)
    }
}

impl From<DeviceId> for char {
    fn from(id: DeviceId) -> char {
        id.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Key identifying one physical unit: device-type character followed by id character
pub fn device_key(device_type: DeviceType, device_id: DeviceId) -> String {
    format!("{}{}", device_type.to_char(), device_id.to_char())
}
