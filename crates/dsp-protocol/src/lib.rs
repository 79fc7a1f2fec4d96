//! DSP Control Protocol Library
//!
//! This crate provides encoding and parsing for the line-oriented text
//! protocol spoken by a family of conferencing/installed-audio DSP units.
//! Several units can share one serial or TCP link; each is addressed by a
//! device-type character and a device-id character.
//!
//! # Architecture
//!
//! - [`types`]: device type, group and id codes with their wire characters
//! - [`level`]: normalized level (0..=65535) to dB conversion
//! - [`command`]: command stems, mute/gain value fields
//! - [`framing`]: outbound framing, inbound CR LF line codec and line classification
//! - [`banner`]: version banner parsing
//!
//! Nothing here performs I/O; the engine crate owns queueing and correlation.
//!
//! # Example
//!
//! ```rust
//! use dsp_protocol::{CommandStem, DeviceId, DeviceType, Group, Parameter};
//! use dsp_protocol::{db_to_level, frame_command, level_to_db};
//!
//! let stem = CommandStem::new(
//!     DeviceType::ClearOne880,
//!     DeviceId::new('A').unwrap(),
//!     Parameter::Gain,
//!     "3",
//!     Group::Input,
//! );
//!
//! let command = stem.with_value(&level_to_db(65535));
//! assert_eq!(frame_command(&command), "#1A GAIN 3 I 20.00 A\r\n");
//!
//! assert_eq!(db_to_level("-65.00").unwrap(), 0);
//! ```

pub mod banner;
pub mod command;
pub mod error;
pub mod framing;
pub mod level;
pub mod types;

pub use banner::{parse_version_banner, VersionBanner};
pub use command::{
    CommandStem, MuteValue, Parameter, BARE_REPLY_PREFIX, OK_REPLY_PREFIX, VERSION_QUERY,
};
pub use error::{ParseError, ProtocolError};
pub use framing::{
    classify_line, frame_command, is_structured_reply, LineCodec, LineKind, LINE_TERMINATOR,
};
pub use level::{
    db_to_level, format_gain, level_to_db, relative_db, scale, GainMode, GAIN_STEP_DB,
    MAX_GAIN_DB, MAX_LEVEL, MIN_GAIN_DB,
};
pub use types::{device_key, DeviceId, DeviceType, Group};
