//! Conversion between normalized levels and device gain values
//!
//! Control surfaces work with a 16-bit level (`0..=65535`). The DSP reports
//! and accepts gain as a decimal dB value with two fraction digits, between
//! [`MIN_GAIN_DB`] and [`MAX_GAIN_DB`]. Both directions are the same linear
//! [`scale`] with the ranges swapped, so a level survives a round trip only to
//! within the resolution of the two-digit dB string.

use crate::error::{ParseError, ProtocolError};

/// Lowest gain the device accepts, in dB
pub const MIN_GAIN_DB: f64 = -65.0;

/// Highest gain the device accepts, in dB
pub const MAX_GAIN_DB: f64 = 20.0;

/// Full-scale normalized level
pub const MAX_LEVEL: u16 = u16::MAX;

/// Step used by relative volume up/down, in dB
pub const GAIN_STEP_DB: f64 = 1.0;

/// How a gain value is applied by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GainMode {
    /// Set the gain to the given value (`A`)
    Absolute,
    /// Add the given signed delta to the current gain (`R`)
    Relative,
}

impl GainMode {
    /// Suffix character appended after the value
    pub fn suffix(&self) -> char {
        match self {
            GainMode::Absolute => 'A',
            GainMode::Relative => 'R',
        }
    }
}

/// Map `input` from `[in_min, in_max]` linearly onto `[out_min, out_max]`
///
/// Fails with [`ProtocolError::InvalidRange`] when the input range is empty
/// or inverted. The input is not clamped.
pub fn scale(
    input: f64,
    in_min: f64,
    in_max: f64,
    out_min: f64,
    out_max: f64,
) -> Result<f64, ProtocolError> {
    let in_range = in_max - in_min;
    if in_range <= 0.0 {
        return Err(ProtocolError::InvalidRange {
            min: in_min,
            max: in_max,
        });
    }

    let out_range = out_max - out_min;
    let output = ((input - in_min) * out_range) / in_range + out_min;

    tracing::trace!(
        "scaled {} from [{}, {}] to {} in [{}, {}]",
        input,
        in_min,
        in_max,
        output,
        out_min,
        out_max
    );

    Ok(output)
}

/// Format a dB value with two fraction digits and the mode suffix, e.g. `-20.00 A`
pub fn format_gain(db: f64, mode: GainMode) -> String {
    let mut value = format!("{:.2}", db);
    if value == "-0.00" {
        value.remove(0);
    }
    format!("{} {}", value, mode.suffix())
}

/// Convert a normalized level to the absolute-mode gain field, e.g. `-20.00 A`
pub fn level_to_db(level: u16) -> String {
    // The level range is a non-empty constant, so scaling cannot fail.
    let db = scale(f64::from(level), 0.0, f64::from(MAX_LEVEL), MIN_GAIN_DB, MAX_GAIN_DB)
        .unwrap_or(MIN_GAIN_DB);
    format_gain(db, GainMode::Absolute)
}

/// Relative adjustment field for a signed dB delta, e.g. `1.00 R`
pub fn relative_db(delta: f64) -> String {
    format_gain(delta, GainMode::Relative)
}

/// Convert a dB value to a normalized level
///
/// Values outside the device range saturate at the level bounds; the fraction
/// is truncated.
fn db_value_to_level(db: f64) -> Result<u16, ProtocolError> {
    let level = scale(db, MIN_GAIN_DB, MAX_GAIN_DB, 0.0, f64::from(MAX_LEVEL))?;
    Ok(level.clamp(0.0, f64::from(MAX_LEVEL)) as u16)
}

/// Parse a dB literal as sent by the device and convert it to a normalized level
pub fn db_to_level(db: &str) -> Result<u16, ProtocolError> {
    let value = db
        .trim()
        .parse::<f64>()
        .map_err(|_| ParseError::InvalidNumber(db.to_string()))?;
    if !value.is_finite() {
        return Err(ParseError::InvalidNumber(db.to_string()).into());
    }
    db_value_to_level(value)
}
