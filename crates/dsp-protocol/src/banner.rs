//! Version banner parsing
//!
//! Units answer the global [`VERSION_QUERY`](crate::VERSION_QUERY), and also
//! announce themselves unsolicited after a reboot, with a line such as:
//!
//! ```text
//! OK> #1A VER 2.5.1
//! ```
//!
//! The first token after `#` is the device key (type character then id
//! character). The firmware version is the token after `VER`. Some units put
//! a purely numeric build number there and the version after it:
//!
//! ```text
//! OK> #1A VER 123 v2.5.1
//! ```
//!
//! A numeric token followed by another one is read as such a build number.
//! Anything else after the version, as in `3.2.1 build7`, is ignored.

use crate::error::ParseError;
use crate::types::{DeviceId, DeviceType};

/// Token that marks a version line
pub const VERSION_TOKEN: &str = " VER ";

/// Identity reported by one unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionBanner {
    /// Device key, verbatim from the line
    pub key: String,
    /// Model decoded from the first key character
    pub device_type: DeviceType,
    /// Unit id from the second key character
    pub device_id: DeviceId,
    /// Firmware version string
    pub version: String,
}

/// Whether a line is a version banner at all
fn is_version_line(line: &str) -> bool {
    line.contains(VERSION_TOKEN)
}

/// Extract the fields of a version banner
///
/// Returns `None` if the line carries no version token. A line that has the
/// token but malformed fields yields `Some(Err(_))`.
pub fn parse_version_banner(line: &str) -> Option<Result<VersionBanner, ParseError>> {
    if !is_version_line(line) {
        return None;
    }
    Some(extract_fields(line))
}

fn extract_fields(line: &str) -> Result<VersionBanner, ParseError> {
    let body = line
        .find('#')
        .map(|pos| &line[pos + 1..])
        .ok_or(ParseError::MissingField("#"))?;

    let mut tokens = body.split_whitespace();
    let key = tokens.next().ok_or(ParseError::MissingField("device key"))?;

    let mut chars = key.chars();
    let type_char = chars.next().ok_or(ParseError::MissingField("device type"))?;
    let id_char = chars.next().ok_or(ParseError::MissingField("device id"))?;
    let device_type = DeviceType::from_char(type_char)?;
    let device_id = DeviceId::new(id_char)?;

    if tokens.next() != Some("VER") {
        return Err(ParseError::MissingField("VER"));
    }
    let first = tokens.next().ok_or(ParseError::MissingField("version"))?;
    let version = match tokens.next() {
        Some(next) if is_build_number(first) => next,
        _ => first,
    };

    Ok(VersionBanner {
        key: key.to_string(),
        device_type,
        device_id,
        version: version.to_string(),
    })
}

fn is_build_number(token: &str) -> bool {
    token.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_banner() {
        let banner = parse_version_banner("OK> #1A VER 2.5.1").unwrap().unwrap();
        assert_eq!(banner.key, "1A");
        assert_eq!(banner.device_type, DeviceType::ClearOne880);
        assert_eq!(banner.device_id.to_char(), 'A');
        assert_eq!(banner.version, "2.5.1");
    }

    #[test]
    fn test_parse_banner_with_build_field() {
        let banner = parse_version_banner("OK> #1A VER 123 v2.5.1")
            .unwrap()
            .unwrap();
        assert_eq!(banner.key, "1A");
        assert_eq!(banner.version, "v2.5.1");
    }

    #[test]
    fn test_trailing_fields_after_version_ignored() {
        let banner = parse_version_banner("OK> #1A VER 3.2.1 build7")
            .unwrap()
            .unwrap();
        assert_eq!(banner.version, "3.2.1");
    }

    #[test]
    fn test_numeric_version_alone() {
        let banner = parse_version_banner("OK> #1A VER 123").unwrap().unwrap();
        assert_eq!(banner.version, "123");
    }

    #[test]
    fn test_parse_bare_prompt_banner() {
        let banner = parse_version_banner("> #H0 VER 4.1.0").unwrap().unwrap();
        assert_eq!(banner.key, "H0");
        assert_eq!(banner.device_type, DeviceType::ClearOne880TA);
    }

    #[test]
    fn test_non_version_line() {
        assert!(parse_version_banner("OK> #1A GAIN 3 I 0.00 A").is_none());
        assert!(parse_version_banner("OK> #1A VERSION").is_none());
    }

    #[test]
    fn test_malformed_banner_is_claimed_with_error() {
        assert_eq!(
            parse_version_banner("OK> #1A VER "),
            Some(Err(ParseError::MissingField("version")))
        );
        assert_eq!(
            parse_version_banner("OK> #ZA VER 1.0"),
            Some(Err(ParseError::UnknownDeviceType(b'Z')))
        );
        assert_eq!(
            parse_version_banner("no hash VER 1.0"),
            Some(Err(ParseError::MissingField("#")))
        );
    }
}
