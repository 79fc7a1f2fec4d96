//! Virtual DSP
//!
//! Answers the line protocol the way a rack of units sharing one port would:
//! every command names a unit by type and id, the matching unit applies it to
//! the addressed channel and echoes the stem with the resulting value. Units
//! answer the global version query with one banner each. Anything it does not
//! understand gets an `ERROR` line.

use std::collections::HashMap;

use dsp_protocol::{
    device_key, format_gain, DeviceId, DeviceType, GainMode, Group, MuteValue, MAX_GAIN_DB, MIN_GAIN_DB,
    VERSION_QUERY,
};
use tracing::{debug, warn};

/// One simulated unit on the bus
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualUnit {
    /// Model
    pub device_type: DeviceType,
    /// Unit id
    pub device_id: DeviceId,
    /// Firmware version reported in banners
    pub version: String,
}

impl VirtualUnit {
    /// Device key, type character then id character
    pub fn key(&self) -> String {
        device_key(self.device_type, self.device_id)
    }

    fn answers(&self, device_type: DeviceType, device_id: DeviceId) -> bool {
        (device_type == DeviceType::Any || device_type == self.device_type)
            && (device_id == DeviceId::ANY || device_id == self.device_id)
    }
}

/// Mute and gain of one channel; a channel nobody touched is unmuted at 0 dB
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ChannelState {
    /// Mute flag
    pub muted: bool,
    /// Gain in dB
    pub gain_db: f64,
}

/// Simulated DSP bus
#[derive(Debug)]
pub struct VirtualDsp {
    /// Identifier for logging
    id: String,
    units: Vec<VirtualUnit>,
    /// Channel state keyed by `<addr> <channel> <group>`
    channels: HashMap<String, ChannelState>,
    silent: bool,
    prompt: bool,
    /// Commands received (for test verification)
    received_commands: Vec<String>,
}

impl VirtualDsp {
    /// Create a bus with no units
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            units: Vec::new(),
            channels: HashMap::new(),
            silent: false,
            prompt: false,
            received_commands: Vec::new(),
        }
    }

    /// Add a unit to the bus
    pub fn with_unit(mut self, device_type: DeviceType, device_id: DeviceId, version: &str) -> Self {
        self.add_unit(device_type, device_id, version);
        self
    }

    /// Add a unit to the bus
    pub fn add_unit(&mut self, device_type: DeviceType, device_id: DeviceId, version: &str) {
        self.units.push(VirtualUnit {
            device_type,
            device_id,
            version: version.to_string(),
        });
    }

    /// Get the identifier
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Units on the bus
    pub fn units(&self) -> &[VirtualUnit] {
        &self.units
    }

    /// Stop answering; commands are still recorded
    pub fn set_silent(&mut self, silent: bool) {
        self.silent = silent;
    }

    /// Whether the bus is ignoring commands
    pub fn is_silent(&self) -> bool {
        self.silent
    }

    /// Follow every answer with an `OK> ` prompt line
    pub fn set_prompt(&mut self, prompt: bool) {
        self.prompt = prompt;
    }

    /// Commands received so far, without the `#`
    pub fn received_commands(&self) -> &[String] {
        &self.received_commands
    }

    /// State of a channel, e.g. `channel("1A", "3", Group::Input)`
    pub fn channel(&self, addr: &str, channel: &str, group: Group) -> Option<ChannelState> {
        self.channels
            .get(&channel_key(addr, channel, group))
            .copied()
    }

    /// Preset the state of a channel
    pub fn set_channel(&mut self, addr: &str, channel: &str, group: Group, state: ChannelState) {
        self.channels
            .insert(channel_key(addr, channel, group), state);
    }

    /// Banner lines announcing every unit
    pub fn banner_lines(&self) -> Vec<String> {
        self.units
            .iter()
            .map(|u| format!("OK> #{} VER {}", u.key(), u.version))
            .collect()
    }

    /// Handle one de-framed line and return the reply lines
    pub fn process_line(&mut self, line: &str) -> Vec<String> {
        let Some(command) = line.strip_prefix('#') else {
            warn!("Virtual DSP {} got unframed line '{}'", self.id, line);
            return vec![format!("ERROR: expected # in '{}'", line)];
        };

        self.received_commands.push(command.to_string());
        if self.silent {
            debug!("Virtual DSP {} ignoring '{}'", self.id, command);
            return Vec::new();
        }

        let mut replies = if command.trim() == VERSION_QUERY {
            self.banner_lines()
        } else {
            vec![self.execute(command).unwrap_or_else(|e| format!("ERROR: {}", e))]
        };

        if self.prompt {
            replies.push("OK> ".to_string());
        }
        replies
    }

    fn execute(&mut self, command: &str) -> Result<String, String> {
        let tokens: Vec<&str> = command.split_whitespace().collect();
        let [addr, keyword, channel, group, value @ ..] = tokens.as_slice() else {
            return Err(format!("syntax '{}'", command));
        };

        let mut addr_chars = addr.chars();
        let (Some(type_char), Some(id_char), None) =
            (addr_chars.next(), addr_chars.next(), addr_chars.next())
        else {
            return Err(format!("bad address '{}'", addr));
        };
        let device_type = DeviceType::from_char(type_char).map_err(|e| e.to_string())?;
        let device_id = DeviceId::new(id_char).map_err(|e| e.to_string())?;
        if !self.units.iter().any(|u| u.answers(device_type, device_id)) {
            return Err(format!("no device '{}'", addr));
        }

        let group = single_char(group)
            .and_then(|c| Group::from_char(c).ok())
            .ok_or_else(|| format!("bad group '{}'", group))?;

        let key = channel_key(addr, channel, group);
        let state = self.channels.entry(key).or_default();

        let field = match *keyword {
            "MUTE" => apply_mute(state, value)?,
            "GAIN" => apply_gain(state, value)?,
            _ => return Err(format!("unknown command '{}'", keyword)),
        };

        debug!("Virtual DSP {} {} -> {}", self.id, command, field);
        Ok(format!(
            "OK> #{} {} {} {} {}",
            addr,
            keyword,
            channel,
            group.to_char(),
            field
        ))
    }
}

fn channel_key(addr: &str, channel: &str, group: Group) -> String {
    format!("{} {} {}", addr, channel, group.to_char())
}

fn single_char(s: &str) -> Option<char> {
    let mut chars = s.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Some(c),
        _ => None,
    }
}

fn apply_mute(state: &mut ChannelState, value: &[&str]) -> Result<String, String> {
    match value {
        [] => {}
        [v] if *v == MuteValue::Off.as_str() => state.muted = false,
        [v] if *v == MuteValue::On.as_str() => state.muted = true,
        [v] if *v == MuteValue::Toggle.as_str() => state.muted = !state.muted,
        _ => return Err(format!("bad mute value '{}'", value.join(" "))),
    }
    let reported = if state.muted {
        MuteValue::On
    } else {
        MuteValue::Off
    };
    Ok(reported.as_str().to_string())
}

fn apply_gain(state: &mut ChannelState, value: &[&str]) -> Result<String, String> {
    match value {
        [] => {}
        [db, mode] => {
            let db: f64 = db
                .parse()
                .ok()
                .filter(|v: &f64| v.is_finite())
                .ok_or_else(|| format!("bad gain '{}'", db))?;
            let target = match *mode {
                "A" => db,
                "R" => state.gain_db + db,
                _ => return Err(format!("bad gain mode '{}'", mode)),
            };
            state.gain_db = target.clamp(MIN_GAIN_DB, MAX_GAIN_DB);
        }
        _ => return Err(format!("bad gain value '{}'", value.join(" "))),
    }
    Ok(format_gain(state.gain_db, GainMode::Absolute))
}
