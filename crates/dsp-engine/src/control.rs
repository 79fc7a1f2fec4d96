//! Control points
//!
//! A control point is one mute + gain pair on one channel of one unit. It
//! builds the command texts for its operations and recognizes the replies
//! addressed to it. It never talks to the transport itself: the engine
//! queues what it builds and hands it the lines it might own.

use dsp_protocol::{
    db_to_level, level_to_db, relative_db, CommandStem, DeviceId, DeviceType, Group, MuteValue,
    Parameter, GAIN_STEP_DB,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

/// Index of a control point inside its engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ControlPointId(pub usize);

/// Addressing for one control point, as it appears in the `levels` config map
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlPointConfig {
    /// Display label
    #[serde(default)]
    pub label: String,
    /// Model of the addressed unit
    #[serde(rename = "DeviceType")]
    pub device_type: DeviceType,
    /// Unit id on the bus
    #[serde(rename = "DeviceId")]
    pub device_id: DeviceId,
    /// Signal group of the channel
    #[serde(rename = "Group")]
    pub group: Group,
    /// Channel designator, sent verbatim
    #[serde(rename = "Channel")]
    pub channel: String,
}

/// Last known normalized state of a control point
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControlPointState {
    /// Mute flag
    pub muted: bool,
    /// Level, 0..=65535
    pub level: u16,
}

/// Operations a control surface can request on a control point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAction {
    /// Query mute and gain
    Poll,
    /// Mute the channel
    MuteOn,
    /// Unmute the channel
    MuteOff,
    /// Invert the mute state on the device
    MuteToggle,
    /// Set an absolute level
    SetVolume(u16),
    /// Raise gain by one step
    VolumeUp {
        /// Button edge that triggered the request; every edge steps
        pressed: bool,
    },
    /// Lower gain by one step
    VolumeDown {
        /// Button edge that triggered the request; every edge steps
        pressed: bool,
    },
}

/// What a control point made of a response line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseOutcome {
    /// Not addressed to this control point
    Rejected,
    /// Addressed to this control point; no state change
    Claimed,
    /// Mute state changed to the contained value
    MuteChanged(bool),
    /// Level changed to the contained value
    LevelChanged(u16),
}

impl ParseOutcome {
    /// Whether the line was addressed to this control point
    pub fn is_claimed(&self) -> bool {
        !matches!(self, ParseOutcome::Rejected)
    }
}

/// One addressable mute + gain pair
#[derive(Debug, Clone)]
pub struct ControlPoint {
    id: ControlPointId,
    key: String,
    config: ControlPointConfig,
    mute_stem: CommandStem,
    gain_stem: CommandStem,
    mute_prefix: String,
    gain_prefix: String,
    state: ControlPointState,
}

impl ControlPoint {
    /// Create a control point
    ///
    /// `device_key` is the key of the owning DSP instance and `level_key` the
    /// key of this entry in the `levels` map; the control point key joins them
    /// with `--`.
    pub fn new(
        id: ControlPointId,
        device_key: &str,
        level_key: &str,
        config: ControlPointConfig,
    ) -> Self {
        let mute_stem = CommandStem::new(
            config.device_type,
            config.device_id,
            Parameter::Mute,
            &config.channel,
            config.group,
        );
        let gain_stem = CommandStem::new(
            config.device_type,
            config.device_id,
            Parameter::Gain,
            &config.channel,
            config.group,
        );
        let key = format!("{}--{}", device_key, level_key);

        debug!("Adding control point '{}': {}", key, config.label);

        Self {
            id,
            key,
            mute_prefix: mute_stem.reply_prefix(),
            gain_prefix: gain_stem.reply_prefix(),
            mute_stem,
            gain_stem,
            config,
            state: ControlPointState::default(),
        }
    }

    /// Engine index
    pub fn id(&self) -> ControlPointId {
        self.id
    }

    /// Control point key, `<device>--<level>`
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Display label
    pub fn label(&self) -> &str {
        &self.config.label
    }

    /// Addressing configuration
    pub fn config(&self) -> &ControlPointConfig {
        &self.config
    }

    /// Last known state
    pub fn state(&self) -> ControlPointState {
        self.state
    }

    /// Mute stem, also the mute query
    pub fn mute_stem(&self) -> &CommandStem {
        &self.mute_stem
    }

    /// Gain stem, also the gain query
    pub fn gain_stem(&self) -> &CommandStem {
        &self.gain_stem
    }

    /// Command texts to queue for an action, in transmission order
    pub fn commands(&self, action: ControlAction) -> Vec<String> {
        match action {
            ControlAction::Poll => self.poll(),
            ControlAction::MuteOn => vec![self.mute(MuteValue::On)],
            ControlAction::MuteOff => vec![self.mute(MuteValue::Off)],
            ControlAction::MuteToggle => vec![self.mute(MuteValue::Toggle)],
            ControlAction::SetVolume(level) => self.set_volume(level),
            ControlAction::VolumeUp { pressed } => self.volume_up(pressed),
            ControlAction::VolumeDown { pressed } => self.volume_down(pressed),
        }
    }

    /// Bare queries for mute and gain
    pub fn poll(&self) -> Vec<String> {
        vec![
            self.mute_stem.as_str().to_string(),
            self.gain_stem.as_str().to_string(),
        ]
    }

    /// Mute command carrying the given value
    pub fn mute(&self, value: MuteValue) -> String {
        self.mute_stem.with_value(value.as_str())
    }

    /// Absolute gain command, unmuting first when raising a muted channel
    pub fn set_volume(&self, level: u16) -> Vec<String> {
        debug!("{}: set volume {}", self.key, level);

        let mut commands = Vec::with_capacity(2);
        if level > self.state.level && self.state.muted {
            commands.push(self.mute(MuteValue::Off));
        }
        commands.push(self.gain_stem.with_value(&level_to_db(level)));
        commands
    }

    /// Relative one-step gain increase
    ///
    /// Follows the step with an unmute when the channel is not muted, which
    /// leaves a muted channel muted. Volume down never touches the mute.
    pub fn volume_up(&self, pressed: bool) -> Vec<String> {
        trace!("{}: volume up (pressed {})", self.key, pressed);

        let mut commands = vec![self.gain_stem.with_value(&relative_db(GAIN_STEP_DB))];
        if !self.state.muted {
            commands.push(self.mute(MuteValue::Off));
        }
        commands
    }

    /// Relative one-step gain decrease
    pub fn volume_down(&self, pressed: bool) -> Vec<String> {
        trace!("{}: volume down (pressed {})", self.key, pressed);

        vec![self.gain_stem.with_value(&relative_db(-GAIN_STEP_DB))]
    }

    /// Try to consume a response line
    ///
    /// Lines starting with this point's mute or gain reply prefix are claimed
    /// even when their value field cannot be decoded. State changes only on a
    /// successfully decoded value that differs from the stored one.
    pub fn parse(&mut self, line: &str) -> ParseOutcome {
        if let Some(value) = line.strip_prefix(self.mute_prefix.as_str()) {
            return match MuteValue::from_feedback(value) {
                Some(muted) if muted != self.state.muted => {
                    self.state.muted = muted;
                    ParseOutcome::MuteChanged(muted)
                }
                Some(_) => ParseOutcome::Claimed,
                None => {
                    warn!("{}: can't parse MUTE feedback: '{}'", self.key, line);
                    ParseOutcome::Claimed
                }
            };
        }

        if let Some(rest) = line.strip_prefix(self.gain_prefix.as_str()) {
            let field = rest.split_once(' ').map_or(rest, |(field, _)| field);
            if field.is_empty() {
                debug!("{}: empty GAIN feedback: '{}'", self.key, line);
                return ParseOutcome::Claimed;
            }

            return match db_to_level(field) {
                Ok(level) if level != self.state.level => {
                    self.state.level = level;
                    debug!("{}: volume feedback {}", self.key, level);
                    ParseOutcome::LevelChanged(level)
                }
                Ok(_) => ParseOutcome::Claimed,
                Err(e) => {
                    warn!("{}: can't parse GAIN feedback '{}': {}", self.key, line, e);
                    ParseOutcome::Claimed
                }
            };
        }

        ParseOutcome::Rejected
    }
}
