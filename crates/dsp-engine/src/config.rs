//! Device configuration
//!
//! The JSON shape of one DSP instance:
//!
//! ```json
//! {
//!   "key": "dsp1",
//!   "control": { "method": "com", "port": "/dev/ttyUSB0", "baudRate": 57600 },
//!   "communicationMonitorProperties": {
//!     "pollInterval": 30000, "timeToWarning": 30000, "timeToError": 60000
//!   },
//!   "levels": {
//!     "podium": {
//!       "label": "Podium Mic",
//!       "DeviceType": "ClearOne880", "DeviceId": "A", "Group": "Mic", "Channel": "1"
//!     }
//!   }
//! }
//! ```
//!
//! Control points are registered in `levels` key order, which is also the
//! order unsolicited replies are offered to them.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::control::ControlPointConfig;
use crate::engine::{EngineConfig, ProtocolEngine, DEFAULT_COMMAND_TIMEOUT, DEFAULT_DEVICE_KEY};
use crate::error::EngineError;
use crate::monitor::MonitorConfig;
use crate::queue::DEFAULT_QUEUE_CAPACITY;

/// Default serial baud rate
pub const DEFAULT_BAUD_RATE: u32 = 57_600;

fn default_key() -> String {
    DEFAULT_DEVICE_KEY.to_string()
}

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

fn default_command_timeout() -> u64 {
    DEFAULT_COMMAND_TIMEOUT.as_millis() as u64
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

/// How to reach the DSP
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "lowercase")]
pub enum ControlConfig {
    /// Serial port
    Com {
        /// Port name, e.g. `/dev/ttyUSB0` or `COM3`
        port: String,
        /// Baud rate
        #[serde(rename = "baudRate", default = "default_baud_rate")]
        baud_rate: u32,
    },
    /// TCP socket, e.g. behind a serial device server
    Tcp {
        /// Host name or address
        address: String,
        /// TCP port
        port: u16,
    },
}

impl fmt::Display for ControlConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlConfig::Com { port, baud_rate } => write!(f, "{} @ {}", port, baud_rate),
            ControlConfig::Tcp { address, port } => write!(f, "tcp://{}:{}", address, port),
        }
    }
}

/// Configuration of one DSP instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DspConfig {
    /// Instance key, prefix of control point keys
    #[serde(default = "default_key")]
    pub key: String,

    /// Transport; may be omitted when running against the simulator
    #[serde(default)]
    pub control: Option<ControlConfig>,

    /// Monitor timings; defaults apply when omitted
    #[serde(rename = "communicationMonitorProperties", default)]
    pub communication_monitor: Option<MonitorConfig>,

    /// In-flight timeout in milliseconds
    #[serde(rename = "commandTimeout", default = "default_command_timeout")]
    pub command_timeout_ms: u64,

    /// Maximum number of waiting commands
    #[serde(rename = "queueCapacity", default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Control points by level key
    pub levels: BTreeMap<String, ControlPointConfig>,
}

impl DspConfig {
    /// Parse a configuration document
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read and parse a configuration file
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let contents = std::fs::read_to_string(path)?;
        let config = Self::from_json(&contents)?;
        info!(
            "Loaded configuration from {} ({} level(s))",
            path.display(),
            config.levels.len()
        );
        Ok(config)
    }

    /// Engine settings derived from this configuration
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            key: self.key.clone(),
            command_timeout: Duration::from_millis(self.command_timeout_ms),
            queue_capacity: self.queue_capacity,
            monitor: self.communication_monitor.unwrap_or_default(),
        }
    }

    /// Build an engine with every configured control point registered
    pub fn build_engine(&self) -> Result<ProtocolEngine, EngineError> {
        let mut engine = ProtocolEngine::with_config(self.engine_config());
        for (level_key, level) in &self.levels {
            engine.add_control_point(level_key, level.clone())?;
        }
        Ok(engine)
    }
}
