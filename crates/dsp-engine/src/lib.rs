//! DSP Control Engine
//!
//! This crate provides the command queue, response correlation and control
//! point logic for driving a line-oriented audio DSP over one serial or TCP
//! link.
//!
//! # Architecture
//!
//! The link is half duplex with at most one outstanding request. The engine
//! keeps a FIFO of distinct command texts and sends the next one only when
//! nothing is in flight; a reply, a timeout or a disconnect frees the slot.
//!
//! - [`ProtocolEngine`]: synchronous state machine; no I/O
//! - [`run_engine_actor`]: async task owning the engine, driven by an
//!   [`EngineHandle`], a transport link and the monitor timers
//! - [`LineConnection`]: byte stream to CR LF lines and back
//! - [`DspConfig`]: JSON configuration of one DSP instance
//!
//! # Example
//!
//! ```rust
//! use dsp_engine::{ControlAction, ControlPointConfig, ProtocolEngine};
//! use dsp_protocol::{DeviceId, DeviceType, Group};
//!
//! let mut engine = ProtocolEngine::new();
//! let podium = engine
//!     .add_control_point(
//!         "podium",
//!         ControlPointConfig {
//!             label: "Podium".into(),
//!             device_type: DeviceType::ClearOne880,
//!             device_id: DeviceId::new('A').unwrap(),
//!             group: Group::Mic,
//!             channel: "1".into(),
//!         },
//!     )
//!     .unwrap();
//!
//! engine.set_connected(true);
//! engine.control(podium, ControlAction::MuteOn).unwrap();
//! assert_eq!(engine.drain_outbox(), vec!["#1A MUTE 1 M 1\r\n"]);
//!
//! engine.queue_response("OK> #1A MUTE 1 M 1".into());
//! engine.process_responses();
//! assert!(engine.control_point(podium).unwrap().state().muted);
//! ```

pub mod actor;
pub mod config;
pub mod control;
pub mod devices;
pub mod engine;
pub mod error;
pub mod events;
pub mod monitor;
pub mod queue;
pub mod transport;

// Re-export actor types
pub use actor::{
    run_engine_actor, spawn_engine, ControlPointHandle, ControlPointSnapshot, EngineActorCommand,
    EngineHandle, EngineStatus,
};

pub use config::{ControlConfig, DspConfig, DEFAULT_BAUD_RATE};
pub use control::{
    ControlAction, ControlPoint, ControlPointConfig, ControlPointId, ControlPointState,
    ParseOutcome,
};
pub use devices::{DeviceInfoRecord, DeviceRegistry};
pub use engine::{EngineConfig, ProtocolEngine, DEFAULT_COMMAND_TIMEOUT, DEFAULT_DEVICE_KEY};
pub use error::EngineError;
pub use events::EngineEvent;
pub use monitor::{CommunicationMonitor, MonitorConfig, MonitorStatus};
pub use queue::{CommandQueue, EnqueueOutcome, QueuedCommand, DEFAULT_QUEUE_CAPACITY};
pub use transport::{
    link, ConnectionEnd, EngineLink, LineConnection, TransportEvent, TransportLink,
};
