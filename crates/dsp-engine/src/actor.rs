//! Engine Actor
//!
//! This module runs a [`ProtocolEngine`] inside an async task. The task is the
//! only owner of the engine, so every caller is serialized through its
//! command channel and no lock is needed.
//!
//! # Architecture
//!
//! The actor waits on four sources at once:
//! - commands from any number of [`EngineHandle`]s
//! - lines and link state from the transport task
//! - the deadline of the in-flight command
//! - the poll and status timers of the communication monitor
//!
//! After each wake-up it flushes framed text to the transport and publishes
//! buffered events on a broadcast channel.
//!
//! # Example
//!
//! ```rust,ignore
//! use dsp_engine::{link, spawn_engine, ControlAction, ProtocolEngine};
//!
//! let (engine_end, transport_end) = link();
//! let (handle, task) = spawn_engine(ProtocolEngine::new(), engine_end);
//!
//! let mut events = handle.subscribe();
//! let podium = handle.control_point("podium").await?;
//! podium.mute_on()?;
//! ```

use std::time::Instant;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval, interval_at, sleep_until, Duration, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::control::{ControlAction, ControlPoint, ControlPointId, ControlPointState};
use crate::devices::DeviceInfoRecord;
use crate::engine::ProtocolEngine;
use crate::error::EngineError;
use crate::events::EngineEvent;
use crate::monitor::MonitorStatus;
use crate::queue::QueuedCommand;
use crate::transport::{EngineLink, TransportEvent};

/// How often the communication monitor re-evaluates silence
const STATUS_CHECK_INTERVAL: Duration = Duration::from_millis(1000);

/// Capacity of the broadcast event channel
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Snapshot of one control point
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlPointSnapshot {
    /// Engine index
    pub id: ControlPointId,
    /// Control point key
    pub key: String,
    /// Display label
    pub label: String,
    /// Last known state
    pub state: ControlPointState,
}

/// Snapshot of the engine as a whole
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineStatus {
    /// Transport is up
    pub connected: bool,
    /// Communication monitor status
    pub monitor: MonitorStatus,
    /// Command awaiting a reply
    pub in_flight: Option<String>,
    /// Number of waiting commands
    pub queued: usize,
    /// Number of units seen
    pub devices: usize,
}

/// Commands sent to the engine actor
#[derive(Debug)]
pub enum EngineActorCommand {
    /// Run an action on a control point
    Control {
        /// Target control point
        id: ControlPointId,
        /// Requested action
        action: ControlAction,
    },

    /// Queue a command with no owning control point
    Enqueue {
        /// Command text
        text: String,
    },

    /// Transmit text immediately, outside the queue
    RawSend {
        /// Command text
        text: String,
    },

    /// Run a poll cycle now
    PollAll,

    /// Resolve a control point key
    FindControlPoint {
        /// Full key or level key
        key: String,
        /// Channel to send back the id (or None if not found)
        response: oneshot::Sender<Option<ControlPointId>>,
    },

    /// Query the state of one control point
    QueryControlPoint {
        /// Control point to query
        id: ControlPointId,
        /// Channel to send back the snapshot (or None if not found)
        response: oneshot::Sender<Option<ControlPointSnapshot>>,
    },

    /// List every control point
    ListControlPoints {
        /// Channel to send back the snapshots
        response: oneshot::Sender<Vec<ControlPointSnapshot>>,
    },

    /// List every unit seen in a version banner
    QueryDevices {
        /// Channel to send back the records, in key order
        response: oneshot::Sender<Vec<(String, DeviceInfoRecord)>>,
    },

    /// Render the operator device listing
    DeviceReport {
        /// Channel to send back the report
        response: oneshot::Sender<String>,
    },

    /// Query engine status
    QueryStatus {
        /// Channel to send back the status
        response: oneshot::Sender<EngineStatus>,
    },

    /// Shutdown the actor
    Shutdown,
}

fn snapshot(cp: &ControlPoint) -> ControlPointSnapshot {
    ControlPointSnapshot {
        id: cp.id(),
        key: cp.key().to_string(),
        label: cp.label().to_string(),
        state: cp.state(),
    }
}

/// Returns false when the actor should stop
fn handle_command(engine: &mut ProtocolEngine, cmd: EngineActorCommand) -> bool {
    match cmd {
        EngineActorCommand::Control { id, action } => {
            if let Err(e) = engine.control(id, action) {
                warn!("Ignoring {:?}: {}", action, e);
            }
        }

        EngineActorCommand::Enqueue { text } => {
            engine.enqueue(QueuedCommand::global(text));
        }

        EngineActorCommand::RawSend { text } => {
            engine.raw_send(&text);
        }

        EngineActorCommand::PollAll => engine.poll_all(),

        EngineActorCommand::FindControlPoint { key, response } => {
            let _ = response.send(engine.find_control_point(&key));
        }

        EngineActorCommand::QueryControlPoint { id, response } => {
            let _ = response.send(engine.control_point(id).map(snapshot));
        }

        EngineActorCommand::ListControlPoints { response } => {
            let all = engine.control_points().map(snapshot).collect();
            let _ = response.send(all);
        }

        EngineActorCommand::QueryDevices { response } => {
            let devices = engine
                .devices()
                .iter()
                .map(|(key, record)| (key.to_string(), record.clone()))
                .collect();
            let _ = response.send(devices);
        }

        EngineActorCommand::DeviceReport { response } => {
            let _ = response.send(engine.devices().report());
        }

        EngineActorCommand::QueryStatus { response } => {
            let _ = response.send(EngineStatus {
                connected: engine.is_connected(),
                monitor: engine.status(),
                in_flight: engine.in_flight().map(|c| c.text.clone()),
                queued: engine.queue().len(),
                devices: engine.devices().len(),
            });
        }

        EngineActorCommand::Shutdown => {
            info!("Engine actor shutting down");
            return false;
        }
    }
    true
}

fn handle_transport_event(engine: &mut ProtocolEngine, event: TransportEvent) {
    match event {
        TransportEvent::Connected => engine.set_connected(true),
        TransportEvent::Disconnected => engine.set_connected(false),
        TransportEvent::Line(line) => engine.queue_response(line),
        TransportEvent::DeviceError(line) => engine.device_error(line),
        TransportEvent::Activity => engine.record_activity(),
        TransportEvent::Failed { source, message } => engine.transport_error(source, message),
    }
}

/// Hand engine output to the transport and subscribers
fn flush(
    engine: &mut ProtocolEngine,
    outbound: &mpsc::UnboundedSender<String>,
    event_tx: &broadcast::Sender<EngineEvent>,
) {
    for text in engine.drain_outbox() {
        if outbound.send(text).is_err() {
            debug!("Transport link closed, output dropped");
        }
    }
    for event in engine.drain_events() {
        // No subscribers is fine
        let _ = event_tx.send(event);
    }
}

/// Run the engine actor
///
/// Owns `engine` until a [`EngineActorCommand::Shutdown`] arrives or every
/// command sender is dropped. The first monitor poll happens one poll interval
/// after start; use [`EngineHandle::poll`] to poll immediately.
///
/// # Arguments
///
/// * `engine` - The engine to drive
/// * `cmd_rx` - Receiver for commands sent to the actor
/// * `link` - Engine end of the transport channels
/// * `event_tx` - Sender for events emitted by the engine
pub async fn run_engine_actor(
    mut engine: ProtocolEngine,
    mut cmd_rx: mpsc::UnboundedReceiver<EngineActorCommand>,
    link: EngineLink,
    event_tx: broadcast::Sender<EngineEvent>,
) {
    let EngineLink {
        outbound,
        mut inbound,
    } = link;
    let mut link_open = true;

    let poll_interval = engine
        .config()
        .monitor
        .poll_interval()
        .max(Duration::from_millis(1));
    let mut poll_timer = interval_at(
        tokio::time::Instant::now() + poll_interval,
        poll_interval,
    );
    poll_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut status_timer = interval(STATUS_CHECK_INTERVAL);
    status_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!("Engine actor started");

    loop {
        let deadline = engine.deadline();
        let timeout_at = deadline
            .map(tokio::time::Instant::from_std)
            .unwrap_or_else(|| tokio::time::Instant::now() + STATUS_CHECK_INTERVAL);

        tokio::select! {
            cmd = cmd_rx.recv() => {
                let Some(cmd) = cmd else {
                    debug!("All engine handles dropped");
                    break;
                };
                if !handle_command(&mut engine, cmd) {
                    break;
                }
            }

            event = inbound.recv(), if link_open => {
                match event {
                    Some(event) => {
                        handle_transport_event(&mut engine, event);
                        // Move everything that already arrived into the inbox before dispatching
                        while let Ok(event) = inbound.try_recv() {
                            handle_transport_event(&mut engine, event);
                        }
                        engine.process_responses();
                    }
                    None => {
                        debug!("Transport link closed");
                        link_open = false;
                        engine.set_connected(false);
                    }
                }
            }

            _ = sleep_until(timeout_at), if deadline.is_some() => {
                engine.poll_timeout(Instant::now());
            }

            _ = poll_timer.tick() => {
                debug!("Monitor poll");
                engine.poll_all();
            }

            _ = status_timer.tick() => {
                engine.check_status(Instant::now());
            }
        }

        flush(&mut engine, &outbound, &event_tx);
    }

    flush(&mut engine, &outbound, &event_tx);
    info!("Engine actor stopped");
}

/// Spawn the engine actor and return a handle to it
pub fn spawn_engine(engine: ProtocolEngine, link: EngineLink) -> (EngineHandle, JoinHandle<()>) {
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

    let task = tokio::spawn(run_engine_actor(engine, cmd_rx, link, event_tx.clone()));
    (EngineHandle { cmd_tx, event_tx }, task)
}

/// Cloneable access to a running engine actor
///
/// Command-issuing methods never wait: they queue a message for the actor and
/// return. Only the query methods await a reply.
#[derive(Debug, Clone)]
pub struct EngineHandle {
    cmd_tx: mpsc::UnboundedSender<EngineActorCommand>,
    event_tx: broadcast::Sender<EngineEvent>,
}

impl EngineHandle {
    fn send(&self, cmd: EngineActorCommand) -> Result<(), EngineError> {
        self.cmd_tx.send(cmd).map_err(|_| EngineError::EngineStopped)
    }

    async fn request<R>(
        &self,
        make: impl FnOnce(oneshot::Sender<R>) -> EngineActorCommand,
    ) -> Result<R, EngineError> {
        let (tx, rx) = oneshot::channel();
        self.send(make(tx))?;
        rx.await.map_err(|_| EngineError::EngineStopped)
    }

    /// Receive every event published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.event_tx.subscribe()
    }

    /// Run an action on a control point
    pub fn control(&self, id: ControlPointId, action: ControlAction) -> Result<(), EngineError> {
        self.send(EngineActorCommand::Control { id, action })
    }

    /// Queue a command with no owning control point
    pub fn enqueue(&self, text: impl Into<String>) -> Result<(), EngineError> {
        self.send(EngineActorCommand::Enqueue { text: text.into() })
    }

    /// Transmit text immediately, outside the queue
    pub fn raw_send(&self, text: impl Into<String>) -> Result<(), EngineError> {
        self.send(EngineActorCommand::RawSend { text: text.into() })
    }

    /// Run a poll cycle now
    pub fn poll(&self) -> Result<(), EngineError> {
        self.send(EngineActorCommand::PollAll)
    }

    /// Stop the actor
    pub fn shutdown(&self) -> Result<(), EngineError> {
        self.send(EngineActorCommand::Shutdown)
    }

    /// Resolve a control point by full key or level key
    pub async fn control_point(&self, key: &str) -> Result<ControlPointHandle, EngineError> {
        let key = key.to_string();
        let id = self
            .request(|response| EngineActorCommand::FindControlPoint {
                key: key.clone(),
                response,
            })
            .await?
            .ok_or_else(|| EngineError::UnknownControlPoint(key.clone()))?;

        Ok(ControlPointHandle {
            id,
            key,
            engine: self.clone(),
        })
    }

    /// Snapshot of one control point
    pub async fn query(&self, id: ControlPointId) -> Result<Option<ControlPointSnapshot>, EngineError> {
        self.request(|response| EngineActorCommand::QueryControlPoint { id, response })
            .await
    }

    /// Snapshots of every control point, in registration order
    pub async fn control_points(&self) -> Result<Vec<ControlPointSnapshot>, EngineError> {
        self.request(|response| EngineActorCommand::ListControlPoints { response })
            .await
    }

    /// Units seen in version banners
    pub async fn devices(&self) -> Result<Vec<(String, DeviceInfoRecord)>, EngineError> {
        self.request(|response| EngineActorCommand::QueryDevices { response })
            .await
    }

    /// Operator listing of known units
    pub async fn device_report(&self) -> Result<String, EngineError> {
        self.request(|response| EngineActorCommand::DeviceReport { response })
            .await
    }

    /// Engine status
    pub async fn status(&self) -> Result<EngineStatus, EngineError> {
        self.request(|response| EngineActorCommand::QueryStatus { response })
            .await
    }
}

/// Handle bound to one control point
#[derive(Debug, Clone)]
pub struct ControlPointHandle {
    id: ControlPointId,
    key: String,
    engine: EngineHandle,
}

impl ControlPointHandle {
    /// Engine index
    pub fn id(&self) -> ControlPointId {
        self.id
    }

    /// Key the handle was resolved from
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Query mute and gain
    pub fn poll(&self) -> Result<(), EngineError> {
        self.engine.control(self.id, ControlAction::Poll)
    }

    /// Mute
    pub fn mute_on(&self) -> Result<(), EngineError> {
        self.engine.control(self.id, ControlAction::MuteOn)
    }

    /// Unmute
    pub fn mute_off(&self) -> Result<(), EngineError> {
        self.engine.control(self.id, ControlAction::MuteOff)
    }

    /// Toggle mute on the device
    pub fn mute_toggle(&self) -> Result<(), EngineError> {
        self.engine.control(self.id, ControlAction::MuteToggle)
    }

    /// Set an absolute level
    pub fn set_volume(&self, level: u16) -> Result<(), EngineError> {
        self.engine.control(self.id, ControlAction::SetVolume(level))
    }

    /// Step gain up
    pub fn volume_up(&self, pressed: bool) -> Result<(), EngineError> {
        self.engine
            .control(self.id, ControlAction::VolumeUp { pressed })
    }

    /// Step gain down
    pub fn volume_down(&self, pressed: bool) -> Result<(), EngineError> {
        self.engine
            .control(self.id, ControlAction::VolumeDown { pressed })
    }

    /// Current state as last parsed
    pub async fn state(&self) -> Result<ControlPointState, EngineError> {
        self.engine
            .query(self.id)
            .await?
            .map(|s| s.state)
            .ok_or_else(|| EngineError::UnknownControlPoint(self.key.clone()))
    }
}
