//! Protocol engine
//!
//! The synchronous core: command queue, the single in-flight slot and its
//! deadline, the response inbox, the control points and the device registry.
//! It performs no I/O. Text to transmit accumulates in an outbox and
//! notifications in an event buffer; the actor drains both after every step.
//!
//! # Dispatch
//!
//! Only lines starting with `OK> #` or `> #` are considered. With no command
//! in flight a line is offered to every control point in registration order,
//! then to the version banner parser, until one claims it. With a command in
//! flight the owner gets the first look, the others are the fallback, and the
//! slot is cleared whatever the outcome.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use dsp_protocol::{frame_command, is_structured_reply, parse_version_banner, VERSION_QUERY};
use tracing::{debug, info, trace, warn};

use crate::control::{ControlAction, ControlPoint, ControlPointConfig, ControlPointId, ParseOutcome};
use crate::devices::DeviceRegistry;
use crate::error::EngineError;
use crate::events::EngineEvent;
use crate::monitor::{CommunicationMonitor, MonitorConfig, MonitorStatus};
use crate::queue::{CommandQueue, EnqueueOutcome, QueuedCommand, DEFAULT_QUEUE_CAPACITY};

/// Time a command may stay in flight without a reply
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_millis(2000);

/// Key used for control points when none is configured
pub const DEFAULT_DEVICE_KEY: &str = "dsp1";

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Key of this DSP instance, prefix of every control point key
    pub key: String,
    /// In-flight timeout
    pub command_timeout: Duration,
    /// Maximum number of waiting commands
    pub queue_capacity: usize,
    /// Poll and silence timings
    pub monitor: MonitorConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            key: DEFAULT_DEVICE_KEY.to_string(),
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            monitor: MonitorConfig::default(),
        }
    }
}

#[derive(Debug)]
struct InFlight {
    command: QueuedCommand,
    deadline: Instant,
}

/// The protocol state machine
pub struct ProtocolEngine {
    config: EngineConfig,
    queue: CommandQueue,
    in_flight: Option<InFlight>,
    inbox: VecDeque<String>,
    control_points: Vec<ControlPoint>,
    keys: HashMap<String, ControlPointId>,
    devices: DeviceRegistry,
    monitor: CommunicationMonitor,
    connected: bool,
    outbox: Vec<String>,
    event_buffer: Vec<EngineEvent>,
}

impl ProtocolEngine {
    /// Create an engine with default configuration
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    /// Create with custom configuration
    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            queue: CommandQueue::with_capacity(config.queue_capacity),
            monitor: CommunicationMonitor::new(config.monitor, Instant::now()),
            config,
            in_flight: None,
            inbox: VecDeque::new(),
            control_points: Vec::new(),
            keys: HashMap::new(),
            devices: DeviceRegistry::new(),
            connected: false,
            outbox: Vec::new(),
            event_buffer: Vec::new(),
        }
    }

    /// Get the current configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // -------------------------------------------------------------------------
    // Control points
    // -------------------------------------------------------------------------

    /// Register a control point under `level_key`
    pub fn add_control_point(
        &mut self,
        level_key: &str,
        config: ControlPointConfig,
    ) -> Result<ControlPointId, EngineError> {
        let id = ControlPointId(self.control_points.len());
        let cp = ControlPoint::new(id, &self.config.key, level_key, config);

        if self.keys.contains_key(cp.key()) {
            return Err(EngineError::DuplicateControlPoint(cp.key().to_string()));
        }

        info!("Added control point {} ({})", cp.key(), cp.label());
        self.keys.insert(cp.key().to_string(), id);
        self.control_points.push(cp);
        Ok(id)
    }

    /// Get a control point
    pub fn control_point(&self, id: ControlPointId) -> Option<&ControlPoint> {
        self.control_points.get(id.0)
    }

    /// Look up a control point by its full key or by its level key alone
    pub fn find_control_point(&self, key: &str) -> Option<ControlPointId> {
        self.keys
            .get(key)
            .or_else(|| self.keys.get(&format!("{}--{}", self.config.key, key)))
            .copied()
    }

    /// Iterate over control points in registration order
    pub fn control_points(&self) -> impl Iterator<Item = &ControlPoint> {
        self.control_points.iter()
    }

    /// Queue the commands for an action on a control point
    pub fn control(&mut self, id: ControlPointId, action: ControlAction) -> Result<(), EngineError> {
        let cp = self
            .control_points
            .get(id.0)
            .ok_or_else(|| EngineError::UnknownControlPoint(format!("#{}", id.0)))?;

        for text in cp.commands(action) {
            self.enqueue(QueuedCommand::owned(text, id));
        }
        Ok(())
    }

    /// Poll cycle: ask for versions until a unit is known, then query every control point
    pub fn poll_all(&mut self) {
        if self.devices.is_empty() {
            self.enqueue(QueuedCommand::global(VERSION_QUERY));
        }

        let commands: Vec<QueuedCommand> = self
            .control_points
            .iter()
            .flat_map(|cp| {
                cp.poll()
                    .into_iter()
                    .map(move |text| QueuedCommand::owned(text, cp.id()))
            })
            .collect();

        for command in commands {
            self.enqueue(command);
        }
    }

    // -------------------------------------------------------------------------
    // Transmit side
    // -------------------------------------------------------------------------

    /// Queue a command, sending it right away if the link is idle
    pub fn enqueue(&mut self, command: QueuedCommand) -> EnqueueOutcome {
        let outcome = self.queue.enqueue(command);

        if self.in_flight.is_none() && self.inbox.is_empty() {
            self.send_next();
        }

        outcome
    }

    /// Send the head of the queue if connected and nothing is in flight
    pub fn send_next(&mut self) {
        if !self.connected || self.in_flight.is_some() {
            return;
        }

        let Some(command) = self.queue.try_dequeue() else {
            return;
        };

        debug!(
            "Command '{}' dequeued, queue size {}",
            command.text,
            self.queue.len()
        );

        self.transmit(&command.text);
        self.in_flight = Some(InFlight {
            command,
            deadline: Instant::now() + self.config.command_timeout,
        });
    }

    /// Transmit text immediately, outside the queue
    ///
    /// Returns false when the transport is down.
    pub fn raw_send(&mut self, text: &str) -> bool {
        if !self.connected {
            warn!("Not connected, dropping raw command '{}'", text);
            return false;
        }
        self.transmit(text);
        true
    }

    fn transmit(&mut self, text: &str) {
        debug!("TX: '{}'", text);
        self.outbox.push(frame_command(text));
        self.event_buffer.push(EngineEvent::CommandSent {
            text: text.to_string(),
        });
    }

    /// Deadline of the in-flight command
    pub fn deadline(&self) -> Option<Instant> {
        self.in_flight.as_ref().map(|f| f.deadline)
    }

    /// Clear the in-flight slot if its deadline has passed, then send the next command
    ///
    /// Returns true if a command timed out. The timed-out command is not retried.
    pub fn poll_timeout(&mut self, now: Instant) -> bool {
        match &self.in_flight {
            Some(f) if f.deadline <= now => {}
            _ => return false,
        }

        if let Some(expired) = self.in_flight.take() {
            debug!("Command '{}' timed out", expired.command.text);
            self.event_buffer.push(EngineEvent::CommandTimedOut {
                text: expired.command.text,
            });
        }

        if self.inbox.is_empty() {
            self.send_next();
        }
        true
    }

    // -------------------------------------------------------------------------
    // Receive side
    // -------------------------------------------------------------------------

    /// Transport came up or went down
    ///
    /// Going down abandons the in-flight command but keeps the queue, which
    /// drains once the link is back.
    pub fn set_connected(&mut self, connected: bool) {
        if self.connected == connected {
            return;
        }
        self.connected = connected;

        if connected {
            info!("Transport connected, {} command(s) queued", self.queue.len());
            self.event_buffer.push(EngineEvent::Connected);
            if self.inbox.is_empty() {
                self.send_next();
            }
        } else {
            info!("Transport disconnected");
            if let Some(abandoned) = self.in_flight.take() {
                debug!("Abandoning in-flight command '{}'", abandoned.command.text);
            }
            self.event_buffer.push(EngineEvent::Disconnected);
        }
    }

    /// Hand a response line to the inbox
    pub fn queue_response(&mut self, line: String) {
        self.record_activity();
        trace!("Response '{}' queued, inbox size {}", line, self.inbox.len() + 1);
        self.event_buffer.push(EngineEvent::LineReceived { line: line.clone() });
        self.inbox.push_back(line);
    }

    /// Note a device error line
    pub fn device_error(&mut self, line: String) {
        self.record_activity();
        warn!("Error from DSP: '{}'", line);
        self.event_buffer.push(EngineEvent::DeviceError { line });
    }

    /// Note a failure of the transport around the engine
    pub fn transport_error(&mut self, source: String, message: String) {
        warn!("Transport error on {}: {}", source, message);
        self.event_buffer.push(EngineEvent::Error { source, message });
    }

    /// Note that the link delivered something, even if it was only a prompt
    pub fn record_activity(&mut self) {
        if let Some(status) = self.monitor.record_activity(Instant::now()) {
            self.status_changed(status);
        }
    }

    /// Re-evaluate the communication monitor
    pub fn check_status(&mut self, now: Instant) {
        if let Some(status) = self.monitor.evaluate(now) {
            self.status_changed(status);
        }
    }

    fn status_changed(&mut self, status: MonitorStatus) {
        debug!("Communication monitor status: {}", status);
        self.event_buffer.push(EngineEvent::StatusChanged { status });
    }

    /// Current communication monitor status
    pub fn status(&self) -> MonitorStatus {
        self.monitor.status()
    }

    /// Dispatch every line in the inbox, in arrival order
    pub fn process_responses(&mut self) {
        while let Some(line) = self.inbox.pop_front() {
            trace!("Response '{}' dequeued, inbox size {}", line, self.inbox.len());
            self.dispatch(&line);

            if !self.queue.is_empty() && self.inbox.is_empty() {
                self.send_next();
            }
        }
    }

    fn dispatch(&mut self, line: &str) {
        if !is_structured_reply(line) {
            trace!("Ignoring unstructured line '{}'", line);
            return;
        }

        match self.in_flight.take() {
            None => {
                self.parse_all(line);
            }
            Some(in_flight) => {
                let claimed = in_flight
                    .command
                    .owner
                    .is_some_and(|owner| self.parse_with(owner, line));
                if !claimed {
                    self.parse_all(line);
                }
            }
        }
    }

    /// Offer a line to every control point, then to the banner parser
    fn parse_all(&mut self, line: &str) -> bool {
        for idx in 0..self.control_points.len() {
            if self.parse_with(ControlPointId(idx), line) {
                return true;
            }
        }

        if self.parse_version(line) {
            return true;
        }

        debug!("No parser claimed '{}'", line);
        false
    }

    fn parse_with(&mut self, id: ControlPointId, line: &str) -> bool {
        let Some(cp) = self.control_points.get_mut(id.0) else {
            return false;
        };

        let outcome = cp.parse(line);
        match outcome {
            ParseOutcome::MuteChanged(muted) => {
                self.event_buffer.push(EngineEvent::MuteChanged {
                    id,
                    key: cp.key().to_string(),
                    muted,
                });
            }
            ParseOutcome::LevelChanged(level) => {
                self.event_buffer.push(EngineEvent::LevelChanged {
                    id,
                    key: cp.key().to_string(),
                    level,
                });
            }
            ParseOutcome::Claimed | ParseOutcome::Rejected => {}
        }
        outcome.is_claimed()
    }

    fn parse_version(&mut self, line: &str) -> bool {
        match parse_version_banner(line) {
            None => false,
            Some(Ok(banner)) => {
                let key = banner.key.clone();
                let record = self.devices.record(banner);
                self.event_buffer.push(EngineEvent::DeviceInfo { key, record });
                true
            }
            Some(Err(e)) => {
                warn!("Error parsing version line '{}': {}", line, e);
                true
            }
        }
    }

    // -------------------------------------------------------------------------
    // Observers
    // -------------------------------------------------------------------------

    /// Whether the transport is up
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Command currently awaiting a reply
    pub fn in_flight(&self) -> Option<&QueuedCommand> {
        self.in_flight.as_ref().map(|f| &f.command)
    }

    /// Waiting commands
    pub fn queue(&self) -> &CommandQueue {
        &self.queue
    }

    /// Lines waiting for dispatch
    pub fn inbox_len(&self) -> usize {
        self.inbox.len()
    }

    /// Units seen in version banners
    pub fn devices(&self) -> &DeviceRegistry {
        &self.devices
    }

    /// Take framed text waiting for the transport
    pub fn drain_outbox(&mut self) -> Vec<String> {
        std::mem::take(&mut self.outbox)
    }

    /// Take and clear pending events
    pub fn drain_events(&mut self) -> Vec<EngineEvent> {
        std::mem::take(&mut self.event_buffer)
    }
}

impl Default for ProtocolEngine {
    fn default() -> Self {
        Self::new()
    }
}
