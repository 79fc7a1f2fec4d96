//! Communication monitor
//!
//! Two timers watch the link: a poll timer that makes the engine query every
//! control point, and a silence tracker that degrades the status when nothing
//! has been received for a while.

use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Monitor timings, in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorConfig {
    /// Interval between polls
    pub poll_interval: u64,
    /// Silence after which the status becomes a warning
    pub time_to_warning: u64,
    /// Silence after which the status becomes an error
    pub time_to_error: u64,
}

impl MonitorConfig {
    /// Poll interval as a duration
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval)
    }

    /// Warning threshold as a duration
    pub fn time_to_warning(&self) -> Duration {
        Duration::from_millis(self.time_to_warning)
    }

    /// Error threshold as a duration
    pub fn time_to_error(&self) -> Duration {
        Duration::from_millis(self.time_to_error)
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: 30_000,
            time_to_warning: 30_000,
            time_to_error: 60_000,
        }
    }
}

/// Health of the link as seen by the monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MonitorStatus {
    /// Nothing received yet
    Unknown,
    /// Data received recently
    Ok,
    /// Silent for longer than the warning threshold
    InWarning,
    /// Silent for longer than the error threshold
    InError,
}

impl fmt::Display for MonitorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MonitorStatus::Unknown => "unknown",
            MonitorStatus::Ok => "ok",
            MonitorStatus::InWarning => "warning",
            MonitorStatus::InError => "error",
        };
        f.write_str(s)
    }
}

/// Silence tracker
#[derive(Debug)]
pub struct CommunicationMonitor {
    config: MonitorConfig,
    started: Instant,
    last_activity: Option<Instant>,
    status: MonitorStatus,
}

impl CommunicationMonitor {
    /// Start tracking from `now`
    pub fn new(config: MonitorConfig, now: Instant) -> Self {
        Self {
            config,
            started: now,
            last_activity: None,
            status: MonitorStatus::Unknown,
        }
    }

    /// Timings in use
    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Current status
    pub fn status(&self) -> MonitorStatus {
        self.status
    }

    /// Note that something arrived; returns the new status if it changed
    pub fn record_activity(&mut self, now: Instant) -> Option<MonitorStatus> {
        self.last_activity = Some(now);
        self.set_status(MonitorStatus::Ok)
    }

    /// Re-evaluate the silence thresholds; returns the new status if it changed
    pub fn evaluate(&mut self, now: Instant) -> Option<MonitorStatus> {
        let since = self.last_activity.unwrap_or(self.started);
        let silent_for = now.saturating_duration_since(since);

        let status = if silent_for >= self.config.time_to_error() {
            MonitorStatus::InError
        } else if silent_for >= self.config.time_to_warning() {
            MonitorStatus::InWarning
        } else if self.last_activity.is_some() {
            MonitorStatus::Ok
        } else {
            MonitorStatus::Unknown
        };

        self.set_status(status)
    }

    fn set_status(&mut self, status: MonitorStatus) -> Option<MonitorStatus> {
        if self.status == status {
            return None;
        }
        self.status = status;
        Some(status)
    }
}
