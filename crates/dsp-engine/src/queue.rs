//! Outbound command queue
//!
//! Commands wait here until the engine has nothing in flight. Entries are
//! unique by text: asking for a command that is already waiting is a no-op,
//! which keeps repeated polls and held volume buttons from flooding the link.

use std::collections::VecDeque;

use tracing::{debug, warn};

use crate::control::ControlPointId;

/// Default maximum number of waiting commands
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// A command waiting for transmission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedCommand {
    /// Command text, without framing
    pub text: String,
    /// Control point expecting the reply; `None` for device-global commands
    pub owner: Option<ControlPointId>,
}

impl QueuedCommand {
    /// Command issued by a control point
    pub fn owned(text: impl Into<String>, owner: ControlPointId) -> Self {
        Self {
            text: text.into(),
            owner: Some(owner),
        }
    }

    /// Command with no owning control point
    pub fn global(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            owner: None,
        }
    }
}

/// Result of [`CommandQueue::enqueue`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// Appended at the tail
    Queued,
    /// Same text already waiting; nothing changed
    Duplicate,
    /// Queue at capacity; command dropped
    Full,
}

/// FIFO of distinct command texts
#[derive(Debug)]
pub struct CommandQueue {
    entries: VecDeque<QueuedCommand>,
    capacity: usize,
}

impl CommandQueue {
    /// Create a queue with the default capacity
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_QUEUE_CAPACITY)
    }

    /// Create a queue holding at most `capacity` commands
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity,
        }
    }

    /// Append a command unless one with the same text is already waiting
    pub fn enqueue(&mut self, command: QueuedCommand) -> EnqueueOutcome {
        if self.entries.iter().any(|c| c.text == command.text) {
            debug!(
                "Command '{}' is a duplicate, skipping (queue size {})",
                command.text,
                self.entries.len()
            );
            return EnqueueOutcome::Duplicate;
        }

        if self.entries.len() >= self.capacity {
            warn!(
                "Command queue full ({} entries), dropping '{}'",
                self.capacity, command.text
            );
            return EnqueueOutcome::Full;
        }

        self.entries.push_back(command);
        EnqueueOutcome::Queued
    }

    /// Remove and return the head of the queue
    pub fn try_dequeue(&mut self) -> Option<QueuedCommand> {
        self.entries.pop_front()
    }

    /// Whether nothing is waiting
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of waiting commands
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Maximum number of waiting commands
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Iterate over waiting commands, head first
    pub fn iter(&self) -> impl Iterator<Item = &QueuedCommand> {
        self.entries.iter()
    }
}

impl Default for CommandQueue {
    fn default() -> Self {
        Self::new()
    }
}
