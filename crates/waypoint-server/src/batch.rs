//! Time-windowed coalescing of non-priority outbound messages.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

use crate::protocol::{ConnectionId, ServerMessage};

/// Per-recipient queues flushed together on a single global deadline.
///
/// At most one flush is scheduled at a time: the first enqueue after a flush
/// arms [`deadline`](Self::deadline), and [`flush`](Self::flush) disarms it.
pub struct BatchScheduler {
    interval: Duration,
    queues: HashMap<ConnectionId, Vec<ServerMessage>>,
    deadline: Option<Instant>,
}

impl BatchScheduler {
    /// Create a scheduler that flushes `interval` after the first enqueue.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            queues: HashMap::new(),
            deadline: None,
        }
    }

    /// Queue `message` for `recipient`, arming the flush if it is idle.
    pub fn enqueue(&mut self, recipient: ConnectionId, message: ServerMessage, now: Instant) {
        self.queues.entry(recipient).or_default().push(message);
        if self.deadline.is_none() {
            self.deadline = Some(now + self.interval);
        }
    }

    /// Drain every queue into one outbound message per recipient.
    ///
    /// A single queued message is returned as-is; two or more are wrapped in
    /// a `batch_update` envelope in enqueue order.
    pub fn flush(&mut self) -> Vec<(ConnectionId, ServerMessage)> {
        self.deadline = None;
        self.queues
            .drain()
            .filter_map(|(recipient, mut queue)| {
                let message = match queue.len() {
                    0 => return None,
                    1 => queue.pop()?,
                    _ => ServerMessage::BatchUpdate { updates: queue },
                };
                Some((recipient, message))
            })
            .collect()
    }

    /// Drop anything pending for a recipient that has gone away.
    pub fn discard(&mut self, recipient: &ConnectionId) {
        let _ = self.queues.remove(recipient);
    }

    /// Drop everything and disarm the flush.
    pub fn clear(&mut self) {
        self.queues.clear();
        self.deadline = None;
    }

    /// When the scheduled flush is due, if one is armed.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Whether a flush is armed.
    pub fn is_scheduled(&self) -> bool {
        self.deadline.is_some()
    }

    /// Number of recipients with queued messages.
    pub fn pending_recipients(&self) -> usize {
        self.queues.values().filter(|q| !q.is_empty()).count()
    }

    /// Configured flush delay.
    pub fn interval(&self) -> Duration {
        self.interval
    }
}

#[cfg(test)]
impl BatchScheduler {
    pub(crate) fn pending_for(&self, recipient: &ConnectionId) -> usize {
        self.queues.get(recipient).map_or(0, Vec::len)
    }
}
