//! The relay: every piece of shared state, owned by one task.
//!
//! [`Relay`] is deliberately not `Sync`-shared. The event loop in
//! [`crate::event_loop`] owns it and feeds it one event at a time, so each
//! handler runs to completion without locks.

use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};

use crate::batch::BatchScheduler;
use crate::chat::ChatHistory;
use crate::config::ServerConfig;
use crate::filter::ChangeFilter;
use crate::metrics;
use crate::protocol::{ConnectionId, server_time_ms};
use crate::websocket::connection::SocketLink;
use crate::websocket::heartbeat::LivenessMonitor;
use crate::websocket::registry::ConnectionRegistry;

/// Why a connection is being torn down.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The client closed the socket.
    Closed,
    /// The socket errored.
    Error,
    /// The client missed a liveness probe.
    TimedOut,
    /// The client's outbound queue rejected a frame.
    SendFailed,
    /// The server is stopping.
    Shutdown,
}

impl DisconnectReason {
    /// Label used in logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Error => "error",
            Self::TimedOut => "timed_out",
            Self::SendFailed => "send_failed",
            Self::Shutdown => "shutdown",
        }
    }
}

/// Point-in-time counters for `/health`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RelayStats {
    /// Registered connections.
    pub connections: usize,
    /// Chat entries held for joiners.
    pub chat_entries: usize,
    /// Recipients with batched messages waiting.
    pub pending_recipients: usize,
    /// Whether a batch flush is armed.
    pub flush_scheduled: bool,
}

/// Connection registry, chat history, batch scheduler and liveness monitor.
pub struct Relay {
    pub(crate) registry: ConnectionRegistry,
    pub(crate) chat: ChatHistory,
    pub(crate) batch: BatchScheduler,
    pub(crate) filter: ChangeFilter,
    pub(crate) liveness: LivenessMonitor,
    pub(crate) allowed_emotes: HashSet<String>,
}

impl Relay {
    /// Build an empty relay from configuration.
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            registry: ConnectionRegistry::new(),
            chat: ChatHistory::new(config.chat_history_limit),
            batch: BatchScheduler::new(config.batch_interval()),
            filter: ChangeFilter::new(config.position_epsilon, config.rotation_epsilon),
            liveness: LivenessMonitor::new(config.heartbeat_interval()),
            allowed_emotes: config.allowed_emotes.iter().cloned().collect(),
        }
    }

    /// Register a socket reachable through `link`.
    pub fn connect(&mut self, link: SocketLink) -> ConnectionId {
        let history = self.chat.snapshot();
        let (id, failed) = self
            .registry
            .join(link, &history, server_time_ms(), Instant::now());

        ::metrics::counter!(metrics::RELAY_CONNECTIONS_TOTAL).increment(1);
        self.record_active();
        info!(
            conn_id = %id,
            players = self.registry.len(),
            "player connected"
        );

        self.disconnect_failed(failed);
        id
    }

    /// Tear down a connection and notify the others.
    ///
    /// Unknown ids are ignored, so close and error firing for the same socket
    /// only clean up once. Recipients that fail to receive the resulting
    /// `player_left` are disconnected in turn, after the broadcast finishes.
    pub fn disconnect(&mut self, id: &ConnectionId, reason: DisconnectReason) {
        let mut pending = VecDeque::from([(id.clone(), reason)]);
        while let Some((id, reason)) = pending.pop_front() {
            let Some((conn, failed)) = self.registry.leave(&id) else {
                continue;
            };
            self.batch.discard(&id);
            conn.terminate();

            ::metrics::counter!(metrics::RELAY_DISCONNECTIONS_TOTAL, "reason" => reason.as_str())
                .increment(1);
            info!(
                conn_id = %id,
                reason = reason.as_str(),
                connected_secs = conn.connected_at.elapsed().as_secs(),
                players = self.registry.len(),
                "player disconnected"
            );

            pending.extend(
                failed
                    .into_iter()
                    .map(|f| (f, DisconnectReason::SendFailed)),
            );
        }
        self.record_active();
    }

    /// Disconnect recipients a send helper reported as failed.
    pub(crate) fn disconnect_failed(&mut self, failed: Vec<ConnectionId>) {
        if failed.is_empty() {
            return;
        }
        ::metrics::counter!(metrics::RELAY_SEND_FAILURES_TOTAL).increment(failed.len() as u64);
        for id in failed {
            self.disconnect(&id, DisconnectReason::SendFailed);
        }
    }

    /// A liveness probe was acknowledged.
    pub fn handle_pong(&mut self, id: &ConnectionId) {
        if let Some(conn) = self.registry.get_mut(id) {
            conn.mark_alive(Instant::now());
        }
    }

    /// Send everything the batch scheduler has queued.
    pub fn flush_batches(&mut self) {
        let outgoing = self.batch.flush();
        if outgoing.is_empty() {
            return;
        }
        let mut failed = Vec::new();
        let mut envelopes = 0u64;
        for (recipient, message) in &outgoing {
            if message.kind() == "batch_update" {
                envelopes += 1;
            }
            if !self.registry.send_message(recipient, message) && self.registry.contains(recipient)
            {
                failed.push(recipient.clone());
            }
        }
        ::metrics::counter!(metrics::RELAY_BATCHES_FLUSHED_TOTAL).increment(1);
        ::metrics::counter!(metrics::RELAY_BATCH_ENVELOPES_TOTAL).increment(envelopes);
        debug!(recipients = outgoing.len(), envelopes, "flushed batch");
        self.disconnect_failed(failed);
    }

    /// When the next batch flush is due, if one is armed.
    pub fn batch_deadline(&self) -> Option<Instant> {
        self.batch.deadline()
    }

    /// Probe every connection and evict the unresponsive ones.
    pub fn liveness_sweep(&mut self) {
        let outcome = self.liveness.sweep(&mut self.registry);
        if outcome.is_empty() {
            return;
        }
        debug!(
            timed_out = outcome.timed_out.len(),
            unreachable = outcome.unreachable.len(),
            "liveness sweep found dead connections"
        );
        for id in outcome.timed_out {
            self.disconnect(&id, DisconnectReason::TimedOut);
        }
        self.disconnect_failed(outcome.unreachable);
    }

    /// Cadence of [`liveness_sweep`](Self::liveness_sweep).
    pub fn liveness_interval(&self) -> Duration {
        self.liveness.interval()
    }

    /// Close every connection without per-player notifications.
    ///
    /// Returns how many sockets were closed.
    pub fn shutdown(&mut self) -> usize {
        let connections = self.registry.drain();
        let count = connections.len();
        for conn in connections {
            conn.terminate();
            ::metrics::counter!(
                metrics::RELAY_DISCONNECTIONS_TOTAL,
                "reason" => DisconnectReason::Shutdown.as_str()
            )
            .increment(1);
        }
        self.batch.clear();
        self.record_active();
        info!(closed = count, "relay shut down");
        count
    }

    /// Current counters.
    pub fn stats(&self) -> RelayStats {
        RelayStats {
            connections: self.registry.len(),
            chat_entries: self.chat.len(),
            pending_recipients: self.batch.pending_recipients(),
            flush_scheduled: self.batch.is_scheduled(),
        }
    }

    /// Batch scheduler.
    pub fn batch(&self) -> &BatchScheduler {
        &self.batch
    }

    #[allow(clippy::cast_precision_loss)]
    fn record_active(&self) {
        ::metrics::gauge!(metrics::RELAY_CONNECTIONS_ACTIVE).set(self.registry.len() as f64);
    }
}
