//! The task that owns the [`Relay`] and serializes all access to it.

use std::future;

use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::protocol::ConnectionId;
use crate::relay::{DisconnectReason, Relay, RelayStats};
use crate::websocket::connection::SocketLink;

/// Capacity of the socket-to-relay event queue.
pub const EVENT_QUEUE_CAPACITY: usize = 1024;

/// Something a socket task (or the HTTP layer) asks the relay to do.
#[derive(Debug)]
pub enum RelayEvent {
    /// A socket finished its upgrade.
    Connect {
        /// Writer queue and kill switch for the new socket.
        link: SocketLink,
        /// Receives the assigned id.
        reply: oneshot::Sender<ConnectionId>,
    },
    /// A text frame arrived.
    Frame {
        /// Sender.
        id: ConnectionId,
        /// Raw frame payload.
        text: String,
    },
    /// A liveness probe was acknowledged.
    Pong {
        /// Sender.
        id: ConnectionId,
    },
    /// The socket closed or errored.
    Disconnect {
        /// Departing connection.
        id: ConnectionId,
        /// What ended it.
        reason: DisconnectReason,
    },
    /// Counters requested by `/health`.
    Stats {
        /// Receives the snapshot.
        reply: oneshot::Sender<RelayStats>,
    },
}

/// Cloneable sender side of the relay's event queue.
#[derive(Clone, Debug)]
pub struct RelayHandle {
    tx: mpsc::Sender<RelayEvent>,
}

/// Create a handle and the receiver [`run`] consumes.
pub fn channel(capacity: usize) -> (RelayHandle, mpsc::Receiver<RelayEvent>) {
    let (tx, rx) = mpsc::channel(capacity);
    (RelayHandle { tx }, rx)
}

impl RelayHandle {
    /// Register a socket. `None` once the relay has stopped.
    pub async fn connect(&self, link: SocketLink) -> Option<ConnectionId> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(RelayEvent::Connect { link, reply }).await.ok()?;
        rx.await.ok()
    }

    /// Forward a text frame. Returns `false` once the relay has stopped.
    pub async fn frame(&self, id: ConnectionId, text: String) -> bool {
        self.tx.send(RelayEvent::Frame { id, text }).await.is_ok()
    }

    /// Forward a probe acknowledgement.
    pub async fn pong(&self, id: ConnectionId) {
        let _ = self.tx.send(RelayEvent::Pong { id }).await;
    }

    /// Report that a socket has gone away.
    pub async fn disconnect(&self, id: ConnectionId, reason: DisconnectReason) {
        let _ = self.tx.send(RelayEvent::Disconnect { id, reason }).await;
    }

    /// Current counters, or `None` once the relay has stopped.
    pub async fn stats(&self) -> Option<RelayStats> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(RelayEvent::Stats { reply }).await.ok()?;
        rx.await.ok()
    }
}

impl Relay {
    /// Apply one event.
    pub fn handle_event(&mut self, event: RelayEvent) {
        match event {
            RelayEvent::Connect { link, reply } => {
                let id = self.connect(link);
                if let Err(id) = reply.send(id) {
                    debug!(conn_id = %id, "socket gone before registration completed");
                    self.disconnect(&id, DisconnectReason::Closed);
                }
            }
            RelayEvent::Frame { id, text } => self.handle_frame(&id, &text),
            RelayEvent::Pong { id } => self.handle_pong(&id),
            RelayEvent::Disconnect { id, reason } => self.disconnect(&id, reason),
            RelayEvent::Stats { reply } => {
                let _ = reply.send(self.stats());
            }
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => future::pending().await,
    }
}

/// Drive `relay` until `cancel` fires or every handle is dropped.
///
/// Batch flushes and liveness sweeps run on the same task as event handling,
/// so none of them can interleave with a half-applied event. On exit every
/// remaining connection is closed and the number closed is returned.
pub async fn run(
    mut relay: Relay,
    mut events: mpsc::Receiver<RelayEvent>,
    cancel: CancellationToken,
) -> usize {
    let interval = relay.liveness_interval();
    let mut sweep = time::interval_at(Instant::now() + interval, interval);
    sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(
        batch_interval_us = relay.batch().interval().as_micros(),
        heartbeat_interval_ms = interval.as_millis(),
        "relay started"
    );

    loop {
        let flush_at = relay.batch_deadline();
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = sleep_until(flush_at) => relay.flush_batches(),
            _ = sweep.tick() => relay.liveness_sweep(),
            event = events.recv() => match event {
                Some(event) => relay.handle_event(event),
                None => break,
            },
        }
    }

    relay.shutdown()
}
