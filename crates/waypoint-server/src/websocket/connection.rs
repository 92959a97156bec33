//! Per-connection relay state.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::protocol::{ConnectionId, PlayerState};

/// What the relay asks a socket writer task to do.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outbound {
    /// Send a text frame.
    Text(Arc<str>),
    /// Send a transport-level ping (liveness probe).
    Ping,
    /// Send a close frame and stop writing.
    Close,
}

/// The relay's side of one socket.
///
/// `outbound` is bounded and shared with every text frame, so it can be full
/// exactly when the relay wants the socket gone. `kill` is watched by the
/// socket task directly and always gets through.
#[derive(Clone, Debug)]
pub struct SocketLink {
    outbound: mpsc::Sender<Outbound>,
    kill: CancellationToken,
}

impl SocketLink {
    /// Pair a writer queue with the token its socket task watches.
    pub fn new(outbound: mpsc::Sender<Outbound>, kill: CancellationToken) -> Self {
        Self { outbound, kill }
    }
}

/// A registered player connection.
pub struct Connection {
    /// Relay-assigned id.
    pub id: ConnectionId,
    link: SocketLink,
    state: PlayerState,
    /// When the connection was registered.
    pub connected_at: Instant,
    /// Last time a state change was accepted and broadcast.
    pub last_update: Instant,
    /// Last time any inbound traffic arrived.
    pub last_heartbeat: Instant,
    alive: bool,
}

impl Connection {
    /// Create a connection holding `state` and writing through `link`.
    pub fn new(id: ConnectionId, link: SocketLink, state: PlayerState, now: Instant) -> Self {
        Self {
            id,
            link,
            state,
            connected_at: now,
            last_update: now,
            last_heartbeat: now,
            alive: true,
        }
    }

    /// Queue a text frame for the writer.
    ///
    /// Returns `false` if the writer's queue is full or closed.
    pub fn send(&self, frame: Arc<str>) -> bool {
        self.link.outbound.try_send(Outbound::Text(frame)).is_ok()
    }

    /// Queue a liveness probe. Returns `false` if the writer is gone.
    pub fn ping(&self) -> bool {
        self.link.outbound.try_send(Outbound::Ping).is_ok()
    }

    /// Force the socket closed.
    ///
    /// A close frame is queued if there is room, then the socket task is
    /// cancelled whether or not its writer ever gets to that frame.
    pub fn terminate(&self) {
        let _ = self.link.outbound.try_send(Outbound::Close);
        self.link.kill.cancel();
    }

    /// Latest accepted state.
    pub fn state(&self) -> &PlayerState {
        &self.state
    }

    /// Replace the stored state wholesale.
    pub fn set_state(&mut self, state: PlayerState) {
        self.state = state;
    }

    /// Record inbound traffic.
    pub fn touch(&mut self, now: Instant) {
        self.last_heartbeat = now;
    }

    /// Probe acknowledged.
    pub fn mark_alive(&mut self, now: Instant) {
        self.alive = true;
        self.last_heartbeat = now;
    }

    /// Read and clear the alive flag.
    ///
    /// Returns `true` if a probe was acknowledged since the last call.
    pub fn check_alive(&mut self) -> bool {
        std::mem::replace(&mut self.alive, false)
    }
}
