//! Connection registry: owns every live connection and its last-known state.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::time::Instant;
use tracing::{debug, warn};

use super::connection::{Connection, SocketLink};
use crate::protocol::{ChatEntry, ConnectionId, PlayerSnapshot, PlayerState, ServerMessage};

/// Active connections indexed by id.
///
/// Send helpers never remove entries themselves. They report recipients
/// whose queue rejected a frame so the caller can disconnect them once the
/// iteration is over.
pub struct ConnectionRegistry {
    connections: HashMap<ConnectionId, Connection>,
    next_id: u64,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            connections: HashMap::new(),
            next_id: 0,
        }
    }

    fn allocate_id(&mut self) -> ConnectionId {
        self.next_id += 1;
        ConnectionId(format!("p{}", self.next_id))
    }

    /// Register a new socket and bring it up to date.
    ///
    /// The new connection receives, in order: `assign_id`, then
    /// `existing_players` (if anyone else is here), then `chat_history` (if
    /// there is any). Everyone else then gets `player_joined`.
    ///
    /// Returns the new id and any recipients whose send failed.
    pub fn join(
        &mut self,
        link: SocketLink,
        history: &[ChatEntry],
        server_time: i64,
        now: Instant,
    ) -> (ConnectionId, Vec<ConnectionId>) {
        let id = self.allocate_id();
        let state = PlayerState::spawn(server_time);
        let others = self.snapshots_except(&id);
        let _ = self.connections.insert(
            id.clone(),
            Connection::new(id.clone(), link, state.clone(), now),
        );

        let mut welcome = vec![ServerMessage::AssignId {
            id: id.clone(),
            initial_state: state.clone(),
            server_time,
        }];
        if !others.is_empty() {
            welcome.push(ServerMessage::ExistingPlayers {
                players_data: others,
            });
        }
        if !history.is_empty() {
            welcome.push(ServerMessage::ChatHistory {
                history: history.to_vec(),
            });
        }

        let mut failed = Vec::new();
        for message in &welcome {
            if !self.send_message(&id, message) {
                failed.push(id.clone());
                break;
            }
        }

        let joined = ServerMessage::PlayerJoined {
            player_data: PlayerSnapshot {
                id: id.clone(),
                state,
            },
        };
        failed.extend(self.broadcast(&joined, Some(&id)));
        (id, failed)
    }

    /// Remove a connection and tell everyone else it left.
    ///
    /// Returns `None` if the id is not registered, which makes repeated
    /// disconnect triggers for one socket harmless.
    pub fn leave(&mut self, id: &ConnectionId) -> Option<(Connection, Vec<ConnectionId>)> {
        let connection = self.connections.remove(id)?;
        let failed = self.broadcast(&ServerMessage::PlayerLeft { id: id.clone() }, None);
        Some((connection, failed))
    }

    /// Look up a connection mutably.
    pub fn get_mut(&mut self, id: &ConnectionId) -> Option<&mut Connection> {
        self.connections.get_mut(id)
    }

    /// Whether `id` is registered.
    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.connections.contains_key(id)
    }

    /// Number of registered connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether nobody is connected.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Snapshot of every registered id.
    pub fn ids(&self) -> Vec<ConnectionId> {
        self.connections.keys().cloned().collect()
    }

    /// Ids of every connection except `exclude`.
    pub fn ids_except(&self, exclude: &ConnectionId) -> Vec<ConnectionId> {
        self.connections
            .keys()
            .filter(|id| *id != exclude)
            .cloned()
            .collect()
    }

    /// `{id, state}` for every connection except `exclude`.
    pub fn snapshots_except(&self, exclude: &ConnectionId) -> Vec<PlayerSnapshot> {
        self.connections
            .values()
            .filter(|c| &c.id != exclude)
            .map(|c| PlayerSnapshot {
                id: c.id.clone(),
                state: c.state().clone(),
            })
            .collect()
    }

    /// Serialize and send one message to one connection.
    ///
    /// Returns `false` if the id is unknown, serialization failed, or the
    /// writer rejected the frame.
    pub fn send_message(&self, id: &ConnectionId, message: &ServerMessage) -> bool {
        let Some(conn) = self.connections.get(id) else {
            return false;
        };
        match message.encode() {
            Ok(frame) => conn.send(frame),
            Err(e) => {
                warn!(msg_type = message.kind(), error = %e, "failed to serialize message");
                false
            }
        }
    }

    /// Send one message to every connection except `exclude`.
    ///
    /// Serializes once. Returns the recipients whose writer rejected it.
    pub fn broadcast(
        &self,
        message: &ServerMessage,
        exclude: Option<&ConnectionId>,
    ) -> Vec<ConnectionId> {
        let frame: Arc<str> = match message.encode() {
            Ok(f) => f,
            Err(e) => {
                warn!(msg_type = message.kind(), error = %e, "failed to serialize message");
                return Vec::new();
            }
        };
        let mut failed = Vec::new();
        let mut recipients = 0usize;
        for conn in self.connections.values() {
            if exclude == Some(&conn.id) {
                continue;
            }
            recipients += 1;
            if !conn.send(Arc::clone(&frame)) {
                warn!(conn_id = %conn.id, msg_type = message.kind(), "failed to send to client");
                failed.push(conn.id.clone());
            }
        }
        debug!(msg_type = message.kind(), recipients, "broadcast");
        failed
    }

    /// Drain every connection, for shutdown.
    pub fn drain(&mut self) -> Vec<Connection> {
        self.connections.drain().map(|(_, c)| c).collect()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
