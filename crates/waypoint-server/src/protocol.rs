//! Wire-format types for the relay WebSocket protocol.
//!
//! Every frame is a JSON object tagged by `type`. Inbound frames parse into
//! [`ClientMessage`]; everything the server sends is a [`ServerMessage`].

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::ProtocolError;

/// Opaque identifier the relay assigns to each connection.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(pub String);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// A point or direction in world space.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    /// X axis.
    pub x: f64,
    /// Y axis.
    pub y: f64,
    /// Z axis.
    pub z: f64,
}

impl Vec3 {
    /// Build a vector from its components.
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// Authoritative state of one player, as stored and rebroadcast.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerState {
    /// World position.
    pub position: Vec3,
    /// Heading around the vertical axis, in radians.
    pub rotation_y: f64,
    /// Whether the player is walking or running.
    pub is_moving: bool,
    /// Whether the player is standing on something.
    pub is_grounded: bool,
    /// Horizontal velocity.
    pub velocity: Vec3,
    /// Vertical velocity (jumping / falling).
    pub velocity_y: f64,
    /// Timestamp the client attached to the update that produced this state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_timestamp: Option<f64>,
    /// Server time (ms since epoch) when this state was accepted.
    pub server_timestamp: i64,
}

impl PlayerState {
    /// State given to a freshly connected player: at the origin, facing
    /// forward, standing on the ground.
    pub fn spawn(server_timestamp: i64) -> Self {
        Self {
            position: Vec3::default(),
            rotation_y: 0.0,
            is_moving: false,
            is_grounded: true,
            velocity: Vec3::default(),
            velocity_y: 0.0,
            client_timestamp: None,
            server_timestamp,
        }
    }
}

/// State as reported by a client in `player_update`.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct ReportedState {
    pub position: Vec3,
    pub rotation_y: f64,
    pub is_moving: bool,
    pub is_grounded: bool,
    #[serde(default)]
    pub velocity: Vec3,
    #[serde(default)]
    pub velocity_y: f64,
    /// Client clock reading when the report was produced.
    #[serde(default)]
    pub timestamp: Option<f64>,
}

impl ReportedState {
    /// Stamp the report with server time, producing a storable state.
    pub fn into_state(self, server_timestamp: i64) -> PlayerState {
        PlayerState {
            position: self.position,
            rotation_y: self.rotation_y,
            is_moving: self.is_moving,
            is_grounded: self.is_grounded,
            velocity: self.velocity,
            velocity_y: self.velocity_y,
            client_timestamp: self.timestamp,
            server_timestamp,
        }
    }
}

/// `{id, state}` pair used in join notifications and world snapshots.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct PlayerSnapshot {
    pub id: ConnectionId,
    pub state: PlayerState,
}

/// One line of chat, kept in history and replayed to joiners.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct ChatEntry {
    pub sender_id: ConnectionId,
    pub message: String,
    pub timestamp: i64,
}

/// Frames sent by clients.
#[allow(missing_docs)]
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// New position/orientation report.
    PlayerUpdate { state: ReportedState },
    /// Chat line to relay to everyone.
    ChatMessage { message: String },
    /// Request to play an emote.
    EmoteCommand { emote: String },
    /// Clock-sync probe. The timestamp is opaque and echoed back untouched.
    Ping { timestamp: Option<Value> },
    /// Any `type` the relay does not understand.
    #[serde(other)]
    Unknown,
}

impl ClientMessage {
    /// Parse one inbound text frame.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Frames sent by the server.
#[allow(missing_docs)]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    AssignId {
        id: ConnectionId,
        initial_state: PlayerState,
        server_time: i64,
    },
    ExistingPlayers {
        players_data: Vec<PlayerSnapshot>,
    },
    ChatHistory {
        history: Vec<ChatEntry>,
    },
    PlayerJoined {
        player_data: PlayerSnapshot,
    },
    PlayerLeft {
        id: ConnectionId,
    },
    PlayerUpdate {
        id: ConnectionId,
        state: PlayerState,
    },
    /// Several otherwise independent messages for one recipient.
    BatchUpdate {
        updates: Vec<ServerMessage>,
    },
    ChatMessage {
        sender_id: ConnectionId,
        message: String,
        timestamp: i64,
    },
    EmoteStart {
        player_id: ConnectionId,
        emote: String,
        timestamp: i64,
    },
    Pong {
        client_timestamp: Option<Value>,
        server_timestamp: i64,
    },
}

impl ServerMessage {
    /// Wire name of this message, for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AssignId { .. } => "assign_id",
            Self::ExistingPlayers { .. } => "existing_players",
            Self::ChatHistory { .. } => "chat_history",
            Self::PlayerJoined { .. } => "player_joined",
            Self::PlayerLeft { .. } => "player_left",
            Self::PlayerUpdate { .. } => "player_update",
            Self::BatchUpdate { .. } => "batch_update",
            Self::ChatMessage { .. } => "chat_message",
            Self::EmoteStart { .. } => "emote_start",
            Self::Pong { .. } => "pong",
        }
    }

    /// Serialize once so the same text can be shared across recipients.
    pub fn encode(&self) -> Result<Arc<str>, serde_json::Error> {
        serde_json::to_string(self).map(Arc::from)
    }
}

impl From<ChatEntry> for ServerMessage {
    fn from(entry: ChatEntry) -> Self {
        Self::ChatMessage {
            sender_id: entry.sender_id,
            message: entry.message,
            timestamp: entry.timestamp,
        }
    }
}

/// Current server time in milliseconds since the Unix epoch.
pub fn server_time_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn to_json(msg: &ServerMessage) -> Value {
        serde_json::from_str(&msg.encode().unwrap()).unwrap()
    }

    #[test]
    fn parse_player_update_with_all_fields() {
        let text = r#"{"type":"player_update","state":{
            "position":{"x":1.0,"y":2.0,"z":3.0},"rotationY":0.5,
            "isMoving":true,"isGrounded":false,
            "velocity":{"x":0.1,"y":0.0,"z":-0.1},"velocityY":-9.8,"timestamp":1234.5}}"#;
        let msg = ClientMessage::parse(text).unwrap();
        let ClientMessage::PlayerUpdate { state } = msg else {
            panic!("expected player_update, got {msg:?}");
        };
        assert_eq!(state.position, Vec3::new(1.0, 2.0, 3.0));
        assert!(state.is_moving);
        assert!(!state.is_grounded);
        assert_eq!(state.velocity_y, -9.8);
        assert_eq!(state.timestamp, Some(1234.5));
    }

    #[test]
    fn parse_player_update_optional_fields_default() {
        let text = r#"{"type":"player_update","state":{
            "position":{"x":0,"y":0,"z":0},"rotationY":0,"isMoving":false,"isGrounded":true}}"#;
        let ClientMessage::PlayerUpdate { state } = ClientMessage::parse(text).unwrap() else {
            panic!("expected player_update");
        };
        assert_eq!(state.velocity, Vec3::default());
        assert_eq!(state.velocity_y, 0.0);
        assert!(state.timestamp.is_none());
    }

    #[test]
    fn parse_player_update_missing_position_is_malformed() {
        let text = r#"{"type":"player_update","state":{"rotationY":0,"isMoving":false,"isGrounded":true}}"#;
        assert!(ClientMessage::parse(text).is_err());
    }

    #[test]
    fn parse_chat_emote_ping() {
        assert_eq!(
            ClientMessage::parse(r#"{"type":"chat_message","message":"hi"}"#).unwrap(),
            ClientMessage::ChatMessage { message: "hi".into() }
        );
        assert_eq!(
            ClientMessage::parse(r#"{"type":"emote_command","emote":"wave"}"#).unwrap(),
            ClientMessage::EmoteCommand { emote: "wave".into() }
        );
        assert_eq!(
            ClientMessage::parse(r#"{"type":"ping","timestamp":42}"#).unwrap(),
            ClientMessage::Ping {
                timestamp: Some(json!(42))
            }
        );
    }

    #[test]
    fn ping_timestamp_is_optional_and_opaque() {
        assert_eq!(
            ClientMessage::parse(r#"{"type":"ping"}"#).unwrap(),
            ClientMessage::Ping { timestamp: None }
        );
        assert_eq!(
            ClientMessage::parse(r#"{"type":"ping","timestamp":"2024-01-01T00:00:00Z"}"#).unwrap(),
            ClientMessage::Ping {
                timestamp: Some(json!("2024-01-01T00:00:00Z"))
            }
        );
    }

    #[test]
    fn unknown_type_is_not_an_error() {
        let msg = ClientMessage::parse(r#"{"type":"teleport","to":"moon"}"#).unwrap();
        assert_eq!(msg, ClientMessage::Unknown);
    }

    #[test]
    fn missing_type_is_malformed() {
        assert!(ClientMessage::parse(r#"{"message":"hi"}"#).is_err());
    }

    #[test]
    fn non_json_is_malformed() {
        assert!(ClientMessage::parse("hello there").is_err());
        assert!(ClientMessage::parse("").is_err());
        assert!(ClientMessage::parse("[1,2,3]").is_err());
    }

    #[test]
    fn assign_id_wire_shape() {
        let msg = ServerMessage::AssignId {
            id: "p1".into(),
            initial_state: PlayerState::spawn(1000),
            server_time: 1000,
        };
        let json = to_json(&msg);
        assert_eq!(json["type"], "assign_id");
        assert_eq!(json["id"], "p1");
        assert_eq!(json["serverTime"], 1000);
        assert_eq!(json["initialState"]["isGrounded"], true);
        assert_eq!(json["initialState"]["rotationY"], 0.0);
        assert_eq!(json["initialState"]["position"], json!({"x":0.0,"y":0.0,"z":0.0}));
        assert!(json["initialState"].get("clientTimestamp").is_none());
    }

    #[test]
    fn snapshot_messages_use_camel_case_fields() {
        let snapshot = PlayerSnapshot {
            id: "p2".into(),
            state: PlayerState::spawn(5),
        };
        let existing = to_json(&ServerMessage::ExistingPlayers {
            players_data: vec![snapshot.clone()],
        });
        assert_eq!(existing["type"], "existing_players");
        assert_eq!(existing["playersData"][0]["id"], "p2");

        let joined = to_json(&ServerMessage::PlayerJoined { player_data: snapshot });
        assert_eq!(joined["type"], "player_joined");
        assert_eq!(joined["playerData"]["state"]["serverTimestamp"], 5);
    }

    #[test]
    fn batch_update_nests_messages() {
        let msg = ServerMessage::BatchUpdate {
            updates: vec![
                ServerMessage::PlayerLeft { id: "p1".into() },
                ServerMessage::PlayerLeft { id: "p2".into() },
            ],
        };
        let json = to_json(&msg);
        assert_eq!(json["type"], "batch_update");
        assert_eq!(json["updates"][1], json!({"type":"player_left","id":"p2"}));
    }

    #[test]
    fn chat_and_emote_wire_shape() {
        let chat = to_json(&ServerMessage::from(ChatEntry {
            sender_id: "p3".into(),
            message: "hello".into(),
            timestamp: 7,
        }));
        assert_eq!(chat, json!({"type":"chat_message","senderId":"p3","message":"hello","timestamp":7}));

        let emote = to_json(&ServerMessage::EmoteStart {
            player_id: "p3".into(),
            emote: "dance".into(),
            timestamp: 8,
        });
        assert_eq!(emote["playerId"], "p3");
        assert_eq!(emote["emote"], "dance");
    }

    #[test]
    fn pong_echoes_client_timestamp() {
        let json = to_json(&ServerMessage::Pong {
            client_timestamp: Some(json!(99.5)),
            server_timestamp: 100,
        });
        assert_eq!(json["clientTimestamp"], 99.5);
        assert_eq!(json["serverTimestamp"], 100);
    }

    #[test]
    fn reported_state_stamps_timestamps() {
        let reported = ReportedState {
            position: Vec3::new(1.0, 0.0, 0.0),
            rotation_y: 0.0,
            is_moving: true,
            is_grounded: true,
            velocity: Vec3::default(),
            velocity_y: 0.0,
            timestamp: Some(55.0),
        };
        let state = reported.into_state(77);
        assert_eq!(state.client_timestamp, Some(55.0));
        assert_eq!(state.server_timestamp, 77);
    }

    #[test]
    fn server_message_kind_matches_tag() {
        let msg = ServerMessage::PlayerLeft { id: "p9".into() };
        assert_eq!(to_json(&msg)["type"], msg.kind());
    }

    #[test]
    fn server_message_round_trips_for_tests() {
        let msg = ServerMessage::PlayerUpdate {
            id: "p4".into(),
            state: PlayerState::spawn(3),
        };
        let text = msg.encode().unwrap();
        let back: ServerMessage = serde_json::from_str(&text).unwrap();
        assert_eq!(back, msg);
    }
}
