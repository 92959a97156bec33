//! Inbound frame dispatch.

use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::metrics;
use crate::protocol::{
    ChatEntry, ClientMessage, ConnectionId, ReportedState, ServerMessage, server_time_ms,
};
use crate::relay::{DisconnectReason, Relay};

impl Relay {
    /// Handle one text frame from `id`.
    ///
    /// Any frame counts as proof of life. Frames that fail to parse are
    /// logged and dropped without closing the connection; unknown `type`
    /// values are ignored.
    pub fn handle_frame(&mut self, id: &ConnectionId, text: &str) {
        let now = Instant::now();
        let Some(conn) = self.registry.get_mut(id) else {
            debug!(conn_id = %id, "frame from unregistered connection");
            return;
        };
        conn.touch(now);

        let message = match ClientMessage::parse(text) {
            Ok(message) => message,
            Err(e) => {
                ::metrics::counter!(metrics::RELAY_MALFORMED_FRAMES_TOTAL).increment(1);
                warn!(conn_id = %id, error = %e, "discarding malformed frame");
                return;
            }
        };

        match message {
            ClientMessage::PlayerUpdate { state } => self.on_player_update(id, state, now),
            ClientMessage::ChatMessage { message } => self.on_chat(id, message),
            ClientMessage::EmoteCommand { emote } => self.on_emote(id, emote),
            ClientMessage::Ping { timestamp } => self.on_ping(id, timestamp),
            ClientMessage::Unknown => {
                debug!(conn_id = %id, "ignoring unknown message type");
            }
        }
    }

    fn on_player_update(&mut self, id: &ConnectionId, reported: ReportedState, now: Instant) {
        let state = reported.into_state(server_time_ms());
        let Some(conn) = self.registry.get_mut(id) else {
            return;
        };

        let significant = self.filter.significant(Some(conn.state()), &state);
        conn.set_state(state.clone());
        if !significant {
            ::metrics::counter!(metrics::RELAY_UPDATES_FILTERED_TOTAL).increment(1);
            trace!(conn_id = %id, "update below threshold");
            return;
        }
        conn.last_update = now;

        let update = ServerMessage::PlayerUpdate {
            id: id.clone(),
            state,
        };
        let recipients = self.registry.ids_except(id);
        ::metrics::counter!(metrics::RELAY_UPDATES_BROADCAST_TOTAL).increment(1);
        for recipient in recipients {
            self.batch.enqueue(recipient, update.clone(), now);
        }
    }

    fn on_chat(&mut self, id: &ConnectionId, message: String) {
        let entry = ChatEntry {
            sender_id: id.clone(),
            message,
            timestamp: server_time_ms(),
        };
        debug!(conn_id = %id, len = entry.message.len(), "chat message");
        self.chat.append(entry.clone());
        let failed = self.registry.broadcast(&entry.into(), None);
        self.disconnect_failed(failed);
    }

    fn on_emote(&mut self, id: &ConnectionId, emote: String) {
        if !self.allowed_emotes.contains(&emote) {
            debug!(conn_id = %id, emote, "ignoring emote outside allow-list");
            return;
        }
        let start = ServerMessage::EmoteStart {
            player_id: id.clone(),
            emote,
            timestamp: server_time_ms(),
        };
        let failed = self.registry.broadcast(&start, None);
        self.disconnect_failed(failed);
    }

    fn on_ping(&mut self, id: &ConnectionId, client_timestamp: Option<Value>) {
        let pong = ServerMessage::Pong {
            client_timestamp,
            server_timestamp: server_time_ms(),
        };
        if !self.registry.send_message(id, &pong) {
            ::metrics::counter!(metrics::RELAY_SEND_FAILURES_TOTAL).increment(1);
            self.disconnect(id, DisconnectReason::SendFailed);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::{Value, json};
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    use crate::config::ServerConfig;
    use crate::relay::Relay;
    use crate::websocket::connection::{Outbound, SocketLink};

    use super::*;

    struct Client {
        id: ConnectionId,
        rx: mpsc::Receiver<Outbound>,
    }

    impl Client {
        fn frames(&mut self) -> Vec<Value> {
            let mut out = Vec::new();
            while let Ok(msg) = self.rx.try_recv() {
                if let Outbound::Text(text) = msg {
                    out.push(serde_json::from_str(&text).unwrap());
                }
            }
            out
        }
    }

    fn join(relay: &mut Relay) -> Client {
        let (tx, rx) = mpsc::channel(64);
        let id = relay.connect(SocketLink::new(tx, CancellationToken::new()));
        Client { id, rx }
    }

    fn relay() -> Relay {
        Relay::new(&ServerConfig::default())
    }

    fn update(x: f64, moving: bool) -> String {
        json!({
            "type": "player_update",
            "state": {
                "position": {"x": x, "y": 0.0, "z": 0.0},
                "rotationY": 0.0,
                "isMoving": moving,
                "isGrounded": true,
                "velocity": {"x": 0.0, "y": 0.0, "z": 0.0},
                "velocityY": 0.0,
                "timestamp": 1.0
            }
        })
        .to_string()
    }

    #[tokio::test]
    async fn significant_update_is_batched_for_others() {
        let mut relay = relay();
        let mut a = join(&mut relay);
        let mut b = join(&mut relay);
        let _ = a.frames();
        let _ = b.frames();

        relay.handle_frame(&a.id, &update(1.0, true));
        assert!(relay.batch().is_scheduled());
        assert_eq!(relay.batch().pending_for(&b.id), 1);
        assert_eq!(relay.batch().pending_for(&a.id), 0);
        assert!(b.frames().is_empty());

        relay.flush_batches();
        let frames = b.frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0]["type"], "player_update");
        assert_eq!(frames[0]["id"], a.id.0);
        assert_eq!(frames[0]["state"]["position"]["x"], 1.0);
        assert!(frames[0]["state"]["serverTimestamp"].is_i64());
        assert!(a.frames().is_empty());
    }

    #[tokio::test]
    async fn sub_threshold_move_is_filtered() {
        let mut relay = relay();
        let a = join(&mut relay);
        let _b = join(&mut relay);

        relay.handle_frame(&a.id, &update(0.0005, false));
        assert!(!relay.batch().is_scheduled());
    }

    #[tokio::test]
    async fn filtered_update_still_replaces_stored_state() {
        let mut relay = relay();
        let a = join(&mut relay);
        let _b = join(&mut relay);

        relay.handle_frame(&a.id, &update(0.0005, false));
        let stored = relay.registry.get_mut(&a.id).unwrap().state();
        assert!((stored.position.x - 0.0005).abs() < f64::EPSILON);

        // Drift accumulates against the newest stored state, not the spawn.
        relay.handle_frame(&a.id, &update(0.001, false));
        assert!(!relay.batch().is_scheduled());
    }

    #[tokio::test]
    async fn movement_flag_flip_is_significant() {
        let mut relay = relay();
        let a = join(&mut relay);
        let b = join(&mut relay);

        relay.handle_frame(&a.id, &update(0.0, true));
        assert_eq!(relay.batch().pending_for(&b.id), 1);
    }

    #[tokio::test]
    async fn several_updates_coalesce_into_batch_update() {
        let mut relay = relay();
        let a = join(&mut relay);
        let c = join(&mut relay);
        let mut b = join(&mut relay);
        let _ = b.frames();

        relay.handle_frame(&a.id, &update(1.0, true));
        relay.handle_frame(&c.id, &update(2.0, true));
        relay.flush_batches();

        let frames = b.frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0]["type"], "batch_update");
        let updates = frames[0]["updates"].as_array().unwrap();
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0]["id"], a.id.0);
        assert_eq!(updates[1]["id"], c.id.0);
    }

    #[tokio::test]
    async fn chat_goes_to_everyone_and_history() {
        let mut relay = relay();
        let mut a = join(&mut relay);
        let mut b = join(&mut relay);
        let _ = a.frames();
        let _ = b.frames();

        relay.handle_frame(&a.id, r#"{"type":"chat_message","message":"hello"}"#);
        let sender_id = a.id.0.clone();
        for client in [&mut a, &mut b] {
            let frames = client.frames();
            assert_eq!(frames.len(), 1);
            assert_eq!(frames[0]["type"], "chat_message");
            assert_eq!(frames[0]["senderId"], sender_id);
            assert_eq!(frames[0]["message"], "hello");
        }
        assert_eq!(relay.chat.len(), 1);

        // A later joiner gets it replayed.
        let mut c = join(&mut relay);
        let history = c
            .frames()
            .into_iter()
            .find(|f| f["type"] == "chat_history")
            .unwrap();
        assert_eq!(history["history"][0]["message"], "hello");
    }

    #[tokio::test]
    async fn allowed_emote_is_broadcast() {
        let mut relay = relay();
        let mut a = join(&mut relay);
        let mut b = join(&mut relay);
        let _ = a.frames();
        let _ = b.frames();

        relay.handle_frame(&a.id, r#"{"type":"emote_command","emote":"wave"}"#);
        let frames = b.frames();
        assert_eq!(frames[0]["type"], "emote_start");
        assert_eq!(frames[0]["playerId"], a.id.0);
        assert_eq!(frames[0]["emote"], "wave");
        assert_eq!(a.frames().len(), 1);
    }

    #[tokio::test]
    async fn unknown_emote_is_dropped() {
        let mut relay = relay();
        let mut a = join(&mut relay);
        let mut b = join(&mut relay);
        let _ = a.frames();
        let _ = b.frames();

        relay.handle_frame(&a.id, r#"{"type":"emote_command","emote":"backflip"}"#);
        assert!(a.frames().is_empty());
        assert!(b.frames().is_empty());
    }

    #[tokio::test]
    async fn ping_without_numeric_timestamp_still_gets_pong() {
        let mut relay = relay();
        let mut a = join(&mut relay);
        let _ = a.frames();

        relay.handle_frame(&a.id, r#"{"type":"ping"}"#);
        relay.handle_frame(&a.id, r#"{"type":"ping","timestamp":"t-17"}"#);
        let frames = a.frames();
        assert_eq!(frames.len(), 2);
        assert!(frames[0]["clientTimestamp"].is_null());
        assert_eq!(frames[1]["clientTimestamp"], "t-17");
    }

    #[tokio::test]
    async fn ping_is_answered_to_sender_only() {
        let mut relay = relay();
        let mut a = join(&mut relay);
        let mut b = join(&mut relay);
        let _ = a.frames();
        let _ = b.frames();

        relay.handle_frame(&a.id, r#"{"type":"ping","timestamp":1234.5}"#);
        let frames = a.frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0]["type"], "pong");
        assert_eq!(frames[0]["clientTimestamp"], 1234.5);
        assert!(frames[0]["serverTimestamp"].is_i64());
        assert!(b.frames().is_empty());
    }

    #[tokio::test]
    async fn malformed_and_unknown_frames_are_ignored() {
        let mut relay = relay();
        let mut a = join(&mut relay);
        let mut b = join(&mut relay);
        let _ = a.frames();
        let _ = b.frames();

        relay.handle_frame(&a.id, "not json at all");
        relay.handle_frame(&a.id, r#"{"type":"teleport","to":"moon"}"#);
        relay.handle_frame(&a.id, r#"{"type":"player_update","state":{}}"#);

        assert_eq!(relay.stats().connections, 2);
        assert!(a.frames().is_empty());
        assert!(b.frames().is_empty());
        assert!(!relay.batch().is_scheduled());
    }

    #[tokio::test]
    async fn frame_from_unknown_id_is_ignored() {
        let mut relay = relay();
        let mut a = join(&mut relay);
        let _ = a.frames();
        relay.handle_frame(&"p99".into(), r#"{"type":"chat_message","message":"ghost"}"#);
        assert!(a.frames().is_empty());
        assert!(relay.chat.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn frame_refreshes_heartbeat() {
        let mut relay = relay();
        let a = join(&mut relay);
        let before = relay.registry.get_mut(&a.id).unwrap().last_heartbeat;
        tokio::time::advance(Duration::from_secs(1)).await;
        relay.handle_frame(&a.id, r#"{"type":"ping","timestamp":0}"#);
        assert!(relay.registry.get_mut(&a.id).unwrap().last_heartbeat > before);
    }

    /// Two players join, A moves, B chats, A waves, B goes silent.
    #[tokio::test(start_paused = true)]
    async fn two_player_session() {
        let mut relay = relay();
        let mut a = join(&mut relay);
        let a_welcome = a.frames();
        assert_eq!(a_welcome.len(), 1);
        assert_eq!(a_welcome[0]["type"], "assign_id");

        let mut b = join(&mut relay);
        let b_welcome = b.frames();
        let kinds: Vec<&str> = b_welcome.iter().map(|f| f["type"].as_str().unwrap()).collect();
        assert_eq!(kinds, ["assign_id", "existing_players"]);
        assert_eq!(b_welcome[1]["playersData"][0]["id"], a.id.0);
        let joined = a.frames();
        assert_eq!(joined[0]["type"], "player_joined");
        assert_eq!(joined[0]["playerData"]["id"], b.id.0);

        relay.handle_frame(&a.id, &update(1.0, true));
        tokio::time::advance(relay.batch().interval()).await;
        relay.flush_batches();
        assert_eq!(b.frames()[0]["state"]["position"]["x"], 1.0);

        relay.handle_frame(&b.id, r#"{"type":"chat_message","message":"hi"}"#);
        assert_eq!(a.frames()[0]["message"], "hi");
        assert_eq!(b.frames()[0]["message"], "hi");

        relay.handle_frame(&a.id, r#"{"type":"emote_command","emote":"wave"}"#);
        assert_eq!(b.frames()[0]["emote"], "wave");
        let _ = a.frames();

        relay.liveness_sweep();
        relay.handle_pong(&a.id);
        relay.liveness_sweep();

        let left = a.frames();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0]["type"], "player_left");
        assert_eq!(left[0]["id"], b.id.0);
        assert_eq!(relay.stats().connections, 1);
    }
}
