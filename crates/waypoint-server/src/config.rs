//! Server configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::chat::ChatHistory;
use crate::websocket::heartbeat::LivenessMonitor;

/// Runtime configuration for the relay server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Directory served for non-API paths, if any.
    pub static_dir: Option<PathBuf>,
    /// Max inbound WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Outbound frames buffered per connection.
    pub send_queue_capacity: usize,
    /// Batch flushes per second.
    pub target_update_rate: u32,
    /// Liveness sweep interval in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// Chat entries retained for joiners.
    pub chat_history_limit: usize,
    /// Per-axis position threshold for a significant change.
    pub position_epsilon: f64,
    /// Rotation threshold for a significant change.
    pub rotation_epsilon: f64,
    /// Emotes accepted from clients.
    pub allowed_emotes: Vec<String>,
}

impl ServerConfig {
    /// Delay between the first enqueued update and its batch flush.
    pub fn batch_interval(&self) -> Duration {
        Duration::from_secs(1) / self.target_update_rate.max(1)
    }

    /// Cadence of the liveness sweep.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms.max(1))
    }
}

impl Default for ServerConfig {
    #[allow(clippy::cast_possible_truncation)]
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            static_dir: None,
            max_message_size: 64 * 1024,
            send_queue_capacity: 256,
            target_update_rate: 240,
            heartbeat_interval_ms: LivenessMonitor::DEFAULT_INTERVAL.as_millis() as u64,
            chat_history_limit: ChatHistory::DEFAULT_CAPACITY,
            position_epsilon: 0.001,
            rotation_epsilon: 0.001,
            allowed_emotes: vec!["wave".into(), "dance".into()],
        }
    }
}
