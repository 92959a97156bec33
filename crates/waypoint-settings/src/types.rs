//! Settings types.
//!
//! Every struct uses `#[serde(default)]` so a partial settings file only has
//! to name the keys it overrides.

use serde::{Deserialize, Serialize};

/// Root settings object.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WaypointSettings {
    /// Network and HTTP settings.
    pub server: ServerSettings,
    /// Relay engine tuning.
    pub relay: RelaySettings,
    /// Log output settings.
    pub logging: LoggingSettings,
}

/// Server network settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listen port.
    pub port: u16,
    /// Directory served at `/` for browser clients.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub static_dir: Option<String>,
    /// Largest accepted inbound WebSocket frame, in bytes.
    pub max_message_size: usize,
    /// Outbound frames buffered per connection before sends start failing.
    pub send_queue_capacity: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            static_dir: None,
            max_message_size: 64 * 1024,
            send_queue_capacity: 256,
        }
    }
}

/// Relay engine settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelaySettings {
    /// Batch flushes per second.
    pub target_update_rate: u32,
    /// Liveness sweep interval in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// Chat entries kept for new joiners.
    pub chat_history_limit: usize,
    /// Minimum per-axis position change that counts as movement.
    pub position_epsilon: f64,
    /// Minimum rotation change that counts as turning.
    pub rotation_epsilon: f64,
    /// Emotes clients may trigger.
    pub allowed_emotes: Vec<String>,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            target_update_rate: 240,
            heartbeat_interval_ms: 5_000,
            chat_history_limit: 25,
            position_epsilon: 0.001,
            rotation_epsilon: 0.001,
            allowed_emotes: vec!["wave".to_string(), "dance".to_string()],
        }
    }
}

/// Log output format.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Logging settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}
