//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`WaypointSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over the defaults
//! 3. Apply `WAYPOINT_*` environment variable overrides (highest priority)
//! 4. Validate ranges that serde cannot express
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::{Result, SettingsError};
use crate::types::{LogFormat, WaypointSettings};

/// Resolve the default settings file path (`~/.waypoint/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".waypoint").join("settings.json")
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON or out-of-range values are
/// errors.
pub fn load_settings_from_path(path: &Path) -> Result<WaypointSettings> {
    let defaults = serde_json::to_value(WaypointSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: WaypointSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    validate(&settings)?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Reject values that would make the relay misbehave at runtime.
pub fn validate(settings: &WaypointSettings) -> Result<()> {
    let relay = &settings.relay;
    let at_least_one = [
        ("relay.targetUpdateRate", relay.target_update_rate == 0),
        ("relay.heartbeatIntervalMs", relay.heartbeat_interval_ms == 0),
        ("relay.chatHistoryLimit", relay.chat_history_limit == 0),
        ("server.sendQueueCapacity", settings.server.send_queue_capacity == 0),
    ];
    if let Some((setting, _)) = at_least_one.into_iter().find(|(_, zero)| *zero) {
        return Err(SettingsError::InvalidValue {
            setting,
            requirement: "must be at least 1",
        });
    }

    for (setting, epsilon) in [
        ("relay.positionEpsilon", relay.position_epsilon),
        ("relay.rotationEpsilon", relay.rotation_epsilon),
    ] {
        if epsilon.is_nan() || epsilon < 0.0 {
            return Err(SettingsError::InvalidValue {
                setting,
                requirement: "must be a non-negative number",
            });
        }
    }
    Ok(())
}

/// Apply environment variable overrides to loaded settings.
///
/// Invalid values are ignored with a warning (fall back to file/default).
pub fn apply_env_overrides(settings: &mut WaypointSettings) {
    // ── Server settings ─────────────────────────────────────────────
    if let Some(v) = read_env_string("WAYPOINT_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = read_env_u16("WAYPOINT_PORT", 0, 65535) {
        settings.server.port = v;
    }
    if let Some(v) = read_env_string("WAYPOINT_STATIC_DIR") {
        settings.server.static_dir = Some(v);
    }

    // ── Relay settings ──────────────────────────────────────────────
    if let Some(v) = read_env_u64("WAYPOINT_UPDATE_RATE", 1, 1000)
        .and_then(|v| u32::try_from(v).ok())
    {
        settings.relay.target_update_rate = v;
    }
    if let Some(v) = read_env_u64("WAYPOINT_HEARTBEAT_INTERVAL", 100, 600_000) {
        settings.relay.heartbeat_interval_ms = v;
    }
    if let Some(v) = read_env_usize("WAYPOINT_CHAT_HISTORY", 1, 10_000) {
        settings.relay.chat_history_limit = v;
    }

    // ── Logging settings ────────────────────────────────────────────
    if let Some(v) = read_env_string("WAYPOINT_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = read_env_string("WAYPOINT_LOG_FORMAT") {
        match parse_log_format(&v) {
            Some(format) => settings.logging.format = format,
            None => tracing::warn!(value = %v, "invalid WAYPOINT_LOG_FORMAT, ignoring"),
        }
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a log format name (`pretty` or `json`, case-insensitive).
pub fn parse_log_format(val: &str) -> Option<LogFormat> {
    match val.to_lowercase().as_str() {
        "pretty" => Some(LogFormat::Pretty),
        "json" => Some(LogFormat::Json),
        _ => None,
    }
}

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Env var readers (thin wrappers) ─────────────────────────────────────────

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn read_env_u16(name: &str, min: u16, max: u16) -> Option<u16> {
    let val = std::env::var(name).ok()?;
    let result = parse_u16_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u16 env var, ignoring");
    }
    result
}

fn read_env_u64(name: &str, min: u64, max: u64) -> Option<u64> {
    let val = std::env::var(name).ok()?;
    let result = parse_u64_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u64 env var, ignoring");
    }
    result
}

fn read_env_usize(name: &str, min: usize, max: usize) -> Option<usize> {
    let val = std::env::var(name).ok()?;
    let result = parse_usize_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid usize env var, ignoring");
    }
    result
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
