//! `/health` endpoint body.

use std::time::Instant;

use serde::Serialize;

use crate::relay::RelayStats;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// `"ok"` while the relay task is running, `"unavailable"` otherwise.
    pub status: &'static str,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Registered player connections.
    pub connections: usize,
    /// Chat entries held for new joiners.
    pub chat_entries: usize,
}

/// Build a health response. `stats` is `None` when the relay has stopped.
pub fn health_check(start_time: Instant, stats: Option<RelayStats>) -> HealthResponse {
    let status = if stats.is_some() { "ok" } else { "unavailable" };
    let stats = stats.unwrap_or_default();
    HealthResponse {
        status,
        uptime_secs: start_time.elapsed().as_secs(),
        connections: stats.connections,
        chat_entries: stats.chat_entries,
    }
}
