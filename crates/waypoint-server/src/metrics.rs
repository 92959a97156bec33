//! Prometheus recorder and metric names.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the global Prometheus recorder.
///
/// Call once at startup, before anything is recorded. The returned handle
/// renders the `/metrics` body.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render Prometheus text format.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

/// Connections accepted (counter).
pub const RELAY_CONNECTIONS_TOTAL: &str = "relay_connections_total";
/// Connections removed (counter, labels: reason).
pub const RELAY_DISCONNECTIONS_TOTAL: &str = "relay_disconnections_total";
/// Registered connections (gauge).
pub const RELAY_CONNECTIONS_ACTIVE: &str = "relay_connections_active";
/// Player updates dropped as insignificant (counter).
pub const RELAY_UPDATES_FILTERED_TOTAL: &str = "relay_updates_filtered_total";
/// Player updates queued for other players (counter).
pub const RELAY_UPDATES_BROADCAST_TOTAL: &str = "relay_updates_broadcast_total";
/// Batch flushes performed (counter).
pub const RELAY_BATCHES_FLUSHED_TOTAL: &str = "relay_batches_flushed_total";
/// `batch_update` envelopes sent (counter).
pub const RELAY_BATCH_ENVELOPES_TOTAL: &str = "relay_batch_envelopes_total";
/// Frames a recipient's queue rejected (counter).
pub const RELAY_SEND_FAILURES_TOTAL: &str = "relay_send_failures_total";
/// Inbound frames that failed to parse (counter).
pub const RELAY_MALFORMED_FRAMES_TOTAL: &str = "relay_malformed_frames_total";
