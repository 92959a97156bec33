//! Ping/pong liveness monitoring.

use std::time::Duration;

use tracing::trace;

use super::registry::ConnectionRegistry;
use crate::protocol::ConnectionId;

/// Connections a sweep found to be dead.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SweepOutcome {
    /// Did not acknowledge the previous probe.
    pub timed_out: Vec<ConnectionId>,
    /// Writer was already gone when probed.
    pub unreachable: Vec<ConnectionId>,
}

impl SweepOutcome {
    /// Whether the sweep found nothing to evict.
    pub fn is_empty(&self) -> bool {
        self.timed_out.is_empty() && self.unreachable.is_empty()
    }
}

/// Two-phase probe/ack sweep.
///
/// Each sweep clears every connection's alive flag and sends a ping. A pong
/// sets the flag again. A connection still flagged dead at the next sweep
/// is reported as timed out, so detection takes at most two intervals.
#[derive(Clone, Copy, Debug)]
pub struct LivenessMonitor {
    interval: Duration,
}

impl LivenessMonitor {
    /// Default sweep cadence.
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);

    /// Create a monitor sweeping every `interval`.
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// Sweep cadence.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Probe every connection; report the ones to evict.
    ///
    /// Does not remove anything from `registry`.
    pub fn sweep(&self, registry: &mut ConnectionRegistry) -> SweepOutcome {
        let mut outcome = SweepOutcome::default();
        for id in registry.ids() {
            let Some(conn) = registry.get_mut(&id) else {
                continue;
            };
            if !conn.check_alive() {
                outcome.timed_out.push(id);
            } else if !conn.ping() {
                outcome.unreachable.push(id);
            } else {
                trace!(conn_id = %id, "sent liveness probe");
            }
        }
        outcome
    }
}

impl Default for LivenessMonitor {
    fn default() -> Self {
        Self::new(Self::DEFAULT_INTERVAL)
    }
}
