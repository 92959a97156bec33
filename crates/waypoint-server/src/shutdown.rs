//! Ordered stop of the relay task and the HTTP listener.
//!
//! The relay goes first so every socket is told to close while the listener
//! is still up; only then does axum stop accepting and drain its requests.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// How long [`ShutdownCoordinator::graceful_shutdown`] waits by default.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// What happened during shutdown.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Sockets the relay closed, or `None` if it did not finish in time.
    pub sockets_closed: Option<usize>,
    /// Whether the HTTP listener drained before the deadline.
    pub http_drained: bool,
}

/// Holds one stop signal for the relay task and one for the listener.
#[derive(Debug, Default)]
pub struct ShutdownCoordinator {
    relay: CancellationToken,
    http: CancellationToken,
}

impl ShutdownCoordinator {
    /// Create a coordinator with fresh tokens.
    pub fn new() -> Self {
        Self::default()
    }

    /// Token for [`event_loop::run`](crate::event_loop::run).
    pub fn relay_token(&self) -> CancellationToken {
        self.relay.clone()
    }

    /// Token for the axum graceful-shutdown future.
    pub fn http_token(&self) -> CancellationToken {
        self.http.clone()
    }

    /// Stop the relay, wait for it to close its sockets, then stop the
    /// listener. Both waits share one `timeout` budget.
    pub async fn graceful_shutdown(
        &self,
        relay_task: JoinHandle<usize>,
        http_task: JoinHandle<()>,
        timeout: Option<Duration>,
    ) -> ShutdownReport {
        let timeout = timeout.unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT);
        let deadline = Instant::now() + timeout;

        self.relay.cancel();
        let sockets_closed = match time::timeout_at(deadline, relay_task).await {
            Ok(Ok(closed)) => Some(closed),
            Ok(Err(e)) => {
                warn!(error = %e, "relay task failed");
                None
            }
            Err(_) => {
                warn!(timeout_ms = timeout.as_millis(), "relay did not stop in time");
                None
            }
        };

        self.http.cancel();
        let http_drained = time::timeout_at(deadline, http_task).await.is_ok();
        if !http_drained {
            warn!(timeout_ms = timeout.as_millis(), "http listener did not drain in time");
        }

        info!(?sockets_closed, http_drained, "shutdown finished");
        ShutdownReport {
            sockets_closed,
            http_drained,
        }
    }
}
