//! Axum HTTP + WebSocket server around the relay task.

use std::net::SocketAddr;
use std::path::Path;
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::errors::ServerError;
use crate::event_loop::{self, EVENT_QUEUE_CAPACITY, RelayHandle};
use crate::health::{self, HealthResponse};
use crate::relay::Relay;
use crate::shutdown::{ShutdownCoordinator, ShutdownReport};
use crate::websocket::handler::handle_socket;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Sender side of the relay's event queue.
    pub relay: RelayHandle,
    /// When the server started.
    pub start_time: Instant,
    /// Renders `/metrics`; `None` when no recorder is installed.
    pub metrics: Option<PrometheusHandle>,
    /// Outbound frames buffered per socket.
    pub send_queue_capacity: usize,
    /// Largest inbound WebSocket message accepted.
    pub max_message_size: usize,
}

/// Build the router: `/ws`, `/health`, `/metrics`, and optionally static files.
pub fn build_router(state: AppState, static_dir: Option<&Path>) -> Router {
    let router = Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state);

    let router = match static_dir {
        Some(dir) => router.fallback_service(ServeDir::new(dir)),
        None => router,
    };

    router
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// GET /ws
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let AppState {
        relay,
        send_queue_capacity,
        max_message_size,
        ..
    } = state;
    ws.max_message_size(max_message_size)
        .on_upgrade(move |socket| handle_socket(socket, relay, send_queue_capacity))
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let stats = state.relay.stats().await;
    let code = if stats.is_some() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(health::health_check(state.start_time, stats)))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => crate::metrics::render(handle).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// A running server.
pub struct ServerHandle {
    addr: SocketAddr,
    relay: RelayHandle,
    shutdown: ShutdownCoordinator,
    relay_task: JoinHandle<usize>,
    http_task: JoinHandle<()>,
}

impl ServerHandle {
    /// Address the listener is bound to.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Handle to the relay task.
    pub fn relay(&self) -> &RelayHandle {
        &self.relay
    }

    /// Close every socket, then stop accepting connections and wait for the
    /// listener to drain.
    pub async fn shutdown(self, timeout: Option<Duration>) -> ShutdownReport {
        info!(addr = %self.addr, "shutting down");
        self.shutdown
            .graceful_shutdown(self.relay_task, self.http_task, timeout)
            .await
    }
}

/// Bind `config.host:config.port`, spawn the relay task and the HTTP server.
pub async fn start(
    config: ServerConfig,
    metrics: Option<PrometheusHandle>,
) -> Result<ServerHandle, ServerError> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: addr.clone(),
            source,
        })?;
    let local_addr = listener.local_addr()?;

    let shutdown = ShutdownCoordinator::new();
    let (relay, events) = event_loop::channel(EVENT_QUEUE_CAPACITY);
    let relay_task = tokio::spawn(event_loop::run(
        Relay::new(&config),
        events,
        shutdown.relay_token(),
    ));

    let state = AppState {
        relay: relay.clone(),
        start_time: Instant::now(),
        metrics,
        send_queue_capacity: config.send_queue_capacity,
        max_message_size: config.max_message_size,
    };
    let app = build_router(state, config.static_dir.as_deref());

    let token = shutdown.http_token();
    let http_task = tokio::spawn(async move {
        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move { token.cancelled().await })
            .await;
        if let Err(e) = result {
            error!(error = %e, "http server failed");
        }
    });

    info!(
        addr = %local_addr,
        static_dir = ?config.static_dir,
        update_rate = config.target_update_rate,
        "waypoint relay listening"
    );

    Ok(ServerHandle {
        addr: local_addr,
        relay,
        shutdown,
        relay_task,
        http_task,
    })
}
