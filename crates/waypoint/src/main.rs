//! # waypoint
//!
//! Relay binary: loads settings, initializes logging and metrics, and runs
//! the HTTP/WebSocket server until ctrl-c.

#![deny(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;
use waypoint_server::{ServerConfig, metrics};
use waypoint_settings::{LogFormat, LoggingSettings, WaypointSettings};

/// Real-time multiplayer state relay.
#[derive(Parser, Debug)]
#[command(name = "waypoint", about = "Real-time multiplayer state relay")]
struct Cli {
    /// Settings file (defaults to `~/.waypoint/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Directory of client assets to serve (overrides settings).
    #[arg(long)]
    static_dir: Option<PathBuf>,
}

impl Cli {
    fn apply(&self, settings: &mut WaypointSettings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(dir) = &self.static_dir {
            settings.server.static_dir = Some(dir.to_string_lossy().into_owned());
        }
    }
}

/// Flatten loaded settings into the server's runtime configuration.
fn server_config(settings: &WaypointSettings) -> ServerConfig {
    ServerConfig {
        host: settings.server.host.clone(),
        port: settings.server.port,
        static_dir: settings.server.static_dir.as_ref().map(PathBuf::from),
        max_message_size: settings.server.max_message_size,
        send_queue_capacity: settings.server.send_queue_capacity,
        target_update_rate: settings.relay.target_update_rate,
        heartbeat_interval_ms: settings.relay.heartbeat_interval_ms,
        chat_history_limit: settings.relay.chat_history_limit,
        position_epsilon: settings.relay.position_epsilon,
        rotation_epsilon: settings.relay.rotation_epsilon,
        allowed_emotes: settings.relay.allowed_emotes.clone(),
    }
}

/// `RUST_LOG` wins over the configured level.
fn env_filter(logging: &LoggingSettings) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&logging.level)
            .with_context(|| format!("invalid log level: {}", logging.level)),
    }
}

fn init_logging(logging: &LoggingSettings) -> Result<()> {
    let filter = env_filter(logging)?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let result = match logging.format {
        LogFormat::Pretty => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    result.map_err(|e| anyhow::anyhow!("failed to initialize logging: {e}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let settings_path = args
        .settings
        .clone()
        .unwrap_or_else(waypoint_settings::settings_path);
    let mut settings = waypoint_settings::load_settings_from_path(&settings_path)
        .with_context(|| format!("failed to load settings from {}", settings_path.display()))?;
    args.apply(&mut settings);

    init_logging(&settings.logging)?;
    tracing::info!(path = %settings_path.display(), "settings loaded");

    let metrics_handle = metrics::install_recorder().context("failed to install metrics recorder")?;

    let server = waypoint_server::start(server_config(&settings), Some(metrics_handle))
        .await
        .context("failed to start server")?;
    tracing::info!(addr = %server.addr(), "waypoint ready");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;

    tracing::info!("shutting down");
    let report = server.shutdown(None).await;
    tracing::info!(
        sockets_closed = ?report.sockets_closed,
        http_drained = report.http_drained,
        "shutdown complete"
    );
    Ok(())
}
