//! # waypoint-server
//!
//! Real-time state relay for multiplayer 3D sessions.
//!
//! - `WebSocket` gateway: join handshake, per-socket reader/writer pump
//! - Change filtering: position/rotation thresholds and movement flags
//! - Time-windowed batching of player updates into `batch_update` envelopes
//! - Bounded chat history replayed to joiners
//! - Ping/pong liveness sweeps
//! - HTTP endpoints: health check, Prometheus metrics, static assets
//!
//! All relay state lives in one task ([`event_loop::run`]); socket tasks talk
//! to it through a [`RelayHandle`].

#![deny(unsafe_code)]

pub mod batch;
pub mod chat;
pub mod config;
pub mod errors;
pub mod event_loop;
pub mod filter;
pub mod health;
pub mod metrics;
pub mod protocol;
pub mod relay;
pub mod router;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use errors::{ProtocolError, ServerError};
pub use event_loop::RelayHandle;
pub use relay::{DisconnectReason, Relay, RelayStats};
pub use server::{ServerHandle, start};
pub use shutdown::ShutdownReport;
