//! WebSocket connections, registry, liveness probing and the socket pump.

pub mod connection;
pub mod handler;
pub mod heartbeat;
pub mod registry;
