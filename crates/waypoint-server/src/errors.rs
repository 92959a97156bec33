//! Error types for the relay server.

use thiserror::Error;

/// An inbound frame that could not be turned into a [`ClientMessage`].
///
/// [`ClientMessage`]: crate::protocol::ClientMessage
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Not JSON, not an object, missing `type`, or a known type with bad fields.
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Failures starting or running the HTTP listener.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Could not bind the listen address.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address that was requested.
        addr: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Could not read back the bound address.
    #[error("listener error: {0}")]
    Io(#[from] std::io::Error),
}
