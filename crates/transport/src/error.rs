//! Transport-level error types.

use thiserror::Error;

/// Errors surfaced by the transport bindings.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid JSON frame: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("transport is closed")]
    Closed,
}

/// Error from registering a pending request under an id that is
/// already in flight.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CorrelationError {
    #[error("correlation id '{0}' is already pending")]
    DuplicateId(String),
}
