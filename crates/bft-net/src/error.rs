//! Transport error taxonomy. See spec §7.

use thiserror::Error;

/// Errors surfaced by the transport layer.
#[derive(Debug, Error)]
pub enum NetError {
    /// Envelope or data signature verification failed. Callers must treat
    /// this distinctly from I/O failure (spec §4.A).
    #[error("invalid signature from peer")]
    InvalidSignature,

    /// The underlying socket operation failed, including after the
    /// configured retry count was exhausted.
    #[error("transport failure: {0}")]
    TransportFailure(String),

    /// The destination node id is not a known replica or client.
    #[error("unknown destination node: {0}")]
    UnknownNode(u32),

    /// The channel was used after being closed and before `reinit()`.
    #[error("channel is closed")]
    Closed,
}

/// Result type for transport operations.
pub type Result<T> = std::result::Result<T, NetError>;
