//! The consensus error taxonomy of spec §7.

use thiserror::Error;

/// Errors surfaced by the consensus pipeline.
///
/// Propagation policy (spec §7): most kinds are dropped by the caller at an
/// appropriate log level; only [`ConsensusError::InternalInvariantViolation`]
/// is treated as fatal.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConsensusError {
    /// Envelope or data signature check failed. Dropped without state
    /// change; never counted against quorum.
    #[error("invalid signature")]
    InvalidSignature,

    /// `seq < next_execute_seq`: the message is for an already-executed
    /// slot. Dropped silently.
    #[error("seq {0} is out of window (already executed)")]
    OutOfWindow(u64),

    /// `seq >= next_execute_seq + W`. For `NewTxns` this becomes a `ret = -2`
    /// client response; for votes it is simply dropped.
    #[error("seq {0} is beyond the in-flight window")]
    BeyondWindow(u64),

    /// `current_view != local view`.
    #[error("view mismatch: message view {message_view}, local view {local_view}")]
    ViewMismatch {
        /// The view carried by the incoming message.
        message_view: u64,
        /// This replica's current view.
        local_view: u64,
    },

    /// The batch's content hash was already in the proposed set; idempotent,
    /// not an error condition for the caller to surface.
    #[error("duplicate proposal for hash")]
    DuplicateProposal,

    /// A non-primary replica received a `NewTxns` request directly.
    #[error("not leader for view {0}")]
    NotLeader(u64),

    /// Channel send/recv failed after the transport's own retries.
    #[error("transport failure: {0}")]
    TransportFailure(String),

    /// A client's outstanding batch missed its `f+1`-reply deadline.
    #[error("quorum wait timed out for local_id {0}")]
    QuorumTimeout(u64),

    /// A collector observed a state anomaly (e.g. the same parallel-execute
    /// bucket slot claimed twice while `IN_FLIGHT`). Per spec §7 this is
    /// fatal: the caller should abort rather than risk corrupting order.
    #[error("internal invariant violation: {0}")]
    InternalInvariantViolation(String),

    /// The collector pool has no room for this seq (primary back-pressure).
    #[error("window full, cannot assign seq")]
    WindowFull,

    /// The collector for this seq has already executed; any further input
    /// is rejected outright.
    #[error("seq {0} already executed")]
    AlreadyExecuted(u64),

    /// A vote's request hash does not match the main proposal already
    /// stored for this seq: a different request than the one pre-prepared,
    /// i.e. an equivocating or otherwise Byzantine vote. Dropped without a
    /// view change.
    #[error("hash mismatch for seq {0}: vote does not match the stored proposal")]
    HashMismatch(u64),
}

/// Result type for consensus operations.
pub type Result<T> = std::result::Result<T, ConsensusError>;
