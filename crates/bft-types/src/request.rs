//! The on-wire `Request` message and its signed envelope.
//!
//! See spec §3 (Data Model) and §6.1 (Wire Envelope). `Request` is the single
//! tagged variant used for every message type exchanged between replicas and
//! clients; `Envelope` is the outermost transport-auth wrapper.

use crate::error::{Result, TypesError};
use serde::{Deserialize, Serialize};

/// The kind of a [`Request`]. Stable across wire versions — unknown values
/// decode successfully (via `Unknown`) so a replica on a newer version never
/// treats an unrecognized type as fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestType {
    /// A request arriving directly from a client proxy.
    ClientRequest,
    /// A batched client request forwarded to the primary for ordering.
    NewTxns,
    /// Primary's proposal for a sequence number.
    PrePrepare,
    /// A replica's vote to prepare a proposal.
    Prepare,
    /// A replica's vote to commit a proposal.
    Commit,
    /// A reply carrying an executed batch's results.
    Response,
    /// Membership/readiness heartbeat, never signed.
    HeartBeat,
    /// Reserved extension point for algorithm-specific messages.
    CustomConsensus,
    /// Reserved: view-change vote (stub handler only, see spec §9).
    ViewChange,
    /// Reserved: new-view certificate (stub handler only, see spec §9).
    NewView,
}

/// Hash algorithm used for `Signature::hash_type` in the wire envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HashType {
    /// SHA-256 content hash.
    Sha256,
}

/// A signature over some serialized payload, tagged with the signer's node
/// id so a verifier can look up the right public key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureInfo {
    /// Raw signature bytes.
    pub sig: Vec<u8>,
    /// The node id that produced this signature.
    pub node_id: u32,
    /// The hash algorithm the signature was computed over.
    pub hash_type: HashType,
}

impl SignatureInfo {
    /// Creates a new signature record.
    #[must_use]
    pub fn new(sig: Vec<u8>, node_id: u32, hash_type: HashType) -> Self {
        Self {
            sig,
            node_id,
            hash_type,
        }
    }
}

/// The inner, tagged consensus message. See spec §3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Message type.
    pub request_type: RequestType,
    /// Sequence number assigned by the primary; 0 before assignment.
    pub seq: u64,
    /// The view under which this message is valid.
    pub current_view: u64,
    /// The replica that sent this message.
    pub sender_id: u32,
    /// The client proxy that originated the underlying batch, if any.
    pub proxy_id: u32,
    /// Content hash, stable across replicas for the same batch.
    pub hash: Vec<u8>,
    /// Opaque payload (a serialized `BatchUserRequest` for NewTxns/PrePrepare).
    pub data: Vec<u8>,
    /// End-to-end signature over `data` by `sender_id`'s key. Distinct from
    /// the envelope signature, which authenticates the transport hop.
    pub data_signature: Option<SignatureInfo>,
    /// Collected commit signatures once a quorum certificate exists.
    pub committed_certs: Vec<SignatureInfo>,
}

impl Request {
    /// Creates a new request with no signature or certs attached.
    #[must_use]
    pub fn new(request_type: RequestType, sender_id: u32, data: Vec<u8>, hash: Vec<u8>) -> Self {
        Self {
            request_type,
            seq: 0,
            current_view: 0,
            sender_id,
            proxy_id: 0,
            hash,
            data,
            data_signature: None,
            committed_certs: Vec::new(),
        }
    }

    /// Serializes this request for wire transport.
    pub fn encode(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| TypesError::Encode(e.to_string()))
    }

    /// Deserializes a request from wire bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| TypesError::Decode(e.to_string()))
    }
}

/// The outermost transport envelope: an opaque payload plus an optional
/// signature authenticating the hop. `data` holds a serialized [`Request`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// Serialized `Request`.
    pub data: Vec<u8>,
    /// Transport-hop signature, absent when signing is disabled.
    pub signature: Option<SignatureInfo>,
}

impl Envelope {
    /// Wraps already-serialized request bytes with an optional signature.
    #[must_use]
    pub fn new(data: Vec<u8>, signature: Option<SignatureInfo>) -> Self {
        Self { data, signature }
    }

    /// Serializes the envelope for wire transport.
    pub fn encode(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| TypesError::Encode(e.to_string()))
    }

    /// Deserializes an envelope from wire bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| TypesError::Decode(e.to_string()))
    }
}
