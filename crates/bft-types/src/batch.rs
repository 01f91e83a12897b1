//! Batched client requests and responses. See spec §3.

use crate::error::{Result, TypesError};
use serde::{Deserialize, Serialize};

/// A batch of opaque user requests submitted together under one `local_id`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchUserRequest {
    /// The opaque, application-defined requests in this batch.
    pub user_requests: Vec<Vec<u8>>,
    /// Client-assigned wall-clock creation time (unix millis).
    pub createtime: u64,
    /// Client-chosen id identifying this batch to the client's own bookkeeping.
    pub local_id: u64,
    /// The client proxy id this batch originated from.
    pub proxy_id: u32,
    /// The sequence number assigned to this batch once ordered.
    pub seq: u64,
    /// Content hash of the batch, stable across replicas.
    pub hash: Vec<u8>,
}

impl BatchUserRequest {
    /// Serializes the batch for use as a `Request::data` payload.
    pub fn encode(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| TypesError::Encode(e.to_string()))
    }

    /// Deserializes a batch from a `Request::data` payload.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| TypesError::Decode(e.to_string()))
    }
}

/// The result of executing a [`BatchUserRequest`], one entry per input
/// request, in the same order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchUserResponse {
    /// The sequence number this response corresponds to.
    pub seq: u64,
    /// The client proxy to route this response to.
    pub proxy_id: u32,
    /// Echoes the originating batch's `local_id`.
    pub local_id: u64,
    /// Echoes the originating batch's `createtime`.
    pub createtime: u64,
    /// Echoes the originating batch's content hash.
    pub hash: Vec<u8>,
    /// One opaque result per request in the batch, same order as submitted.
    pub responses: Vec<Vec<u8>>,
    /// Client-visible return code. `0` is success; see `bft_consensus::error`
    /// for the negative codes used on back-pressure (spec §7, open question:
    /// exact `-1` vs `-2` semantics — decided in DESIGN.md).
    pub ret: i32,
}

impl BatchUserResponse {
    /// Serializes the response for wire transport.
    pub fn encode(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| TypesError::Encode(e.to_string()))
    }

    /// Deserializes a response from wire bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| TypesError::Decode(e.to_string()))
    }
}
