//! The batched-broadcast wire envelope. See spec §4.B: the replica
//! communicator amortizes TCP overhead by packing up to `tcp_batch_num`
//! queued envelopes into one `BroadcastData` before handing it to a peer's
//! channel.

use crate::error::{Result, TypesError};
use crate::request::Envelope;
use serde::{Deserialize, Serialize};

/// A bundle of independently-signed envelopes sent to a peer in one write.
/// Each `Envelope` inside remains intact — bundling is purely a transport
/// optimization and must not be visible to the consensus layer above
/// `Channel`/`ReplicaCommunicator`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BroadcastData {
    /// The bundled envelopes, in send order.
    pub envelopes: Vec<Envelope>,
}

impl BroadcastData {
    /// Creates an empty bundle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a bundle from already-collected envelopes.
    #[must_use]
    pub fn from_envelopes(envelopes: Vec<Envelope>) -> Self {
        Self { envelopes }
    }

    /// Number of envelopes in this bundle.
    #[must_use]
    pub fn len(&self) -> usize {
        self.envelopes.len()
    }

    /// Whether this bundle carries no envelopes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.envelopes.is_empty()
    }

    /// Serializes the bundle for wire transport.
    pub fn encode(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| TypesError::Encode(e.to_string()))
    }

    /// Deserializes a bundle from wire bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| TypesError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{Request, RequestType};

    #[test]
    fn broadcast_bundle_roundtrip() {
        let req = Request::new(RequestType::Prepare, 1, vec![], vec![1, 2]);
        let env = Envelope::new(req.encode().unwrap(), None);
        let bundle = BroadcastData::from_envelopes(vec![env]);
        let bytes = bundle.encode().unwrap();
        let back = BroadcastData::decode(&bytes).unwrap();
        assert_eq!(back.len(), 1);
    }

    #[test]
    fn empty_bundle_roundtrips() {
        let bundle = BroadcastData::new();
        let bytes = bundle.encode().unwrap();
        let back = BroadcastData::decode(&bytes).unwrap();
        assert!(back.is_empty());
    }
}
