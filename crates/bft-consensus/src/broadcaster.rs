//! The `Broadcaster` seam: the minimal outbound-network capability the
//! consensus pipeline needs from `bft-net::ReplicaCommunicator` (spec §4.B).
//!
//! Spec §9's design note calls for breaking the cyclic references the
//! original gives `Commitment`/`ResponseManager` by "passing capability
//! handles ... at construction, not whole-object references". Depending on
//! a narrow trait instead of the concrete `ReplicaCommunicator` achieves the
//! same thing in idiomatic Rust: `Commitment` and `ResponseManager` take
//! `Arc<dyn Broadcaster>`, and tests substitute a recording double instead of
//! standing up real TCP listeners.

use async_trait::async_trait;
use bft_net::{NetError, ReplicaCommunicator};
use bft_types::RequestType;
use std::sync::Arc;

/// Outbound network capability required by the consensus pipeline.
///
/// Mirrors `ReplicaCommunicator`'s public API (spec §4.B) exactly; see that
/// type for the scheduling and error-policy contract of each method.
#[async_trait]
pub trait Broadcaster: Send + Sync {
    /// Enqueues `data` for batched broadcast to every replica.
    fn broadcast(
        &self,
        request_type: RequestType,
        seq: u64,
        current_view: u64,
        data: Vec<u8>,
    ) -> Result<(), NetError>;

    /// Sends `data` to a single node (replica or client), resolved by id.
    async fn send_message_to_node(
        &self,
        node_id: u32,
        request_type: RequestType,
        data: Vec<u8>,
    ) -> Result<(), NetError>;

    /// Sends an unsigned heartbeat to every peer, returning the success
    /// count.
    async fn send_heartbeat(&self, data: Vec<u8>) -> usize;

    /// Replaces the known client roster (spec §4.B).
    fn update_client_replicas(&self, clients: Vec<bft_types::ReplicaInfo>);
}

#[async_trait]
impl Broadcaster for ReplicaCommunicator {
    fn broadcast(
        &self,
        request_type: RequestType,
        seq: u64,
        current_view: u64,
        data: Vec<u8>,
    ) -> Result<(), NetError> {
        ReplicaCommunicator::broadcast(self, request_type, seq, current_view, data)
    }

    async fn send_message_to_node(
        &self,
        node_id: u32,
        request_type: RequestType,
        data: Vec<u8>,
    ) -> Result<(), NetError> {
        ReplicaCommunicator::send_message_to_node(self, node_id, request_type, data).await
    }

    async fn send_heartbeat(&self, data: Vec<u8>) -> usize {
        ReplicaCommunicator::send_heartbeat(self, data).await
    }

    fn update_client_replicas(&self, clients: Vec<bft_types::ReplicaInfo>) {
        ReplicaCommunicator::update_client_replicas(self, clients)
    }
}

/// A shared, dynamically-dispatched broadcaster handle.
pub type SharedBroadcaster = Arc<dyn Broadcaster>;

/// A `Broadcaster` double that records every call instead of touching the
/// network, used by this crate's own unit and integration tests.
#[cfg(any(test, feature = "test-util"))]
pub mod test_util {
    use super::{Broadcaster, NetError};
    use async_trait::async_trait;
    use bft_types::{ReplicaInfo, RequestType};
    use parking_lot::Mutex;

    /// One recorded `broadcast`/`send_message_to_node` call.
    #[derive(Debug, Clone)]
    pub struct RecordedSend {
        /// The message type sent.
        pub request_type: RequestType,
        /// The seq carried, if this was a `broadcast` call (`0` otherwise).
        pub seq: u64,
        /// The destination node id, for `send_message_to_node` calls only.
        pub node_id: Option<u32>,
        /// The raw payload.
        pub data: Vec<u8>,
    }

    /// Records every outbound call for later assertions; never fails.
    #[derive(Default)]
    pub struct RecordingBroadcaster {
        sends: Mutex<Vec<RecordedSend>>,
        heartbeats: Mutex<u32>,
    }

    impl RecordingBroadcaster {
        /// Creates an empty recorder.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// All calls recorded so far, in call order.
        #[must_use]
        pub fn sends(&self) -> Vec<RecordedSend> {
            self.sends.lock().clone()
        }

        /// Number of heartbeats sent.
        #[must_use]
        pub fn heartbeat_count(&self) -> u32 {
            *self.heartbeats.lock()
        }
    }

    #[async_trait]
    impl Broadcaster for RecordingBroadcaster {
        fn broadcast(
            &self,
            request_type: RequestType,
            seq: u64,
            _current_view: u64,
            data: Vec<u8>,
        ) -> Result<(), NetError> {
            self.sends.lock().push(RecordedSend {
                request_type,
                seq,
                node_id: None,
                data,
            });
            Ok(())
        }

        async fn send_message_to_node(
            &self,
            node_id: u32,
            request_type: RequestType,
            data: Vec<u8>,
        ) -> Result<(), NetError> {
            self.sends.lock().push(RecordedSend {
                request_type,
                seq: 0,
                node_id: Some(node_id),
                data,
            });
            Ok(())
        }

        async fn send_heartbeat(&self, _data: Vec<u8>) -> usize {
            *self.heartbeats.lock() += 1;
            0
        }

        fn update_client_replicas(&self, _clients: Vec<ReplicaInfo>) {}
    }
}
