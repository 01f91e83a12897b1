//! `ReplicaCommunicator`: fan-out to all replicas with a persistent
//! connection pool and batched broadcast (spec §4.B).
//!
//! Every frame this type puts on the wire — batched broadcast, a direct
//! `send_message`, or a heartbeat — is a [`BroadcastData`] bundle (one
//! envelope for the unbatched cases), so the receive side only ever needs
//! one decode path (`TcpChannel::parse_and_verify_bundle`) regardless of
//! which send path produced the frame.

use crate::channel::{Channel, TcpChannel};
use crate::error::{NetError, Result};
use bft_crypto::Verifier;
use bft_types::{BroadcastData, Envelope, Request, RequestType, ReplicaInfo};
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use parking_lot::RwLock;

/// How long the broadcast drain task waits to fill a batch before flushing
/// what it has (spec §4.B: "max wait ~10 ms").
const BATCH_DRAIN_WAIT: Duration = Duration::from_millis(10);

type PooledChannel = Arc<AsyncMutex<TcpChannel>>;

/// Owns a connection pool and a single broadcast-drain task, fanning
/// messages out to the configured replica roster (and, for heartbeats, the
/// known client roster too).
pub struct ReplicaCommunicator {
    self_id: u32,
    replicas: Vec<ReplicaInfo>,
    clients: RwLock<Vec<ReplicaInfo>>,
    pool: RwLock<HashMap<(String, u16), PooledChannel>>,
    verifier: Arc<dyn Verifier>,
    broadcast_tx: mpsc::UnboundedSender<Envelope>,
    send_failures: AtomicU64,
}

impl ReplicaCommunicator {
    /// Constructs a communicator for `self_id` and spawns its broadcast
    /// drain task. `tcp_batch_num` bounds how many queued envelopes get
    /// packed into one `BroadcastData` (spec §6.2).
    #[must_use]
    pub fn new(
        self_id: u32,
        replicas: Vec<ReplicaInfo>,
        verifier: Arc<dyn Verifier>,
        tcp_batch_num: usize,
    ) -> Arc<Self> {
        let (broadcast_tx, broadcast_rx) = mpsc::unbounded_channel();
        let communicator = Arc::new(Self {
            self_id,
            replicas,
            clients: RwLock::new(Vec::new()),
            pool: RwLock::new(HashMap::new()),
            verifier,
            broadcast_tx,
            send_failures: AtomicU64::new(0),
        });

        let drain_target = communicator.clone();
        tokio::spawn(async move {
            drain_target.run_broadcast_drain(broadcast_rx, tcp_batch_num).await;
        });

        communicator
    }

    /// Replaces the known client roster, used as additional broadcast
    /// destinations for heartbeats (spec §4.B).
    pub fn update_client_replicas(&self, clients: Vec<ReplicaInfo>) {
        *self.clients.write() = clients;
    }

    /// Count of per-peer send failures observed so far. Not propagated to
    /// callers of `broadcast` (spec §4.B error policy); exposed for
    /// `Stats`/observability.
    pub fn send_failure_count(&self) -> u64 {
        self.send_failures.load(Ordering::Relaxed)
    }

    /// Enqueues `msg` for batched broadcast to every replica. Returns as
    /// soon as the item is queued — per-peer delivery and ordering are the
    /// drain task's responsibility.
    ///
    /// # Errors
    ///
    /// Only fails if signing `msg` fails (e.g. no local key configured);
    /// never fails due to peer unavailability.
    pub fn broadcast(&self, request_type: RequestType, seq: u64, current_view: u64, data: Vec<u8>) -> Result<()> {
        let hash = self.verifier.calculate_hash(&data);
        let mut request = Request::new(request_type, self.self_id, data, hash);
        request.seq = seq;
        request.current_view = current_view;
        let data_signature = self.verifier.sign_message(&request.data).ok();
        request.data_signature = data_signature;

        let request_bytes = request
            .encode()
            .map_err(|e| NetError::TransportFailure(e.to_string()))?;
        let envelope_signature = self.verifier.sign_message(&request_bytes).ok();
        let envelope = Envelope::new(request_bytes, envelope_signature);

        self.broadcast_tx
            .send(envelope)
            .map_err(|_| NetError::Closed)
    }

    /// Sends `msg` to a single replica immediately, bypassing the batch
    /// queue (spec §4.B `send_message`).
    pub async fn send_message(
        &self,
        replica: &ReplicaInfo,
        request_type: RequestType,
        seq: u64,
        current_view: u64,
        data: Vec<u8>,
    ) -> Result<()> {
        let hash = self.verifier.calculate_hash(&data);
        let mut request = Request::new(request_type, self.self_id, data, hash);
        request.seq = seq;
        request.current_view = current_view;
        request.data_signature = self.verifier.sign_message(&request.data).ok();

        let bytes = self.encode_as_bundle(&request)?;
        self.send_bytes_to(replica, bytes).await
    }

    /// Resolves `node_id` over replicas ∪ clients and sends `msg` to it;
    /// drops silently if the id is unknown (spec §4.B).
    pub async fn send_message_to_node(
        &self,
        node_id: u32,
        request_type: RequestType,
        data: Vec<u8>,
    ) -> Result<()> {
        let target = self
            .replicas
            .iter()
            .chain(self.clients.read().iter())
            .find(|r| r.id == node_id)
            .cloned();

        let Some(target) = target else {
            return Err(NetError::UnknownNode(node_id));
        };

        self.send_message(&target, request_type, 0, 0, data).await
    }

    /// Sends an unsigned heartbeat directly (non-batched) to every replica
    /// and client, returning the number of successful deliveries so the
    /// membership layer can observe partitions (spec §4.B).
    pub async fn send_heartbeat(&self, data: Vec<u8>) -> usize {
        let request = Request::new(RequestType::HeartBeat, self.self_id, data, Vec::new());
        let Ok(request_bytes) = request.encode() else {
            return 0;
        };
        let envelope = Envelope::new(request_bytes, None);
        let bundle = BroadcastData::from_envelopes(vec![envelope]);
        let Ok(bytes) = bundle.encode() else {
            return 0;
        };

        let targets: Vec<ReplicaInfo> = self
            .replicas
            .iter()
            .cloned()
            .chain(self.clients.read().iter().cloned())
            .collect();

        let mut successes = 0;
        for target in &targets {
            if target.id == self.self_id {
                continue;
            }
            if self.send_bytes_to(target, Bytes::from(bytes.clone())).await.is_ok() {
                successes += 1;
            } else {
                self.send_failures.fetch_add(1, Ordering::Relaxed);
            }
        }
        successes
    }

    /// Wraps one `Request` in a single-envelope [`BroadcastData`] bundle —
    /// the same wire shape the batched broadcast drain produces — so every
    /// frame `ConsensusManager::process` reads off the wire, batched or not,
    /// decodes the same way (spec §4.B's direct `send_message` is unbatched
    /// in timing, not in framing).
    fn encode_as_bundle(&self, request: &Request) -> Result<Bytes> {
        let request_bytes = request
            .encode()
            .map_err(|e| NetError::TransportFailure(e.to_string()))?;
        let envelope_signature = self.verifier.sign_message(&request_bytes).ok();
        let envelope = Envelope::new(request_bytes, envelope_signature);
        let bundle = BroadcastData::from_envelopes(vec![envelope]);
        let bytes = bundle
            .encode()
            .map_err(|e| NetError::TransportFailure(e.to_string()))?;
        Ok(Bytes::from(bytes))
    }

    async fn channel_for(&self, target: &ReplicaInfo) -> PooledChannel {
        let key = (target.ip.clone(), target.port);
        if let Some(existing) = self.pool.read().get(&key).cloned() {
            return existing;
        }
        let entry = Arc::new(AsyncMutex::new(TcpChannel::new()));
        self.pool.write().insert(key, entry.clone());
        entry
    }

    async fn send_bytes_to(&self, target: &ReplicaInfo, bytes: Bytes) -> Result<()> {
        let channel = self.channel_for(target).await;
        let mut guard = channel.lock().await;
        if guard.get_binding_port().is_none() {
            guard.connect(&target.ip, target.port).await?;
        }
        match guard.send(bytes.clone()).await {
            Ok(()) => Ok(()),
            Err(_) => {
                // One reconnect-and-retry before giving up, mirroring the
                // channel-level retry of spec §4.A at the pool level.
                guard.connect(&target.ip, target.port).await?;
                guard.send(bytes).await
            }
        }
    }

    /// Single drain task: pops queued envelopes (waiting up to
    /// `BATCH_DRAIN_WAIT` to fill the batch), packs up to `tcp_batch_num`
    /// into one `BroadcastData`, and fans it out to every replica. Pinned to
    /// one task so per-peer FIFO ordering is preserved (spec §9).
    async fn run_broadcast_drain(
        self: Arc<Self>,
        mut rx: mpsc::UnboundedReceiver<Envelope>,
        tcp_batch_num: usize,
    ) {
        loop {
            let Some(first) = rx.recv().await else {
                return;
            };
            let mut batch = vec![first];

            let deadline = tokio::time::Instant::now() + BATCH_DRAIN_WAIT;
            while batch.len() < tcp_batch_num {
                let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
                if remaining.is_zero() {
                    break;
                }
                match tokio::time::timeout(remaining, rx.recv()).await {
                    Ok(Some(envelope)) => batch.push(envelope),
                    Ok(None) => break,
                    Err(_) => break,
                }
            }

            let bundle = BroadcastData::from_envelopes(batch);
            let Ok(bytes) = bundle.encode() else {
                continue;
            };
            let bytes = Bytes::from(bytes);

            for replica in &self.replicas {
                if replica.id == self.self_id {
                    continue;
                }
                if self.send_bytes_to(replica, bytes.clone()).await.is_err() {
                    self.send_failures.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bft_crypto::{InMemoryVerifier, Keypair};

    #[tokio::test]
    async fn broadcast_enqueue_does_not_block_on_unreachable_peers() {
        let replicas = vec![
            ReplicaInfo::new(1, "127.0.0.1", 19991),
            ReplicaInfo::new(2, "127.0.0.1", 19992),
        ];
        let verifier = Arc::new(InMemoryVerifier::with_signing_key(1, Keypair::generate()));
        let comm = ReplicaCommunicator::new(1, replicas, verifier, 10);

        // Neither peer is listening; broadcast must still return quickly
        // because delivery failures are swallowed, not propagated.
        comm.broadcast(RequestType::PrePrepare, 1, 0, b"batch".to_vec())
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(comm.send_failure_count() >= 1);
    }

    #[tokio::test]
    async fn send_message_to_unknown_node_errors() {
        let verifier = Arc::new(InMemoryVerifier::verify_only());
        let comm = ReplicaCommunicator::new(1, vec![], verifier, 10);
        let result = comm
            .send_message_to_node(42, RequestType::Commit, vec![])
            .await;
        assert!(matches!(result, Err(NetError::UnknownNode(42))));
    }
}
