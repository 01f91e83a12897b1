//! `ConsensusManager` (spec §4.J): the dispatcher that turns raw inbound
//! bytes into calls on `Commitment`/`PerformanceManager`, and the membership
//! heartbeat loop that bootstraps `is_ready` and the public-key store.
//!
//! Grounded on `examples/original_source/platform/networkstrate/consensus_manager.{h,cpp}`
//! for the overall shape (a single `process(ctx, buf)` entry point that type-
//! switches on the decoded request, plus a background heartbeat thread) —
//! the type-based dispatch itself follows the `RequestType` match idiom
//! established by `commitment::Commitment::process`.

use crate::broadcaster::SharedBroadcaster;
use crate::commitment::CommitmentHandle;
use crate::error::{ConsensusError, Result};
use crate::response::{PerformanceManager, ResponseManager};
use crate::stats::Stats;
use crate::system_info::SystemInfo;
use bft_crypto::Verifier;
use bft_net::{NetError, TcpChannel};
use bft_types::{BatchUserRequest, HeartBeatInfo, NodeType, PublicKeyInfo, ReplicaInfo, Request, RequestType};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Type-based message dispatcher and membership heartbeat driver for one
/// replica or client process (spec §4.J).
///
/// `performance_manager` is only set on a client-role process: a replica
/// never expects to receive `Response` messages (those go to the client
/// that submitted the batch), so it is left `None` there.
///
/// `response_manager` is the inverse: only set on a replica-role process,
/// where raw `ClientRequest` messages need inbound batching before they can
/// become a `NewTxns` proposal (spec §4.I). A client-role process is itself
/// the one assembling batches (via `performance_manager`), so it never needs
/// one.
pub struct ConsensusManager {
    self_id: u32,
    self_ip: String,
    self_port: u16,
    self_region: u32,
    self_public_key: Vec<u8>,
    self_node_type: NodeType,
    verifier_enabled: bool,
    verifier: Arc<dyn Verifier>,
    system_info: Arc<SystemInfo>,
    commitment: Arc<dyn CommitmentHandle>,
    performance_manager: Option<Arc<PerformanceManager>>,
    response_manager: Option<Arc<ResponseManager>>,
    broadcaster: SharedBroadcaster,
    stats: Arc<Stats>,
    min_data_receive_num: usize,
    hb_version: AtomicU64,
    client_roster: Mutex<Vec<ReplicaInfo>>,
}

/// Construction parameters for [`ConsensusManager::new`], grouped because the
/// constructor otherwise carries more positional arguments than a reader can
/// keep straight.
pub struct ConsensusManagerConfig {
    /// This node's own replica id.
    pub self_id: u32,
    /// This node's own advertised ip.
    pub self_ip: String,
    /// This node's own advertised port.
    pub self_port: u16,
    /// Region tag used to scope replica-roster admission (spec §4.J).
    pub self_region: u32,
    /// This node's own raw Ed25519 public key bytes, distributed via
    /// heartbeat.
    pub self_public_key: Vec<u8>,
    /// Whether inbound envelopes/requests are signature-checked.
    pub verifier_enabled: bool,
    /// Number of distinct replica keys required before `is_ready` flips
    /// (spec default `2f + 1`).
    pub min_data_receive_num: usize,
}

impl ConsensusManager {
    /// Builds a dispatcher. `performance_manager` should be `None` for a
    /// replica-role process and `Some` for a client-role process that
    /// expects `Response` messages.
    #[must_use]
    pub fn new(
        config: ConsensusManagerConfig,
        verifier: Arc<dyn Verifier>,
        system_info: Arc<SystemInfo>,
        commitment: Arc<dyn CommitmentHandle>,
        performance_manager: Option<Arc<PerformanceManager>>,
        response_manager: Option<Arc<ResponseManager>>,
        broadcaster: SharedBroadcaster,
        stats: Arc<Stats>,
    ) -> Self {
        let self_node_type = if performance_manager.is_some() {
            NodeType::Client
        } else {
            NodeType::Replica
        };
        Self {
            self_id: config.self_id,
            self_ip: config.self_ip,
            self_port: config.self_port,
            self_region: config.self_region,
            self_public_key: config.self_public_key,
            self_node_type,
            verifier_enabled: config.verifier_enabled,
            verifier,
            system_info,
            commitment,
            performance_manager,
            response_manager,
            broadcaster,
            stats,
            min_data_receive_num: config.min_data_receive_num,
            hb_version: AtomicU64::new(0),
            client_roster: Mutex::new(Vec::new()),
        }
    }

    /// Whether this process has observed enough peers to consider itself
    /// ready. An observability signal, not a gate: `process` runs the same
    /// either way (spec §4.J).
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.stats.is_ready()
    }

    /// Entry point for one raw inbound frame (spec §4.J `process(ctx, buf)`).
    /// Every frame `ReplicaCommunicator` sends — batched broadcast, a direct
    /// `send_message`, or a heartbeat — is a `BroadcastData` bundle (spec
    /// §4.B), so this always unpacks one or more envelopes and dispatches
    /// each independently: one envelope's bad signature or unknown type
    /// drops only that message (spec §7 "the dispatcher maps unknown or
    /// unexpected errors to a counter increment and continues"), it does not
    /// poison the rest of the bundle. The first error encountered (if any)
    /// is still returned to the caller for its own stats/logging, matching
    /// this method's single-request-era contract for the common case of a
    /// one-envelope bundle.
    pub async fn process(&self, raw: &[u8]) -> Result<()> {
        let verifier_ref: Option<&dyn Verifier> = if self.verifier_enabled {
            Some(self.verifier.as_ref())
        } else {
            None
        };
        let outcomes = TcpChannel::parse_and_verify_bundle(verifier_ref, raw).map_err(|e| match e {
            NetError::InvalidSignature => ConsensusError::InvalidSignature,
            other => ConsensusError::TransportFailure(other.to_string()),
        })?;

        let mut first_err = None;
        for outcome in outcomes {
            let result = match outcome {
                Ok(request) => self.dispatch(request).await,
                Err(NetError::InvalidSignature) => Err(ConsensusError::InvalidSignature),
                Err(other) => Err(ConsensusError::TransportFailure(other.to_string())),
            };
            if let Err(e) = result {
                if first_err.is_none() {
                    first_err = Some(e);
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn dispatch(&self, request: Request) -> Result<()> {
        match request.request_type {
            RequestType::HeartBeat => self.handle_heartbeat(request),
            RequestType::NewTxns => {
                let batch = BatchUserRequest::decode(&request.data)
                    .map_err(|e| ConsensusError::TransportFailure(e.to_string()))?;
                self.commitment.process_new_user_request(batch).await
            }
            RequestType::ClientRequest => match &self.response_manager {
                Some(response_manager) => response_manager.submit_raw_request(request),
                None => {
                    tracing::warn!(
                        sender = request.sender_id,
                        "raw client request received with no response manager configured, dropping"
                    );
                    Ok(())
                }
            },
            RequestType::PrePrepare | RequestType::Prepare | RequestType::Commit => {
                self.commitment.process(request).await
            }
            RequestType::Response => {
                if let Some(performance_manager) = &self.performance_manager {
                    performance_manager.record_reply_bytes(request.sender_id, &request.data)?;
                }
                Ok(())
            }
            RequestType::ViewChange | RequestType::NewView => {
                tracing::warn!(
                    request_type = ?request.request_type,
                    sender = request.sender_id,
                    "view-change message type received; reserved stub handler, dropping"
                );
                Ok(())
            }
            RequestType::CustomConsensus => {
                tracing::debug!(sender = request.sender_id, "custom consensus extension message dropped: no handler registered");
                Ok(())
            }
        }
    }

    /// Admits public keys and roster entries from an incoming heartbeat,
    /// then re-checks the `is_ready` threshold (spec §4.J "HeartBeat
    /// handler"). Malformed keys are rejected individually, never fatal to
    /// the whole heartbeat.
    fn handle_heartbeat(&self, request: Request) -> Result<()> {
        let info: HeartBeatInfo = match bincode::deserialize(&request.data) {
            Ok(info) => info,
            Err(e) => {
                tracing::warn!(error = %e, "malformed heartbeat payload, dropping");
                return Ok(());
            }
        };

        let mut client_roster_changed = false;
        for key in &info.public_keys {
            if !self.verifier.add_public_key(key) {
                tracing::debug!(node_id = key.node_id, "rejected malformed or duplicate heartbeat public key");
                continue;
            }
            if key.region != self.self_region {
                continue;
            }
            match key.node_type {
                NodeType::Replica if !key.ip.is_empty() => {
                    self.system_info
                        .add_replica(ReplicaInfo::new(key.node_id, key.ip.clone(), key.port));
                }
                NodeType::Client => {
                    let mut clients = self.client_roster.lock();
                    if !clients.iter().any(|c| c.id == key.node_id) {
                        clients.push(ReplicaInfo::new(key.node_id, key.ip.clone(), key.port));
                        client_roster_changed = true;
                    }
                }
                _ => {}
            }
        }

        if client_roster_changed {
            // Clients learn the current primary/view through the regular
            // heartbeat loop broadcast, which now reaches them too; no
            // separate per-sender echo is needed (spec §4.J).
            self.broadcaster.update_client_replicas(self.client_roster.lock().clone());
        }

        if self.system_info.replica_count() >= self.min_data_receive_num {
            self.stats.set_ready(true);
        }

        Ok(())
    }

    fn own_heartbeat_payload(&self) -> Option<Vec<u8>> {
        let public_keys = vec![PublicKeyInfo {
            node_id: self.self_id,
            node_type: self.self_node_type,
            region: self.self_region,
            ip: self.self_ip.clone(),
            port: self.self_port,
            key_bytes: self.self_public_key.clone(),
        }];
        let hb_version = self.hb_version.fetch_add(1, Ordering::Relaxed) + 1;
        let info = HeartBeatInfo {
            sender: self.self_id,
            ip: self.self_ip.clone(),
            port: self.self_port,
            primary: self.system_info.primary_id(),
            version: self.system_info.view(),
            public_keys,
            hb_version,
            node_version: Vec::new(),
        };
        bincode::serialize(&info).ok()
    }

    async fn heartbeat_round(&self) {
        let Some(bytes) = self.own_heartbeat_payload() else {
            tracing::warn!("failed to encode own heartbeat payload, skipping round");
            return;
        };
        let sent = self.broadcaster.send_heartbeat(bytes).await;
        tracing::debug!(sent, "heartbeat round complete");
    }

    /// Spawns the heartbeat loop task: the first round fires immediately,
    /// every later round after `interval` (spec §4.J: 60s default, 1s in
    /// test mode). Runs until its `Arc` is dropped and the last clone exits.
    pub fn spawn_heartbeat_loop(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                self.heartbeat_round().await;
                tokio::time::sleep(interval).await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcaster::test_util::RecordingBroadcaster;
    use crate::collector_pool::CollectorPool;
    use crate::commitment::Commitment;
    use crate::duplicate_manager::DuplicateManager;
    use bft_crypto::{InMemoryVerifier, Keypair};
    use bft_types::{Envelope, HashType, SignatureInfo};
    use tokio::sync::mpsc::unbounded_channel;

    fn make_manager(min_data_receive_num: usize) -> (Arc<ConsensusManager>, Arc<RecordingBroadcaster>) {
        let broadcaster = Arc::new(RecordingBroadcaster::new());
        let system_info = Arc::new(SystemInfo::new(vec![ReplicaInfo::new(1, "127.0.0.1", 9001)], 1));
        let pool = Arc::new(CollectorPool::new(64));
        let duplicate_manager = DuplicateManager::with_defaults();
        let verifier: Arc<dyn Verifier> = Arc::new(InMemoryVerifier::with_signing_key(1, Keypair::generate()));
        let stats = Arc::new(Stats::new());
        let next_execute_seq = Arc::new(AtomicU64::new(1));
        let (executor_tx, _executor_rx) = unbounded_channel();
        let commitment: Arc<dyn CommitmentHandle> = Arc::new(Commitment::new(
            1,
            1,
            64,
            broadcaster.clone(),
            system_info.clone(),
            pool,
            duplicate_manager,
            verifier.clone(),
            stats.clone(),
            next_execute_seq,
            executor_tx,
        ));
        let config = ConsensusManagerConfig {
            self_id: 1,
            self_ip: "127.0.0.1".into(),
            self_port: 9001,
            self_region: 0,
            self_public_key: vec![1; 32],
            verifier_enabled: false,
            min_data_receive_num,
        };
        let manager = Arc::new(ConsensusManager::new(
            config,
            verifier,
            system_info,
            commitment,
            None,
            None,
            broadcaster.clone(),
            stats,
        ));
        (manager, broadcaster)
    }

    fn heartbeat_request(info: HeartBeatInfo) -> Request {
        let data = bincode::serialize(&info).unwrap();
        Request::new(RequestType::HeartBeat, info.sender, data, Vec::new())
    }

    fn key_info(node_id: u32, node_type: NodeType, region: u32, ip: &str, port: u16) -> PublicKeyInfo {
        let key = Keypair::generate().public_key_bytes().to_vec();
        PublicKeyInfo {
            node_id,
            node_type,
            region,
            ip: ip.into(),
            port,
            key_bytes: key,
        }
    }

    #[tokio::test]
    async fn heartbeat_admits_same_region_replica_and_flips_ready() {
        let (manager, _broadcaster) = make_manager(2);
        let info = HeartBeatInfo {
            sender: 2,
            ip: "127.0.0.1".into(),
            port: 9002,
            primary: 1,
            version: 1,
            public_keys: vec![key_info(2, NodeType::Replica, 0, "127.0.0.1", 9002)],
            hb_version: 1,
            node_version: vec![],
        };
        manager.dispatch(heartbeat_request(info)).await.unwrap();
        assert_eq!(manager.system_info.replica_count(), 2);
        assert!(manager.is_ready());
    }

    #[tokio::test]
    async fn heartbeat_ignores_other_region_replica() {
        let (manager, _broadcaster) = make_manager(2);
        let info = HeartBeatInfo {
            sender: 3,
            ip: "127.0.0.1".into(),
            port: 9003,
            primary: 1,
            version: 1,
            public_keys: vec![key_info(3, NodeType::Replica, 9, "127.0.0.1", 9003)],
            hb_version: 1,
            node_version: vec![],
        };
        manager.dispatch(heartbeat_request(info)).await.unwrap();
        assert_eq!(manager.system_info.replica_count(), 1);
        assert!(!manager.is_ready());
    }

    #[tokio::test]
    async fn heartbeat_admits_client_into_client_roster_and_updates_broadcaster() {
        let (manager, broadcaster) = make_manager(1);
        let info = HeartBeatInfo {
            sender: 50,
            ip: "127.0.0.1".into(),
            port: 9050,
            primary: 1,
            version: 1,
            public_keys: vec![key_info(50, NodeType::Client, 0, "127.0.0.1", 9050)],
            hb_version: 1,
            node_version: vec![],
        };
        manager.dispatch(heartbeat_request(info)).await.unwrap();
        assert_eq!(manager.client_roster.lock().len(), 1);
        assert_eq!(broadcaster.heartbeat_count(), 0);
    }

    #[tokio::test]
    async fn client_request_with_no_response_manager_is_dropped_without_error() {
        let (manager, _broadcaster) = make_manager(1);
        let request = Request::new(RequestType::ClientRequest, 7, b"raw".to_vec(), vec![]);
        manager.dispatch(request).await.unwrap();
    }

    #[tokio::test]
    async fn client_request_is_handed_to_response_manager_for_batching() {
        let broadcaster = Arc::new(RecordingBroadcaster::new());
        let system_info = Arc::new(SystemInfo::new(vec![ReplicaInfo::new(1, "127.0.0.1", 9001)], 1));
        let pool = Arc::new(CollectorPool::new(64));
        let duplicate_manager = DuplicateManager::with_defaults();
        let verifier: Arc<dyn Verifier> = Arc::new(InMemoryVerifier::with_signing_key(1, Keypair::generate()));
        let stats = Arc::new(Stats::new());
        let next_execute_seq = Arc::new(AtomicU64::new(1));
        let (executor_tx, _executor_rx) = unbounded_channel();
        let commitment: Arc<dyn CommitmentHandle> = Arc::new(Commitment::new(
            1,
            1,
            64,
            broadcaster.clone(),
            system_info.clone(),
            pool,
            duplicate_manager,
            verifier.clone(),
            stats.clone(),
            next_execute_seq,
            executor_tx,
        ));
        let (response_manager, intake_rx) = ResponseManager::new(
            broadcaster.clone(),
            stats.clone(),
            system_info.clone(),
            10,
            Duration::from_millis(50),
            64,
        );
        let config = ConsensusManagerConfig {
            self_id: 1,
            self_ip: "127.0.0.1".into(),
            self_port: 9001,
            self_region: 0,
            self_public_key: vec![1; 32],
            verifier_enabled: false,
            min_data_receive_num: 1,
        };
        let manager = ConsensusManager::new(
            config,
            verifier,
            system_info,
            commitment,
            None,
            Some(response_manager),
            broadcaster,
            stats,
        );

        let request = Request::new(RequestType::ClientRequest, 7, b"raw".to_vec(), vec![]);
        manager.dispatch(request).await.unwrap();

        let mut intake_rx = intake_rx;
        let forwarded = intake_rx.try_recv().expect("client request should reach the intake channel");
        assert_eq!(forwarded.sender_id, 7);
        assert_eq!(forwarded.data, b"raw".to_vec());
    }

    #[tokio::test]
    async fn view_change_and_new_view_are_dropped_without_error() {
        let (manager, _broadcaster) = make_manager(1);
        let view_change = Request::new(RequestType::ViewChange, 2, vec![], vec![]);
        let new_view = Request::new(RequestType::NewView, 2, vec![], vec![]);
        manager.dispatch(view_change).await.unwrap();
        manager.dispatch(new_view).await.unwrap();
    }

    #[tokio::test]
    async fn custom_consensus_is_dropped_without_error() {
        let (manager, _broadcaster) = make_manager(1);
        let request = Request::new(RequestType::CustomConsensus, 2, vec![], vec![]);
        manager.dispatch(request).await.unwrap();
    }

    #[tokio::test]
    async fn process_rejects_envelope_with_bad_signature_when_verification_enabled() {
        let broadcaster = Arc::new(RecordingBroadcaster::new());
        let system_info = Arc::new(SystemInfo::new(vec![ReplicaInfo::new(1, "127.0.0.1", 9001)], 1));
        let pool = Arc::new(CollectorPool::new(64));
        let duplicate_manager = DuplicateManager::with_defaults();
        let verifier: Arc<dyn Verifier> = Arc::new(InMemoryVerifier::with_signing_key(1, Keypair::generate()));
        let stats = Arc::new(Stats::new());
        let next_execute_seq = Arc::new(AtomicU64::new(1));
        let (executor_tx, _executor_rx) = unbounded_channel();
        let commitment: Arc<dyn CommitmentHandle> = Arc::new(Commitment::new(
            1,
            1,
            64,
            broadcaster.clone(),
            system_info.clone(),
            pool,
            duplicate_manager,
            verifier.clone(),
            stats.clone(),
            next_execute_seq,
            executor_tx,
        ));
        let config = ConsensusManagerConfig {
            self_id: 1,
            self_ip: "127.0.0.1".into(),
            self_port: 9001,
            self_region: 0,
            self_public_key: vec![1; 32],
            verifier_enabled: true,
            min_data_receive_num: 1,
        };
        let manager = ConsensusManager::new(config, verifier, system_info, commitment, None, None, broadcaster, stats);

        let request = Request::new(RequestType::Commit, 2, vec![], vec![]);
        let data = request.encode().unwrap();
        let bad_sig = SignatureInfo::new(vec![0; 64], 2, HashType::Sha256);
        let envelope = Envelope::new(data, Some(bad_sig));
        let bundle = bft_types::BroadcastData::from_envelopes(vec![envelope]);
        let raw = bundle.encode().unwrap();

        let result = manager.process(&raw).await;
        assert!(matches!(result, Err(ConsensusError::InvalidSignature)));
    }

    #[tokio::test]
    async fn process_dispatches_every_envelope_in_a_bundle_independently() {
        let (manager, _broadcaster) = make_manager(1);

        let good = Request::new(RequestType::CustomConsensus, 2, vec![], vec![]);
        let good_envelope = Envelope::new(good.encode().unwrap(), None);
        let bad = Request::new(RequestType::CustomConsensus, 3, vec![], vec![]);
        let bad_envelope = Envelope::new(bad.encode().unwrap(), None);
        let bundle = bft_types::BroadcastData::from_envelopes(vec![good_envelope, bad_envelope]);
        let raw = bundle.encode().unwrap();

        // verifier_enabled is false in make_manager, so both envelopes parse
        // fine; this only checks that a two-envelope bundle dispatches both
        // messages instead of stopping after the first.
        let result = manager.process(&raw).await;
        assert!(result.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_loop_fires_immediately_then_on_interval() {
        let (manager, broadcaster) = make_manager(1);
        let handle = manager.spawn_heartbeat_loop(Duration::from_millis(100));

        tokio::task::yield_now().await;
        assert_eq!(broadcaster.heartbeat_count(), 1);

        tokio::time::advance(Duration::from_millis(110)).await;
        tokio::task::yield_now().await;
        assert_eq!(broadcaster.heartbeat_count(), 2);

        handle.abort();
    }
}
