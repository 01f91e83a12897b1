//! `Commitment` (spec §4.G): the primary-backup three-phase commit state
//! machine. Drives pre-prepare → prepare → commit over each seq, validating
//! and forwarding votes, and hands the result to the executor (spec §4.H)
//! once a seq reaches `ReadyExecute`.
//!
//! Grounded on
//! `examples/original_source/platform/consensus/ordering/common/commitment_basic.{h,cpp}`
//! for the overall shape (a post-process thread that ships executed
//! responses, a `PrimaryId`/`id_` pair, a `verifier_` dependency) — adapted
//! to the generalized, non-MAC-specific three-phase flow of spec §4.G.

use crate::broadcaster::SharedBroadcaster;
use crate::collector::{CollectorStatus, VoteType};
use crate::collector_pool::CollectorPool;
use crate::duplicate_manager::DuplicateManager;
use crate::error::{ConsensusError, Result};
use crate::stats::Stats;
use crate::system_info::SystemInfo;
use async_trait::async_trait;
use bft_crypto::Verifier;
use bft_types::{BatchUserRequest, BatchUserResponse, Request, RequestType, SignatureInfo};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// A seq that reached `ReadyExecute`: the agreed-upon request plus its
/// quorum certificate, handed to the executor for in-order execution.
#[derive(Debug, Clone)]
pub struct CommittedMessage {
    /// The committed `PrePrepare` request (carries the batched user data).
    pub request: Request,
    /// The `2f+1` Commit signatures attesting to this seq/hash pair.
    pub certs: Vec<SignatureInfo>,
}

/// Entry point any dispatcher-level caller uses to hand a decoded `Request`
/// or a freshly-batched client request into the three-phase pipeline,
/// without needing to know `Commitment`'s generic broadcaster type. Narrows
/// the capability surface `ResponseManager`/`ConsensusManager` depend on,
/// per spec §9's cyclic-reference note.
#[async_trait]
pub trait CommitmentHandle: Send + Sync {
    /// Entry point for a freshly-batched client request (spec §4.G "Start
    /// flow"). If this replica is primary, assigns the next seq and starts
    /// a pre-prepare; otherwise forwards it to the primary.
    async fn process_new_user_request(&self, request: BatchUserRequest) -> Result<()>;

    /// Entry point for an incoming `PrePrepare`/`Prepare`/`Commit` message.
    async fn process(&self, request: Request) -> Result<()>;
}

/// The three-phase commit orchestrator for one replica.
pub struct Commitment {
    self_id: u32,
    quorum: usize,
    broadcaster: SharedBroadcaster,
    system_info: Arc<SystemInfo>,
    pool: Arc<CollectorPool>,
    duplicate_manager: Arc<DuplicateManager>,
    verifier: Arc<dyn Verifier>,
    stats: Arc<Stats>,
    next_seq: AtomicU64,
    next_execute_seq: Arc<AtomicU64>,
    window: u64,
    executor_tx: mpsc::UnboundedSender<CommittedMessage>,
}

impl Commitment {
    /// Constructs a `Commitment` for `self_id`. `next_execute_seq` is a
    /// shared capability handle with the executor (spec §4.H): the executor
    /// owns writes to it as it retires seqs, `Commitment` only reads it for
    /// window back-pressure. `executor_tx` is the hand-off channel to the
    /// executor's ordering task.
    #[must_use]
    pub fn new(
        self_id: u32,
        quorum: usize,
        window: u64,
        broadcaster: SharedBroadcaster,
        system_info: Arc<SystemInfo>,
        pool: Arc<CollectorPool>,
        duplicate_manager: Arc<DuplicateManager>,
        verifier: Arc<dyn Verifier>,
        stats: Arc<Stats>,
        next_execute_seq: Arc<AtomicU64>,
        executor_tx: mpsc::UnboundedSender<CommittedMessage>,
    ) -> Self {
        Self {
            self_id,
            quorum,
            broadcaster,
            system_info,
            pool,
            duplicate_manager,
            verifier,
            stats,
            next_seq: AtomicU64::new(1),
            next_execute_seq,
            window,
            executor_tx,
        }
    }

    /// Whether this replica is primary for the current view.
    #[must_use]
    pub fn is_primary(&self) -> bool {
        self.system_info.is_primary(self.self_id)
    }

    /// Rewinds proposal assignment back to the last confirmed execution
    /// watermark, discarding any seq this replica had reserved but not yet
    /// seen committed. A stub hook for an eventual view-change controller
    /// (spec §9): the collectors for the discarded seqs are not explicitly
    /// torn down here, but `CollectorPool::get` already reconstructs any
    /// slot whose remembered seq has gone stale, so the next primary's
    /// proposals land on a clean collector regardless.
    pub fn reset_view(&self) {
        self.next_seq.store(self.next_execute_seq(), Ordering::Release);
    }

    fn next_execute_seq(&self) -> u64 {
        self.next_execute_seq.load(Ordering::Acquire)
    }

    /// Reserves the next seq for a new pre-prepare, or refuses if the
    /// in-flight window is full (spec §4.G step 1, §4.H back-pressure:
    /// `next_seq − max_pending_executed_seq > W`).
    fn assign_next_seq(&self) -> Result<u64> {
        let candidate = self.next_seq.load(Ordering::Acquire);
        if candidate.saturating_sub(self.next_execute_seq()) >= self.window {
            self.stats.seq_fail.fetch_add(1, Ordering::Relaxed);
            return Err(ConsensusError::WindowFull);
        }
        // Single primary thread assigns seqs; a plain fetch_add is race-free
        // for this process's own proposals and matches the monotonic
        // per-view counter of spec §3.
        let seq = self.next_seq.fetch_add(1, Ordering::AcqRel);
        Ok(seq)
    }

    fn classify_seq(&self, seq: u64) -> Result<()> {
        let next_execute = self.next_execute_seq();
        if seq < next_execute {
            return Err(ConsensusError::OutOfWindow(seq));
        }
        if seq >= next_execute + self.window {
            return Err(ConsensusError::BeyondWindow(seq));
        }
        Ok(())
    }

    /// Sends a `ret = -2` response straight back to the submitting proxy
    /// when the in-flight window is full (spec §7, scenario E5): no seq was
    /// ever assigned, so there is nothing for the executor to retire and no
    /// PrePrepare is broadcast. Best-effort: a transport failure here is
    /// logged, not propagated, since the caller already has a `WindowFull`
    /// to report.
    async fn send_window_full_response(&self, request: &BatchUserRequest) {
        let response = BatchUserResponse {
            seq: 0,
            proxy_id: request.proxy_id,
            local_id: request.local_id,
            createtime: request.createtime,
            hash: request.hash.clone(),
            responses: Vec::new(),
            ret: -2,
        };
        let payload = match response.encode() {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(local_id = request.local_id, error = %e, "failed to encode window-full response");
                return;
            }
        };
        if let Err(e) = self
            .broadcaster
            .send_message_to_node(request.proxy_id, RequestType::Response, payload)
            .await
        {
            tracing::warn!(local_id = request.local_id, proxy_id = request.proxy_id, error = %e, "failed to deliver window-full response to proxy");
        }
    }

    fn check_view(&self, request_view: u64) -> Result<()> {
        let local_view = self.system_info.view();
        if request_view != local_view {
            return Err(ConsensusError::ViewMismatch {
                message_view: request_view,
                local_view,
            });
        }
        Ok(())
    }

    /// Builds a locally-signed stand-in vote record, used only to feed a
    /// node's own implicit vote into [`TransactionCollector::add_vote`] —
    /// every replica that advances a collector's phase votes for itself the
    /// same way a peer's network message would, since `ReplicaCommunicator`
    /// never loops a broadcast back to its own sender (spec §4.B).
    fn self_signed_vote(&self, request_type: RequestType, hash: &[u8]) -> Request {
        let mut req = Request::new(request_type, self.self_id, Vec::new(), Vec::new());
        req.data_signature = self.verifier.sign_message(hash).ok();
        req
    }

    fn broadcast_vote(&self, request_type: RequestType, seq: u64, hash: Vec<u8>) -> Result<()> {
        self.broadcaster
            .broadcast(request_type, seq, self.system_info.view(), hash)
            .map_err(|e| ConsensusError::TransportFailure(e.to_string()))
    }

    /// Records a Prepare vote and, on reaching quorum with a main present,
    /// transitions to `ReadyCommit`, broadcasts a `Commit`, and folds in this
    /// replica's own Commit vote the same way (spec §4.G "Prepare
    /// accumulation"). Shared by the network-vote and self-vote paths.
    fn apply_prepare_vote(
        &self,
        collector: &Arc<crate::collector::TransactionCollector>,
        seq: u64,
        sender: u32,
        vote: &Request,
    ) -> Result<()> {
        let Some(count) = collector.add_vote(VoteType::Prepare, sender, vote) else {
            return Ok(());
        };
        if count < self.quorum || !collector.has_main() {
            return Ok(());
        }
        let Some(hash) = collector.main_hash() else {
            return Ok(());
        };
        if !collector.try_advance(CollectorStatus::ReadyPrepare, CollectorStatus::ReadyCommit) {
            return Ok(());
        }
        self.broadcast_vote(RequestType::Commit, seq, hash.clone())?;
        let self_vote = self.self_signed_vote(RequestType::Commit, &hash);
        self.apply_commit_vote(collector, seq, self.self_id, &self_vote)
    }

    /// Records a Commit vote and, on reaching quorum, transitions to
    /// `ReadyExecute` and hands the committed message off to the executor
    /// (spec §4.G "Commit accumulation").
    fn apply_commit_vote(
        &self,
        collector: &Arc<crate::collector::TransactionCollector>,
        _seq: u64,
        sender: u32,
        vote: &Request,
    ) -> Result<()> {
        let Some(count) = collector.add_vote(VoteType::Commit, sender, vote) else {
            return Ok(());
        };
        if count < self.quorum {
            return Ok(());
        }
        if !collector.try_advance(CollectorStatus::ReadyCommit, CollectorStatus::ReadyExecute) {
            return Ok(());
        }
        let Some(main) = collector.main_request() else {
            // Commit quorum reached before the pre-prepare arrived locally;
            // a retransmitted PrePrepare will observe the already-advanced
            // collector and no-op. Nothing to execute yet.
            return Ok(());
        };
        let certs = collector.committed_certs();
        self.stats.commit.fetch_add(1, Ordering::Relaxed);
        let _ = self.executor_tx.send(CommittedMessage {
            request: main,
            certs,
        });
        collector.try_advance(CollectorStatus::ReadyExecute, CollectorStatus::Executed);
        Ok(())
    }

    /// Handles a `PrePrepare` (from self-as-primary or a peer): validates,
    /// inserts into the collector as main, and on transition to
    /// `ReadyPrepare` broadcasts a `Prepare` and folds in this replica's own
    /// Prepare vote (spec §4.G "Replica flow on PrePrepare").
    async fn handle_pre_prepare(&self, request: Request) -> Result<()> {
        self.check_view(request.current_view)?;
        let expected_primary = self.system_info.primary_id();
        if request.sender_id != expected_primary {
            return Err(ConsensusError::NotLeader(self.system_info.view()));
        }
        self.classify_seq(request.seq)?;

        if self.duplicate_manager.check_and_add_proposed(&request.hash) {
            return Err(ConsensusError::DuplicateProposal);
        }

        let collector = self.pool.get(request.seq);
        if collector.is_executed() {
            return Err(ConsensusError::AlreadyExecuted(request.seq));
        }
        let seq = request.seq;
        let hash = request.hash.clone();
        if collector.set_main(request).is_some()
            && collector.try_advance(CollectorStatus::None, CollectorStatus::ReadyPrepare)
        {
            self.broadcast_vote(RequestType::Prepare, seq, hash.clone())?;
            let self_vote = self.self_signed_vote(RequestType::Prepare, &hash);
            self.apply_prepare_vote(&collector, seq, self.self_id, &self_vote)?;
        }
        Ok(())
    }

    /// Handles a `Prepare` vote from a peer: checks it agrees with the
    /// stored main hash (carried in `request.data`, since the wire `Request`
    /// built by `Broadcaster::broadcast` stamps `request.hash` with a hash of
    /// the vote payload itself, not the original batch digest) before
    /// recording it.
    async fn handle_prepare(&self, request: Request) -> Result<()> {
        self.check_view(request.current_view)?;
        self.classify_seq(request.seq)?;

        let collector = self.pool.get(request.seq);
        if collector.is_executed() {
            return Err(ConsensusError::AlreadyExecuted(request.seq));
        }
        if let Some(main_hash) = collector.main_hash() {
            if main_hash != request.data {
                return Err(ConsensusError::HashMismatch(request.seq));
            }
        }

        let seq = request.seq;
        let sender = request.sender_id;
        self.apply_prepare_vote(&collector, seq, sender, &request)
    }

    /// Handles a `Commit` vote from a peer (spec §4.G "Commit
    /// accumulation").
    async fn handle_commit(&self, request: Request) -> Result<()> {
        self.check_view(request.current_view)?;
        self.classify_seq(request.seq)?;

        let collector = self.pool.get(request.seq);
        if collector.is_executed() {
            return Err(ConsensusError::AlreadyExecuted(request.seq));
        }

        let seq = request.seq;
        let sender = request.sender_id;
        self.apply_commit_vote(&collector, seq, sender, &request)
    }
}

#[async_trait]
impl CommitmentHandle for Commitment {
    async fn process_new_user_request(&self, request: BatchUserRequest) -> Result<()> {
        if !self.is_primary() {
            let payload = request
                .encode()
                .map_err(|e| ConsensusError::TransportFailure(e.to_string()))?;
            self.broadcaster
                .send_message_to_node(self.system_info.primary_id(), RequestType::NewTxns, payload)
                .await
                .map_err(|e| ConsensusError::TransportFailure(e.to_string()))?;
            return Ok(());
        }

        let seq = match self.assign_next_seq() {
            Ok(seq) => seq,
            Err(ConsensusError::WindowFull) => {
                self.send_window_full_response(&request).await;
                return Err(ConsensusError::BeyondWindow(0));
            }
            Err(e) => return Err(e),
        };

        let payload = request
            .encode()
            .map_err(|e| ConsensusError::TransportFailure(e.to_string()))?;
        let hash = self.verifier.calculate_hash(&payload);

        if self.duplicate_manager.check_and_add_proposed(&hash) {
            return Err(ConsensusError::DuplicateProposal);
        }

        let mut pre_prepare = Request::new(RequestType::PrePrepare, self.self_id, payload, hash.clone());
        pre_prepare.seq = seq;
        pre_prepare.current_view = self.system_info.view();
        pre_prepare.data_signature = self.verifier.sign_message(&hash).ok();

        self.stats.propose.fetch_add(1, Ordering::Relaxed);
        self.broadcaster
            .broadcast(
                RequestType::PrePrepare,
                seq,
                pre_prepare.current_view,
                pre_prepare.data.clone(),
            )
            .map_err(|e| ConsensusError::TransportFailure(e.to_string()))?;

        // The primary runs the same admission path as every other replica
        // (spec §4.G step 4: "adds it to its own collector").
        self.handle_pre_prepare(pre_prepare).await
    }

    async fn process(&self, request: Request) -> Result<()> {
        match request.request_type {
            RequestType::PrePrepare => self.handle_pre_prepare(request).await,
            RequestType::Prepare => self.handle_prepare(request).await,
            RequestType::Commit => self.handle_commit(request).await,
            other => Err(ConsensusError::TransportFailure(format!(
                "commitment received unexpected request type {other:?}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcaster::test_util::RecordingBroadcaster;
    use bft_crypto::{InMemoryVerifier, Keypair};
    use bft_types::{HashType, ReplicaInfo};
    use tokio::sync::mpsc::unbounded_channel;

    fn make_commitment(
        self_id: u32,
        primary: u32,
        quorum: usize,
    ) -> (Commitment, Arc<RecordingBroadcaster>, mpsc::UnboundedReceiver<CommittedMessage>) {
        let broadcaster = Arc::new(RecordingBroadcaster::new());
        let system_info = Arc::new(SystemInfo::new(
            vec![
                ReplicaInfo::new(1, "127.0.0.1", 9001),
                ReplicaInfo::new(2, "127.0.0.1", 9002),
                ReplicaInfo::new(3, "127.0.0.1", 9003),
                ReplicaInfo::new(4, "127.0.0.1", 9004),
            ],
            primary,
        ));
        let pool = Arc::new(CollectorPool::new(64));
        let duplicate_manager = DuplicateManager::with_defaults();
        // A real signing key so this replica's own implicit votes carry a
        // signature and land in the commit certificate like a peer's would.
        let verifier = Arc::new(InMemoryVerifier::with_signing_key(self_id, Keypair::generate()));
        let stats = Arc::new(Stats::new());
        let next_execute_seq = Arc::new(AtomicU64::new(1));
        let (tx, rx) = unbounded_channel();
        let commitment = Commitment::new(
            self_id,
            quorum,
            64,
            broadcaster.clone(),
            system_info,
            pool,
            duplicate_manager,
            verifier,
            stats,
            next_execute_seq,
            tx,
        );
        (commitment, broadcaster, rx)
    }

    fn pre_prepare(seq: u64, view: u64, primary: u32, hash: Vec<u8>) -> Request {
        let mut r = Request::new(RequestType::PrePrepare, primary, b"payload".to_vec(), hash);
        r.seq = seq;
        r.current_view = view;
        r
    }

    /// Builds a stand-in network vote. The claimed hash rides in `data`
    /// (what a real `Broadcaster::broadcast` call carries as its payload),
    /// not `hash` (which the transport stamps with a hash of that payload).
    fn vote(request_type: RequestType, seq: u64, view: u64, sender: u32, hash: Vec<u8>) -> Request {
        let mut r = Request::new(request_type, sender, hash, Vec::new());
        r.seq = seq;
        r.current_view = view;
        r.data_signature = Some(SignatureInfo::new(vec![1; 64], sender, HashType::Sha256));
        r
    }

    #[tokio::test]
    async fn pre_prepare_from_primary_broadcasts_prepare() {
        let (commitment, broadcaster, _rx) = make_commitment(2, 1, 3);
        commitment
            .process(pre_prepare(1, 1, 1, vec![9, 9]))
            .await
            .unwrap();
        let sends = broadcaster.sends();
        assert_eq!(sends.len(), 1);
        assert_eq!(sends[0].request_type, RequestType::Prepare);
    }

    #[tokio::test]
    async fn pre_prepare_from_non_primary_is_rejected() {
        let (commitment, broadcaster, _rx) = make_commitment(2, 1, 3);
        let result = commitment.process(pre_prepare(1, 1, 3, vec![9, 9])).await;
        assert!(matches!(result, Err(ConsensusError::NotLeader(_))));
        assert!(broadcaster.sends().is_empty());
    }

    #[tokio::test]
    async fn duplicate_pre_prepare_hash_is_dropped() {
        let (commitment, broadcaster, _rx) = make_commitment(2, 1, 3);
        commitment
            .process(pre_prepare(1, 1, 1, vec![9, 9]))
            .await
            .unwrap();
        let result = commitment.process(pre_prepare(1, 1, 1, vec![9, 9])).await;
        assert!(matches!(result, Err(ConsensusError::DuplicateProposal)));
        // Only the first pre-prepare produced a broadcast Prepare.
        assert_eq!(broadcaster.sends().len(), 1);
    }

    #[tokio::test]
    async fn prepare_with_mismatched_hash_is_rejected_as_hash_mismatch() {
        let (commitment, broadcaster, _rx) = make_commitment(2, 1, 3);
        commitment
            .process(pre_prepare(5, 1, 1, vec![1, 2]))
            .await
            .unwrap();
        let result = commitment
            .process(vote(RequestType::Prepare, 5, 1, 2, vec![9, 9]))
            .await;
        assert!(matches!(result, Err(ConsensusError::HashMismatch(5))));
        // Only the pre-prepare's own Prepare broadcast went out.
        assert_eq!(broadcaster.sends().len(), 1);
    }

    #[tokio::test]
    async fn prepare_quorum_transitions_to_ready_commit_and_broadcasts_commit() {
        let (commitment, broadcaster, _rx) = make_commitment(1, 1, 3);
        commitment
            .process(pre_prepare(5, 1, 1, vec![1, 2]))
            .await
            .unwrap();
        commitment
            .process(vote(RequestType::Prepare, 5, 1, 2, vec![1, 2]))
            .await
            .unwrap();
        commitment
            .process(vote(RequestType::Prepare, 5, 1, 3, vec![1, 2]))
            .await
            .unwrap();
        let sends = broadcaster.sends();
        assert!(sends.iter().any(|s| s.request_type == RequestType::Commit));
    }

    #[tokio::test]
    async fn duplicate_prepare_vote_does_not_reach_quorum_early() {
        let (commitment, broadcaster, _rx) = make_commitment(1, 1, 3);
        commitment
            .process(pre_prepare(5, 1, 1, vec![1, 2]))
            .await
            .unwrap();
        // The primary's own Prepare vote plus a single duplicated sender
        // must never be enough for a quorum of 3.
        commitment
            .process(vote(RequestType::Prepare, 5, 1, 2, vec![1, 2]))
            .await
            .unwrap();
        commitment
            .process(vote(RequestType::Prepare, 5, 1, 2, vec![1, 2]))
            .await
            .unwrap();
        let sends = broadcaster.sends();
        assert!(!sends.iter().any(|s| s.request_type == RequestType::Commit));
    }

    #[tokio::test]
    async fn commit_quorum_hands_off_to_executor() {
        let (commitment, _broadcaster, mut rx) = make_commitment(1, 1, 3);
        // Drive the Prepare phase to quorum first (self-vote plus two peers)
        // so the collector reaches `ReadyCommit` before any Commit vote is
        // valid input — a direct Commit can never arrive out of phase.
        commitment
            .process(pre_prepare(9, 1, 1, vec![3, 3]))
            .await
            .unwrap();
        commitment
            .process(vote(RequestType::Prepare, 9, 1, 2, vec![3, 3]))
            .await
            .unwrap();
        commitment
            .process(vote(RequestType::Prepare, 9, 1, 3, vec![3, 3]))
            .await
            .unwrap();
        // That Prepare quorum already folded in this replica's own Commit
        // vote; two more distinct Commit votes complete the quorum of 3.
        commitment
            .process(vote(RequestType::Commit, 9, 1, 2, vec![3, 3]))
            .await
            .unwrap();
        commitment
            .process(vote(RequestType::Commit, 9, 1, 3, vec![3, 3]))
            .await
            .unwrap();
        let committed = rx.try_recv().expect("executor should receive the commit");
        assert_eq!(committed.request.seq, 9);
        assert_eq!(committed.certs.len(), 3);
    }

    #[tokio::test]
    async fn view_mismatch_is_rejected() {
        let (commitment, _broadcaster, _rx) = make_commitment(2, 1, 3);
        let result = commitment.process(pre_prepare(1, 7, 1, vec![1])).await;
        assert!(matches!(result, Err(ConsensusError::ViewMismatch { .. })));
    }

    #[tokio::test]
    async fn reset_view_rewinds_next_seq_to_execute_watermark() {
        let (commitment, _broadcaster, _rx) = make_commitment(1, 1, 3);
        commitment.assign_next_seq().unwrap();
        commitment.assign_next_seq().unwrap();
        commitment.reset_view();
        assert_eq!(commitment.assign_next_seq().unwrap(), 1);
    }

    #[tokio::test]
    async fn seq_beyond_window_is_rejected() {
        let (commitment, _broadcaster, _rx) = make_commitment(2, 1, 3);
        let result = commitment.process(pre_prepare(1000, 1, 1, vec![1])).await;
        assert!(matches!(result, Err(ConsensusError::BeyondWindow(1000))));
    }

    #[tokio::test]
    async fn window_full_sends_ret_minus_two_and_no_pre_prepare() {
        let (commitment, broadcaster, _rx) = make_commitment(1, 1, 3);
        // Exhaust the pool's 64-slot window without going through the
        // broadcast path, then submit one more request as primary.
        for _ in 0..64 {
            commitment.assign_next_seq().unwrap();
        }
        let batch = BatchUserRequest {
            user_requests: vec![b"overflow".to_vec()],
            createtime: 1,
            local_id: 42,
            proxy_id: 7,
            seq: 0,
            hash: vec![],
        };
        let result = commitment.process_new_user_request(batch).await;
        assert!(matches!(result, Err(ConsensusError::BeyondWindow(0))));

        let sends = broadcaster.sends();
        assert!(!sends.iter().any(|s| s.request_type == RequestType::PrePrepare));
        let response_send = sends
            .iter()
            .find(|s| s.request_type == RequestType::Response)
            .expect("window-full response should have been sent to the proxy");
        assert_eq!(response_send.node_id, Some(7));
        let response = BatchUserResponse::decode(&response_send.data).unwrap();
        assert_eq!(response.ret, -2);
        assert_eq!(response.local_id, 42);
        assert_eq!(response.proxy_id, 7);
    }
}
