//! End-to-end scenarios (spec §8) driven through the public `Commitment`/
//! `TransactionExecutor` API with an in-memory `RecordingBroadcaster`, rather
//! than real TCP replicas — a level below `bft-node`'s full-network
//! integration suite, but above the per-module unit tests each crate module
//! already carries.

use bft_consensus::broadcaster::test_util::RecordingBroadcaster;
use bft_consensus::{
    Commitment, CommitmentHandle, CollectorPool, CommittedMessage, ConsensusError,
    DuplicateManager, EchoTransactionManager, Stats, SystemInfo, TransactionExecutor,
};
use bft_crypto::{InMemoryVerifier, Keypair, Verifier};
use bft_types::{BatchUserRequest, BatchUserResponse, Request, RequestType};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

fn four_replica_system(primary: u32) -> Arc<SystemInfo> {
    use bft_types::ReplicaInfo;
    Arc::new(SystemInfo::new(
        vec![
            ReplicaInfo::new(1, "127.0.0.1", 9001),
            ReplicaInfo::new(2, "127.0.0.1", 9002),
            ReplicaInfo::new(3, "127.0.0.1", 9003),
            ReplicaInfo::new(4, "127.0.0.1", 9004),
        ],
        primary,
    ))
}

fn pre_prepare(seq: u64, view: u64, primary: u32, hash: Vec<u8>) -> Request {
    let mut r = Request::new(RequestType::PrePrepare, primary, b"payload".to_vec(), hash);
    r.seq = seq;
    r.current_view = view;
    r
}

fn prepare_vote(seq: u64, view: u64, sender: u32, hash: Vec<u8>) -> Request {
    use bft_types::{HashType, SignatureInfo};
    let mut r = Request::new(RequestType::Prepare, sender, hash, Vec::new());
    r.seq = seq;
    r.current_view = view;
    r.data_signature = Some(SignatureInfo::new(vec![1; 64], sender, HashType::Sha256));
    r
}

/// E2: a duplicate `Prepare` from the same sender must not be double-counted
/// toward quorum (spec §8 invariant, example E2).
#[tokio::test]
async fn e2_duplicate_prepare_from_same_sender_does_not_inflate_quorum() {
    let broadcaster = Arc::new(RecordingBroadcaster::new());
    let system_info = four_replica_system(1);
    let pool = Arc::new(CollectorPool::new(64));
    let duplicate_manager = DuplicateManager::with_defaults();
    let verifier: Arc<dyn Verifier> = Arc::new(InMemoryVerifier::with_signing_key(2, Keypair::generate()));
    let stats = Arc::new(Stats::new());
    let next_execute_seq = Arc::new(AtomicU64::new(1));
    let (executor_tx, _executor_rx) = tokio::sync::mpsc::unbounded_channel();

    // Quorum of 3 (n=4, f=1): the primary's own implicit vote plus two
    // distinct peers are required to reach `ReadyCommit`.
    let commitment = Commitment::new(
        2,
        3,
        64,
        broadcaster.clone(),
        system_info,
        pool.clone(),
        duplicate_manager,
        verifier,
        stats,
        next_execute_seq,
        executor_tx,
    );

    commitment.process(pre_prepare(5, 1, 1, vec![9, 9])).await.unwrap();
    // Replica 2 (this node) has already folded in its own Prepare vote via
    // the pre-prepare handler; sender 3 votes twice.
    commitment
        .process(prepare_vote(5, 1, 3, vec![9, 9]))
        .await
        .unwrap();
    commitment
        .process(prepare_vote(5, 1, 3, vec![9, 9]))
        .await
        .unwrap();

    let collector = pool.peek(5).expect("seq 5's slot should still represent seq 5");
    assert_eq!(collector.prepare_count(), 2, "self-vote plus one distinct sender, not two");
    assert_eq!(collector.status(), bft_consensus::CollectorStatus::ReadyPrepare);
    assert!(!broadcaster.sends().iter().any(|s| s.request_type == RequestType::Commit));
}

/// E3: commits arriving out of seq order must still dispatch and execute in
/// order 1, 2, 3 (spec §8 invariant, example E3).
#[tokio::test]
async fn e3_out_of_order_commits_execute_in_seq_order() {
    fn committed(seq: u64) -> CommittedMessage {
        let batch = BatchUserRequest {
            user_requests: vec![seq.to_be_bytes().to_vec()],
            createtime: 1,
            local_id: seq,
            proxy_id: 9,
            seq,
            hash: vec![seq as u8],
        };
        let data = batch.encode().unwrap();
        let mut request = Request::new(RequestType::PrePrepare, 1, data, vec![seq as u8]);
        request.seq = seq;
        CommittedMessage { request, certs: Vec::new() }
    }

    let manager = Arc::new(EchoTransactionManager::new());
    let duplicate_manager = DuplicateManager::with_defaults();
    let stats = Arc::new(Stats::new());
    let pool = Arc::new(CollectorPool::new(64));
    let (response_tx, mut response_rx) = tokio::sync::mpsc::unbounded_channel();
    let (executor, next_execute_seq) =
        TransactionExecutor::new(manager.clone(), duplicate_manager.clone(), pool, stats, 16, 1, false, response_tx);

    let (commit_tx, commit_rx) = tokio::sync::mpsc::unbounded_channel();
    let handle = executor.spawn(commit_rx);

    commit_tx.send(committed(3)).unwrap();
    commit_tx.send(committed(1)).unwrap();
    commit_tx.send(committed(2)).unwrap();
    drop(commit_tx);
    handle.await.unwrap();
    tokio::task::yield_now().await;

    assert_eq!(next_execute_seq.load(Ordering::Acquire), 4);
    let first = response_rx.recv().await.unwrap();
    let second = response_rx.recv().await.unwrap();
    let third = response_rx.recv().await.unwrap();
    assert_eq!((first.seq, second.seq, third.seq), (1, 2, 3));
    duplicate_manager.stop();
}

/// E5: once the in-flight window is full, `process_new_user_request` must
/// reject the batch, send back a `ret = -2` response, and broadcast no new
/// `PrePrepare` (spec §8 invariant, example E5).
#[tokio::test]
async fn e5_window_full_sends_ret_minus_two_with_no_new_pre_prepare() {
    let broadcaster = Arc::new(RecordingBroadcaster::new());
    let system_info = four_replica_system(1);
    let pool = Arc::new(CollectorPool::new(4));
    let duplicate_manager = DuplicateManager::with_defaults();
    let verifier: Arc<dyn Verifier> = Arc::new(InMemoryVerifier::with_signing_key(1, Keypair::generate()));
    let stats = Arc::new(Stats::new());
    let next_execute_seq = Arc::new(AtomicU64::new(1));
    let (executor_tx, _executor_rx) = tokio::sync::mpsc::unbounded_channel();

    // Quorum of 1 so every submission assigns a seq without needing real
    // peer votes; window of 4 so four submissions exhaust it.
    let commitment: Arc<dyn CommitmentHandle> = Arc::new(Commitment::new(
        1,
        1,
        4,
        broadcaster.clone(),
        system_info,
        pool,
        duplicate_manager,
        verifier,
        stats,
        next_execute_seq,
        executor_tx,
    ));

    let batch = |local_id: u64| BatchUserRequest {
        user_requests: vec![b"op".to_vec()],
        createtime: 1,
        local_id,
        proxy_id: 42,
        seq: 0,
        hash: Vec::new(),
    };

    for local_id in 0..4 {
        commitment.process_new_user_request(batch(local_id)).await.unwrap();
    }
    let pre_prepares_before = broadcaster
        .sends()
        .iter()
        .filter(|s| s.request_type == RequestType::PrePrepare)
        .count();
    assert_eq!(pre_prepares_before, 4);

    let result = commitment.process_new_user_request(batch(99)).await;
    assert!(matches!(result, Err(ConsensusError::BeyondWindow(0))));

    let sends = broadcaster.sends();
    let pre_prepares_after = sends.iter().filter(|s| s.request_type == RequestType::PrePrepare).count();
    assert_eq!(pre_prepares_after, 4, "no new PrePrepare for the rejected batch");

    let response_send = sends
        .iter()
        .rev()
        .find(|s| s.request_type == RequestType::Response)
        .expect("a window-full response should have been sent");
    assert_eq!(response_send.node_id, Some(42));
    let response = BatchUserResponse::decode(&response_send.data).unwrap();
    assert_eq!(response.ret, -2);
    assert_eq!(response.local_id, 99);
}
