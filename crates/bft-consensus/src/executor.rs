//! `TransactionExecutor` (spec §4.H): the single in-order execution point.
//! Drains committed seqs from `Commitment`, executes each against the
//! configured `TransactionManager`, and republishes the result to
//! `ResponseManager`.
//!
//! Grounded on the bucketed parallel-execute scheme of
//! `examples/original_source/platform/consensus/execution/transaction_executor.{h,cpp}`:
//! a fixed array of claim slots (`bucket_num`, default 1024) lets
//! `execute_thread_num > 1` worker threads run independent application plans
//! concurrently while still publishing results in strict seq order, plus the
//! optional out-of-order speculative executor task an application opts into
//! via `TransactionManager::is_out_of_order`.

use crate::collector_pool::CollectorPool;
use crate::commitment::CommittedMessage;
use crate::duplicate_manager::DuplicateManager;
use crate::error::ConsensusError;
use crate::stats::Stats;
use crate::transaction_manager::TransactionManager;
use bft_types::BatchUserRequest;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;

/// A response the executor has produced for a given seq, forwarded to
/// `ResponseManager` for delivery to the originating client proxy.
#[derive(Debug, Clone)]
pub struct ExecutedResponse {
    /// The seq this response corresponds to.
    pub seq: u64,
    /// The proxy that should receive this response.
    pub proxy_id: u32,
    /// The batch id this response was assigned when it was submitted,
    /// used by `ResponseManager` to look up a server-side batched
    /// request's per-sender context list.
    pub local_id: u64,
    /// The encoded `BatchUserResponse`, or `None` if the application opted
    /// out of replying (`TransactionManager::need_response() == false`).
    pub payload: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum BucketState {
    Empty = 0,
    InFlight = 1,
    Done = 2,
}

impl BucketState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => BucketState::Empty,
            1 => BucketState::InFlight,
            _ => BucketState::Done,
        }
    }
}

/// A fixed ring of claim slots guarding the bucketed parallel-execute path
/// (spec §4.H). A seq's slot is claimed *once*, by the single-threaded
/// ordering task, in strict seq order — this is what actually establishes
/// the "predecessor claimed before successor" happens-before edge that a
/// pool of executor workers then relies on; workers themselves only wait for
/// the predecessor to finish and release their own slot when done, so two
/// workers racing to claim the same slot concurrently (spec §7
/// `InternalInvariantViolation`) can only happen if the ordering task itself
/// has a bug, never as an ordinary race between workers.
struct BucketRing {
    buckets: Vec<AtomicU8>,
    notify: Vec<Notify>,
}

impl BucketRing {
    fn new(bucket_num: usize) -> Self {
        let n = bucket_num.max(1);
        let buckets = (0..n).map(|_| AtomicU8::new(BucketState::Empty as u8)).collect();
        let notify = (0..n).map(|_| Notify::new()).collect();
        Self { buckets, notify }
    }

    fn index_of(&self, seq: u64) -> usize {
        (seq % self.buckets.len() as u64) as usize
    }

    /// Claims `seq`'s slot for dispatch. Called only by the ordering task,
    /// once per seq, strictly in increasing seq order. Returns an error if
    /// the slot was already `InFlight` — two seqs whose index collides
    /// (`seq` and `seq ± bucket_num`) must never both be in flight (spec §7
    /// `InternalInvariantViolation`).
    fn claim(&self, seq: u64) -> Result<(), ConsensusError> {
        let idx = self.index_of(seq);
        self.buckets[idx]
            .compare_exchange(
                BucketState::Done as u8,
                BucketState::InFlight as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .or_else(|_| {
                self.buckets[idx].compare_exchange(
                    BucketState::Empty as u8,
                    BucketState::InFlight as u8,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
            })
            .map(|_| ())
            .map_err(|observed| {
                ConsensusError::InternalInvariantViolation(format!(
                    "bucket {idx} for seq {seq} already in state {:?}",
                    BucketState::from_u8(observed)
                ))
            })
    }

    /// Waits until `seq`'s predecessor (`seq - 1`) has released its slot, or
    /// returns immediately for `seq <= 1` (no predecessor). Race-free against
    /// a concurrent `release`: the `Notify` future is created before the
    /// state is re-checked, so a release landing between the check and the
    /// await is never missed.
    async fn wait_for_predecessor(&self, seq: u64) {
        if seq <= 1 {
            return;
        }
        let idx = self.index_of(seq - 1);
        loop {
            let notified = self.notify[idx].notified();
            if BucketState::from_u8(self.buckets[idx].load(Ordering::Acquire)) != BucketState::InFlight {
                return;
            }
            notified.await;
        }
    }

    fn release(&self, seq: u64) {
        let idx = self.index_of(seq);
        self.buckets[idx].store(BucketState::Done as u8, Ordering::Release);
        self.notify[idx].notify_waiters();
    }
}

/// Drains `CommittedMessage`s in seq order and executes each against a
/// `TransactionManager`.
///
/// Two execution modes, selected by `execute_thread_num` (spec §4.H):
/// - `== 1`: one worker task executes every seq inline, strictly in order.
/// - `> 1`: the ordering task only *dispatches* each contiguous seq (still
///   strictly in order, claiming its `BucketRing` slot as it does so); a
///   pool of worker tasks pulls from the resulting queue and actually runs
///   `execute_batch`/`execute_plan`, blocking only on its immediate
///   predecessor's slot before the state-mutating call. Client responses are
///   published in completion order, not seq order (spec §4.I).
pub struct TransactionExecutor<T: TransactionManager> {
    transaction_manager: Arc<T>,
    duplicate_manager: Arc<DuplicateManager>,
    pool: Arc<CollectorPool>,
    stats: Arc<Stats>,
    next_execute_seq: Arc<AtomicU64>,
    next_dispatch_seq: AtomicU64,
    execute_thread_num: usize,
    enable_ooo_execution: bool,
    buckets: Arc<BucketRing>,
    /// Committed messages that arrived out of seq order, buffered until the
    /// contiguous prefix starting at `next_dispatch_seq` is available (spec
    /// §4.H "Ordering task loop", example E3: commits can arrive as
    /// 3, 1, 2 but must dispatch as 1, 2, 3).
    candidates: Mutex<BTreeMap<u64, CommittedMessage>>,
    response_tx: mpsc::UnboundedSender<ExecutedResponse>,
}

impl<T: TransactionManager + 'static> TransactionExecutor<T> {
    /// Builds an executor. `next_execute_seq` starts at `1` and is shared
    /// with `Commitment` as a read-only back-pressure signal: it only
    /// advances once a seq's execution has actually completed (spec §4.F,
    /// §4.H). `next_dispatch_seq` is a private cursor tracking which
    /// contiguous seq the ordering task has handed to a worker, which may
    /// run ahead of `next_execute_seq` when `execute_thread_num > 1`.
    ///
    /// `enable_ooo_execution` is the operator-side config gate (spec §6.2);
    /// the speculative task only actually runs when this is `true` *and*
    /// `transaction_manager.is_out_of_order()` also returns `true` — an
    /// operator can disable speculative execution without an application
    /// redeploy, but an application that never opted in cannot be forced
    /// into it by config alone.
    #[must_use]
    pub fn new(
        transaction_manager: Arc<T>,
        duplicate_manager: Arc<DuplicateManager>,
        pool: Arc<CollectorPool>,
        stats: Arc<Stats>,
        bucket_num: usize,
        execute_thread_num: usize,
        enable_ooo_execution: bool,
        response_tx: mpsc::UnboundedSender<ExecutedResponse>,
    ) -> (Arc<Self>, Arc<AtomicU64>) {
        let next_execute_seq = Arc::new(AtomicU64::new(1));
        let executor = Arc::new(Self {
            transaction_manager,
            duplicate_manager,
            pool,
            stats,
            next_execute_seq: next_execute_seq.clone(),
            next_dispatch_seq: AtomicU64::new(1),
            execute_thread_num: execute_thread_num.max(1),
            enable_ooo_execution,
            buckets: Arc::new(BucketRing::new(bucket_num)),
            candidates: Mutex::new(BTreeMap::new()),
            response_tx,
        });
        (executor, next_execute_seq)
    }

    /// Resets execution to resume at `seq`, discarding any buffered
    /// out-of-order candidates. Used by view-change recovery, not by the
    /// steady-state commit path.
    pub fn reset_next_execute_seq(&self, seq: u64) {
        self.candidates.lock().clear();
        self.next_dispatch_seq.store(seq, Ordering::Release);
        self.next_execute_seq.store(seq, Ordering::Release);
    }

    /// Spawns the ordering/dispatch task plus its worker pool (and, if the
    /// application opts in, the out-of-order speculative task). Drains
    /// `commit_rx`, buffers arrivals by seq, and dispatches only the
    /// contiguous prefix starting at `next_dispatch_seq` (spec §4.H "Ordering
    /// task loop"). The returned handle is the ordering task; dropping its
    /// input (closing `commit_rx`) cascades to stop the worker pool and the
    /// out-of-order task too, since their channels close in turn. A worker
    /// never panics on an ordinary execution error, only aborts the process
    /// on `ConsensusError::InternalInvariantViolation`, per spec §7's fatal
    /// class.
    pub fn spawn(self: Arc<Self>, mut commit_rx: mpsc::UnboundedReceiver<CommittedMessage>) -> JoinHandle<()> {
        let (execute_tx, execute_rx) = mpsc::unbounded_channel::<CommittedMessage>();
        let execute_rx = Arc::new(tokio::sync::Mutex::new(execute_rx));
        let (ooo_tx, mut ooo_rx) = mpsc::unbounded_channel::<CommittedMessage>();

        for _ in 0..self.execute_thread_num {
            let executor = self.clone();
            let execute_rx = execute_rx.clone();
            tokio::spawn(async move {
                loop {
                    let next = execute_rx.lock().await.recv().await;
                    let Some(committed) = next else { return };
                    if let Err(ConsensusError::InternalInvariantViolation(msg)) =
                        executor.execute_one(committed).await
                    {
                        tracing::error!(error = %msg, "fatal invariant violation in executor, aborting process");
                        std::process::abort();
                    }
                }
            });
        }

        {
            let executor = self.clone();
            tokio::spawn(async move {
                while let Some(committed) = ooo_rx.recv().await {
                    executor.execute_speculative(committed).await;
                }
            });
        }

        tokio::spawn(async move {
            while let Some(committed) = commit_rx.recv().await {
                let seq = committed.request.seq;
                if self.enable_ooo_execution
                    && self.transaction_manager.is_out_of_order()
                    && ooo_tx.send(committed.clone()).is_err()
                {
                    tracing::debug!("out-of-order executor task gone, skipping speculative execution");
                }
                self.candidates.lock().insert(seq, committed);
                loop {
                    let dispatch = self.next_dispatch_seq.load(Ordering::Acquire);
                    let ready = self.candidates.lock().remove(&dispatch);
                    let Some(ready) = ready else { break };
                    if let Err(e) = self.buckets.claim(dispatch) {
                        tracing::error!(error = %e, "fatal invariant violation dispatching executor work, aborting process");
                        std::process::abort();
                    }
                    self.next_dispatch_seq.store(dispatch + 1, Ordering::Release);
                    if execute_tx.send(ready).is_err() {
                        return;
                    }
                }
            }
        })
    }

    /// Runs one committed seq's speculative, out-of-order execution (spec
    /// §4.H, §9). Entirely independent of the bucket ring, the dedup window,
    /// and `next_execute_seq`: it neither blocks on nor contributes to the
    /// official in-order pipeline, and produces no client response — the
    /// application opted in via `is_out_of_order` and is responsible for its
    /// own safety running ahead of the canonical result.
    async fn execute_speculative(&self, committed: CommittedMessage) {
        let seq = committed.request.seq;
        let Ok(batch) = BatchUserRequest::decode(&committed.request.data) else {
            tracing::warn!(seq, "speculative batch undecodable, skipping");
            return;
        };
        self.stats.ooo_execute.fetch_add(1, Ordering::Relaxed);
        let _ = self.transaction_manager.execute_batch(&batch).await;
    }

    /// Executes one dispatched seq: waits for its predecessor's bucket slot,
    /// runs the application handler (via the bucketed parallel split if the
    /// application provides one, otherwise `execute_batch` directly),
    /// releases its own slot, retires the collector, and advances
    /// `next_execute_seq`.
    async fn execute_one(&self, committed: CommittedMessage) -> Result<(), ConsensusError> {
        let seq = committed.request.seq;

        let batch = BatchUserRequest::decode(&committed.request.data).map_err(|e| {
            // A decode failure here means a quorum agreed on bytes this
            // node cannot parse: a local bug, not a Byzantine input (that
            // would have been rejected before reaching quorum), so this is
            // treated as fatal per spec §7.
            ConsensusError::InternalInvariantViolation(format!(
                "seq {seq} committed but undecodable: {e}"
            ))
        })?;

        self.buckets.wait_for_predecessor(seq).await;

        let hash = committed.request.hash.clone();
        let already_executed = self.duplicate_manager.check_and_add_executed(&hash, seq);
        let response = if already_executed {
            None
        } else {
            let plans = self.transaction_manager.prepare(&batch).await;
            if plans.is_empty() {
                self.transaction_manager.execute_batch(&batch).await
            } else {
                let results = self.transaction_manager.execute_plan(&plans).await;
                Some(bft_types::BatchUserResponse {
                    seq,
                    proxy_id: batch.proxy_id,
                    local_id: batch.local_id,
                    createtime: batch.createtime,
                    hash: batch.hash.clone(),
                    responses: results,
                    ret: 0,
                })
            }
        };

        self.stats.execute.fetch_add(1, Ordering::Relaxed);
        let need_response = self.transaction_manager.need_response();

        // `next_execute_seq` must advance monotonically even when several
        // workers are executing concurrently. `seq + 1`'s successor only
        // starts its own real work after observing this bucket's `release`
        // (via `wait_for_predecessor`'s Notify), so storing here *before*
        // releasing guarantees this store happens-before the successor's own
        // store — reversing the order would let a successor finish and
        // advance the watermark before this seq's own advance lands,
        // regressing it.
        self.pool.retire(seq);
        self.next_execute_seq.store(seq + 1, Ordering::Release);
        self.buckets.release(seq);

        if need_response {
            let payload = response.and_then(|r| r.encode().ok());
            let _ = self.response_tx.send(ExecutedResponse {
                seq,
                proxy_id: batch.proxy_id,
                local_id: batch.local_id,
                payload,
            });
        }
        self.stats.execute_done.fetch_add(1, Ordering::Relaxed);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction_manager::EchoTransactionManager;
    use bft_types::{Request, RequestType};
    use tokio::sync::mpsc::unbounded_channel;

    fn committed(seq: u64, requests: Vec<Vec<u8>>) -> CommittedMessage {
        let batch = BatchUserRequest {
            user_requests: requests,
            createtime: 1,
            local_id: seq,
            proxy_id: 7,
            seq,
            hash: vec![seq as u8],
        };
        let data = batch.encode().unwrap();
        let mut request = Request::new(RequestType::PrePrepare, 1, data, vec![seq as u8]);
        request.seq = seq;
        CommittedMessage {
            request,
            certs: Vec::new(),
        }
    }

    fn new_executor(
        bucket_num: usize,
        execute_thread_num: usize,
    ) -> (
        Arc<TransactionExecutor<EchoTransactionManager>>,
        Arc<EchoTransactionManager>,
        Arc<DuplicateManager>,
        Arc<AtomicU64>,
        mpsc::UnboundedReceiver<ExecutedResponse>,
    ) {
        let manager = Arc::new(EchoTransactionManager::new());
        let duplicate_manager = DuplicateManager::with_defaults();
        let stats = Arc::new(Stats::new());
        let (tx, rx) = unbounded_channel();
        let pool = Arc::new(CollectorPool::new(64));
        let (executor, next_execute_seq) = TransactionExecutor::new(
            manager.clone(),
            duplicate_manager.clone(),
            pool,
            stats,
            bucket_num,
            execute_thread_num,
            true,
            tx,
        );
        (executor, manager, duplicate_manager, next_execute_seq, rx)
    }

    #[tokio::test]
    async fn executes_in_order_and_advances_next_execute_seq() {
        let (executor, manager, duplicate_manager, next_execute_seq, mut rx) = new_executor(16, 1);

        executor
            .execute_one(committed(1, vec![b"a".to_vec()]))
            .await
            .unwrap();
        executor
            .execute_one(committed(2, vec![b"b".to_vec()]))
            .await
            .unwrap();

        assert_eq!(next_execute_seq.load(Ordering::Acquire), 3);
        assert_eq!(manager.executed_count(), 2);
        let first = rx.try_recv().unwrap();
        assert_eq!(first.seq, 1);
        assert_eq!(first.proxy_id, 7);
        assert!(first.payload.is_some());
        duplicate_manager.stop();
    }

    #[tokio::test]
    async fn replaying_an_already_executed_hash_is_a_no_op_execution() {
        let (executor, manager, duplicate_manager, _next, mut rx) = new_executor(16, 1);

        let first = committed(1, vec![b"a".to_vec()]);
        let mut replay = committed(2, vec![b"a".to_vec()]);
        replay.request.hash = first.request.hash.clone();

        executor.execute_one(first).await.unwrap();
        executor.execute_one(replay).await.unwrap();

        // Only the first execution actually ran against the application.
        assert_eq!(manager.executed_count(), 1);
        let _ = rx.try_recv().unwrap();
        let replayed_response = rx.try_recv().unwrap();
        assert!(replayed_response.payload.is_none());
        duplicate_manager.stop();
    }

    #[tokio::test]
    async fn colliding_bucket_claim_is_an_invariant_violation() {
        let (executor, _manager, duplicate_manager, _next, _rx) = new_executor(4, 1);

        // Seq 1 and seq 5 collide on a 4-bucket ring; claim seq 1 and leave
        // it in flight by reaching directly into the bucket state.
        executor.buckets.claim(1).unwrap();
        let result = executor.buckets.claim(5);
        assert!(matches!(result, Err(ConsensusError::InternalInvariantViolation(_))));
        duplicate_manager.stop();
    }

    #[tokio::test]
    async fn spawned_ordering_task_drains_committed_channel() {
        let (executor, manager, duplicate_manager, next_execute_seq, mut response_rx) = new_executor(16, 1);
        let (commit_tx, commit_rx) = unbounded_channel();
        let handle = executor.spawn(commit_rx);

        commit_tx.send(committed(1, vec![b"x".to_vec()])).unwrap();
        drop(commit_tx);
        handle.await.unwrap();
        // Let the (now channel-closed) worker pool observe the last item.
        tokio::task::yield_now().await;

        assert_eq!(next_execute_seq.load(Ordering::Acquire), 2);
        assert!(response_rx.recv().await.is_some());
        let _ = manager.executed_count();
        duplicate_manager.stop();
    }

    #[tokio::test]
    async fn out_of_order_commits_execute_in_seq_order() {
        let (executor, manager, duplicate_manager, next_execute_seq, mut response_rx) = new_executor(16, 1);
        let (commit_tx, commit_rx) = unbounded_channel();
        let handle = executor.spawn(commit_rx);

        // Commits land out of order (3, 1, 2); dispatch (and, with a single
        // worker, execution) must still proceed 1, 2, 3.
        commit_tx.send(committed(3, vec![b"c".to_vec()])).unwrap();
        commit_tx.send(committed(1, vec![b"a".to_vec()])).unwrap();
        commit_tx.send(committed(2, vec![b"b".to_vec()])).unwrap();
        drop(commit_tx);
        handle.await.unwrap();
        tokio::task::yield_now().await;

        assert_eq!(next_execute_seq.load(Ordering::Acquire), 4);
        assert_eq!(manager.executed_count(), 3);
        let first = response_rx.recv().await.unwrap();
        let second = response_rx.recv().await.unwrap();
        let third = response_rx.recv().await.unwrap();
        assert_eq!((first.seq, second.seq, third.seq), (1, 2, 3));
        duplicate_manager.stop();
    }

    #[tokio::test]
    async fn multiple_worker_threads_still_publish_every_seq_and_advance_in_order() {
        let (executor, manager, duplicate_manager, next_execute_seq, mut response_rx) = new_executor(16, 4);
        let (commit_tx, commit_rx) = unbounded_channel();
        let handle = executor.spawn(commit_rx);

        for seq in 1..=8u64 {
            commit_tx.send(committed(seq, vec![seq.to_be_bytes().to_vec()])).unwrap();
        }
        drop(commit_tx);
        handle.await.unwrap();

        let mut seen = Vec::new();
        for _ in 0..8 {
            seen.push(response_rx.recv().await.unwrap().seq);
        }
        seen.sort_unstable();
        assert_eq!(seen, (1..=8).collect::<Vec<_>>());
        assert_eq!(manager.executed_count(), 8);
        assert_eq!(next_execute_seq.load(Ordering::Acquire), 9);
        duplicate_manager.stop();
    }

    #[tokio::test]
    async fn out_of_order_transaction_manager_runs_speculative_execution_ahead_of_turn() {
        struct OutOfOrderManager {
            inner: EchoTransactionManager,
        }

        #[async_trait::async_trait]
        impl TransactionManager for OutOfOrderManager {
            async fn execute_batch(
                &self,
                request: &BatchUserRequest,
            ) -> Option<bft_types::BatchUserResponse> {
                self.inner.execute_batch(request).await
            }

            fn is_out_of_order(&self) -> bool {
                true
            }
        }

        let manager = Arc::new(OutOfOrderManager {
            inner: EchoTransactionManager::new(),
        });
        let duplicate_manager = DuplicateManager::with_defaults();
        let stats = Arc::new(Stats::new());
        let (tx, mut rx) = unbounded_channel();
        let pool = Arc::new(CollectorPool::new(64));
        let (executor, _next) =
            TransactionExecutor::new(manager.clone(), duplicate_manager.clone(), pool, stats.clone(), 16, 1, true, tx);
        let (commit_tx, commit_rx) = unbounded_channel();
        let handle = executor.spawn(commit_rx);

        // seq 2 arrives before seq 1 is dispatchable; the OOO path still
        // runs it speculatively without waiting on seq 1.
        commit_tx.send(committed(2, vec![b"b".to_vec()])).unwrap();
        tokio::task::yield_now().await;
        assert_eq!(stats.ooo_execute.load(Ordering::Relaxed), 1);

        commit_tx.send(committed(1, vec![b"a".to_vec()])).unwrap();
        drop(commit_tx);
        handle.await.unwrap();
        tokio::task::yield_now().await;

        assert_eq!(manager.inner.executed_count(), 2);
        assert_eq!(stats.ooo_execute.load(Ordering::Relaxed), 2);
        let _ = rx.recv().await;
        let _ = rx.recv().await;
        duplicate_manager.stop();
    }
}
