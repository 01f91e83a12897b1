//! The `TransactionManager` interface (spec §6.4): the sole contract
//! concrete applications (key-value store, smart-contract engine, graph DB)
//! implement against. Those applications are themselves out of scope
//! (spec §1); this module only owns the trait and a reference
//! implementation used by this crate's own integration tests, grounded on
//! `executor/common/mock_transaction_manager.h`.

use async_trait::async_trait;
use bft_types::{BatchUserRequest, BatchUserResponse};
use parking_lot::Mutex;

/// A one-shot execution plan produced by [`TransactionManager::prepare`] for
/// the bucketed parallel-execute path (spec §4.H). Opaque to the executor;
/// only the transaction manager that produced it knows how to run it.
pub type ExecutionPlan = Vec<u8>;

/// The application contract the core executes against.
///
/// Implementations must be `Send + Sync`: the executor's ordering task and
/// every executor thread call into the same instance concurrently (serially
/// by seq for `execute_batch`, per spec §4.H's "called in strict seq order
/// when single-threaded execute").
#[async_trait]
pub trait TransactionManager: Send + Sync {
    /// Runs every user request in `request` and returns the aggregate
    /// response, or `None` for a fire-and-forget batch that produces no
    /// reply.
    async fn execute_batch(&self, request: &BatchUserRequest) -> Option<BatchUserResponse>;

    /// Splits a batch into an execution plan for the bucketed parallel path
    /// (spec §4.H). The default implementation returns an empty plan list,
    /// meaning this application does not opt into the parallel split.
    async fn prepare(&self, _request: &BatchUserRequest) -> Vec<ExecutionPlan> {
        Vec::new()
    }

    /// Runs a batch of plans produced by `prepare`, returning one opaque
    /// result per plan, same order. Only called when `prepare` returned a
    /// non-empty plan list.
    async fn execute_plan(&self, _plans: &[ExecutionPlan]) -> Vec<Vec<u8>> {
        Vec::new()
    }

    /// Whether this application's execution is safe to run speculatively,
    /// ahead of its in-order turn (spec §4.H, §9). Defaults to `false`.
    fn is_out_of_order(&self) -> bool {
        false
    }

    /// Whether executing a batch should produce a reply to the proxy.
    /// Defaults to `true`.
    fn need_response(&self) -> bool {
        true
    }
}

/// A reference `TransactionManager` that echoes each user request back as
/// its own response and records every executed batch, used by this crate's
/// integration tests (spec §8 end-to-end scenarios).
#[derive(Default)]
pub struct EchoTransactionManager {
    executed: Mutex<Vec<BatchUserRequest>>,
}

impl EchoTransactionManager {
    /// Creates a fresh echo manager with no execution history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The batches executed so far, in execution order.
    #[must_use]
    pub fn executed_batches(&self) -> Vec<BatchUserRequest> {
        self.executed.lock().clone()
    }

    /// The number of batches executed so far.
    #[must_use]
    pub fn executed_count(&self) -> usize {
        self.executed.lock().len()
    }
}

#[async_trait]
impl TransactionManager for EchoTransactionManager {
    async fn execute_batch(&self, request: &BatchUserRequest) -> Option<BatchUserResponse> {
        self.executed.lock().push(request.clone());
        Some(BatchUserResponse {
            seq: request.seq,
            proxy_id: request.proxy_id,
            local_id: request.local_id,
            createtime: request.createtime,
            hash: request.hash.clone(),
            responses: request.user_requests.clone(),
            ret: 0,
        })
    }
}
