//! Wires the crates under `bft-{types,crypto,net,consensus}` into one
//! running replica or client process: builds the verifier, the broadcaster,
//! the executor/commitment/response pipeline, and a `ConsensusManager`, then
//! drives a TCP accept loop and the heartbeat loop.
//!
//! Grounded on `bft_consensus::manager`'s own `make_manager` test helper,
//! which is the only place in the core that wires every piece together; this
//! module is that same wiring promoted to a long-running process, in the
//! style of the teacher's `guts_p2p::Node` construction and `guts-node::main`.

use crate::config::NodeConfig;
use anyhow::{Context, Result};
use bft_consensus::{
    Commitment, CommitmentHandle, CollectorPool, ConsensusManager, ConsensusManagerConfig,
    DuplicateManager, PerformanceManager, ResponseManager, SharedBroadcaster, Stats, SystemInfo,
    TransactionExecutor, TransactionManager,
};
use bft_crypto::{InMemoryVerifier, Keypair, Verifier};
use bft_net::{Channel, ReplicaCommunicator, TcpListenerChannel};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Whether a process participates in ordering (`Replica`) or only submits
/// batches and waits on `f+1` replies (`Client`). Only a client builds a
/// [`PerformanceManager`] (spec §4.I).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRole {
    /// Runs the full ordering/execution pipeline and answers peer traffic.
    Replica,
    /// Submits batches through [`PerformanceManager`] and waits for quorum.
    Client,
}

/// A running replica/client process: the dispatcher plus every background
/// task it spawned. Dropping this does not stop those tasks — call
/// [`Node::shutdown`] first.
pub struct Node {
    /// The dispatcher every inbound TCP frame is handed to.
    pub manager: Arc<ConsensusManager>,
    /// Shared counters this process exposes over `/metrics` and `/health`.
    pub stats: Arc<Stats>,
    /// Set only for [`NodeRole::Client`] processes.
    pub performance_manager: Option<Arc<PerformanceManager>>,
    accept_task: JoinHandle<()>,
    heartbeat_task: JoinHandle<()>,
    executor_task: JoinHandle<()>,
    response_task: JoinHandle<()>,
    intake_task: Option<JoinHandle<()>>,
}

impl Node {
    /// Starts a process from `config` in the given `role`.
    ///
    /// `transaction_manager` is the application contract of spec §6.4;
    /// `bft-node` itself only ships [`bft_consensus::EchoTransactionManager`]
    /// as a reference implementation for its own integration tests —
    /// concrete applications are out of scope (spec §1).
    pub async fn start<T: TransactionManager + 'static>(
        config: &NodeConfig,
        role: NodeRole,
        transaction_manager: Arc<T>,
    ) -> Result<Self> {
        let replica = &config.replica;
        let self_id = replica.self_info.id;

        let keypair = match &replica.private_key {
            Some(hex_key) => {
                Keypair::from_hex(hex_key).context("parsing configured private key")?
            }
            None => Keypair::generate(),
        };
        let self_public_key = keypair.public_key_bytes().to_vec();

        let verifier: Arc<dyn Verifier> =
            Arc::new(InMemoryVerifier::with_signing_key(self_id, keypair));

        let communicator = ReplicaCommunicator::new(
            self_id,
            replica.replicas.clone(),
            verifier.clone(),
            replica.tcp_batch_num,
        );
        let broadcaster: SharedBroadcaster = communicator;

        let initial_primary = replica.replicas.first().map_or(self_id, |r| r.id);
        let system_info = Arc::new(SystemInfo::new(replica.replicas.clone(), initial_primary));

        let pool = Arc::new(CollectorPool::new(replica.max_process_txn));
        let duplicate_manager = DuplicateManager::new(
            Duration::from_micros(replica.duplicate_check_frequency_useconds),
            Duration::from_micros(replica.duplicate_check_window_useconds),
        );

        let stats = Arc::new(Stats::new());

        let (response_tx, response_rx) = tokio::sync::mpsc::unbounded_channel();
        let (executor, next_execute_seq) = TransactionExecutor::new(
            transaction_manager,
            duplicate_manager.clone(),
            pool.clone(),
            stats.clone(),
            replica.bucket_num,
            replica.execute_thread_num,
            replica.enable_ooo_execution,
            response_tx,
        );

        let (executor_tx, commit_rx) = tokio::sync::mpsc::unbounded_channel();
        let commitment: Arc<dyn CommitmentHandle> = Arc::new(Commitment::new(
            self_id,
            replica.quorum(),
            replica.max_process_txn as u64,
            broadcaster.clone(),
            system_info.clone(),
            pool,
            duplicate_manager,
            verifier.clone(),
            stats.clone(),
            next_execute_seq,
            executor_tx,
        ));
        let executor_task = executor.spawn(commit_rx);

        let performance_manager = match role {
            NodeRole::Client => Some(Arc::new(PerformanceManager::new(
                self_id,
                replica.client_quorum(),
                Duration::from_millis(replica.view_change_timeout_ms),
                broadcaster.clone(),
                stats.clone(),
            ))),
            NodeRole::Replica => None,
        };

        let (response_manager, intake_rx) = ResponseManager::new(
            broadcaster.clone(),
            stats.clone(),
            system_info.clone(),
            replica.client_batch_num,
            Duration::from_millis(replica.client_batch_wait_time_ms),
            replica.max_process_txn,
        );
        let response_task = response_manager.clone().spawn(response_rx);
        let intake_task = match role {
            NodeRole::Replica => Some(response_manager.clone().spawn_intake(intake_rx)),
            NodeRole::Client => None,
        };

        let manager_config = ConsensusManagerConfig {
            self_id,
            self_ip: replica.self_info.ip.clone(),
            self_port: replica.self_info.port,
            self_region: 0,
            self_public_key,
            verifier_enabled: replica.signature_verifier_enabled,
            min_data_receive_num: replica.min_data_receive_num,
        };
        let response_manager_for_dispatch = match role {
            NodeRole::Replica => Some(response_manager),
            NodeRole::Client => None,
        };
        let manager = Arc::new(ConsensusManager::new(
            manager_config,
            verifier,
            system_info,
            commitment,
            performance_manager.clone(),
            response_manager_for_dispatch,
            broadcaster,
            stats.clone(),
        ));

        let heartbeat_task = if replica.hb_enabled {
            manager
                .clone()
                .spawn_heartbeat_loop(Duration::from_secs(replica.heartbeat_interval_secs))
        } else {
            tokio::spawn(std::future::pending::<()>())
        };

        let bind_ip: IpAddr = replica
            .self_info
            .ip
            .parse()
            .unwrap_or(IpAddr::from([0, 0, 0, 0]));
        let listen_addr = SocketAddr::new(bind_ip, replica.self_info.port);
        let listener = TcpListenerChannel::listen(listen_addr)
            .await
            .context("binding replica TCP listener")?;

        let accept_manager = manager.clone();
        let accept_task = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((channel, peer)) => {
                        let manager = accept_manager.clone();
                        tokio::spawn(serve_peer(manager, channel, peer));
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "accept failed");
                    }
                }
            }
        });

        Ok(Self {
            manager,
            stats,
            performance_manager,
            accept_task,
            heartbeat_task,
            executor_task,
            response_task,
            intake_task,
        })
    }

    /// Aborts every background task this process owns. Used on graceful
    /// shutdown and by tests that tear a `Node` down mid-scenario.
    pub fn shutdown(&self) {
        self.accept_task.abort();
        self.heartbeat_task.abort();
        self.executor_task.abort();
        self.response_task.abort();
        if let Some(task) = &self.intake_task {
            task.abort();
        }
    }
}

/// Reads length-delimited frames off one accepted connection for as long as
/// the peer keeps it open, handing each to `manager.process` (spec §4.J).
async fn serve_peer(
    manager: Arc<ConsensusManager>,
    mut channel: bft_net::TcpChannel,
    peer: SocketAddr,
) {
    loop {
        match channel.recv_raw_message().await {
            Ok(raw) => {
                if let Err(e) = manager.process(&raw).await {
                    tracing::debug!(error = %e, %peer, "dropping inbound message");
                }
            }
            Err(e) => {
                tracing::debug!(error = %e, %peer, "connection closed");
                break;
            }
        }
    }
}
