//! The three-phase consensus core for a BFT replica (spec §2, §4).
//!
//! This crate owns no networking or wire types of its own — it builds on
//! `bft-net`'s `Broadcaster`/`Channel` seam and `bft-types`'s request/config
//! shapes to implement the pre-prepare/prepare/commit state machine
//! (`commitment`), in-order execution (`executor`), client-facing response
//! aggregation (`response`), and the dispatcher that ties them to incoming
//! messages (`manager`).

pub mod broadcaster;
pub mod collector;
pub mod collector_pool;
pub mod commitment;
pub mod duplicate_manager;
pub mod error;
pub mod executor;
pub mod manager;
pub mod response;
pub mod stats;
pub mod system_info;
pub mod transaction_manager;

pub use broadcaster::{Broadcaster, SharedBroadcaster};
pub use collector::{CollectorStatus, TransactionCollector, VoteType};
pub use collector_pool::CollectorPool;
pub use commitment::{Commitment, CommitmentHandle, CommittedMessage};
pub use duplicate_manager::DuplicateManager;
pub use error::{ConsensusError, Result};
pub use executor::{ExecutedResponse, TransactionExecutor};
pub use manager::{ConsensusManager, ConsensusManagerConfig};
pub use response::{PerformanceManager, ResponseManager};
pub use stats::Stats;
pub use system_info::SystemInfo;
pub use transaction_manager::{EchoTransactionManager, ExecutionPlan, TransactionManager};
