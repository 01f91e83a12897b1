//! Wire types and configuration for the BFT replica core.
//!
//! This crate has no knowledge of networking, cryptography, or consensus
//! logic — it only defines the on-wire `Request`/`Envelope` shapes (spec §3,
//! §6.1), the batching types exchanged with clients, the membership/
//! heartbeat payloads, and the `ReplicaConfig` knobs of spec §6.2. Everything
//! here derives `serde::{Serialize, Deserialize}` and round-trips through
//! `bincode` for the wire path; `serde_json`/`serde_yaml` are reserved for
//! config files and human-readable logging.

pub mod batch;
pub mod broadcast;
pub mod config;
pub mod error;
pub mod membership;
pub mod request;

pub use batch::{BatchUserRequest, BatchUserResponse};
pub use broadcast::BroadcastData;
pub use config::ReplicaConfig;
pub use error::{Result, TypesError};
pub use membership::{HeartBeatInfo, NodeType, PublicKeyInfo, ReplicaInfo, SystemInfoRequest};
pub use request::{Envelope, HashType, Request, RequestType, SignatureInfo};
