//! Replica/client roster and membership message types. See spec §3 (SystemInfo),
//! §4.J (heartbeat) and §6.2 (`replicas`, `self_info`).

use serde::{Deserialize, Serialize};

/// A single replica or client's network identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaInfo {
    /// Node id, unique within its roster (replicas and clients are separate
    /// id spaces).
    pub id: u32,
    /// IP address or hostname.
    pub ip: String,
    /// TCP port.
    pub port: u16,
}

impl ReplicaInfo {
    /// Creates a new replica/client descriptor.
    #[must_use]
    pub fn new(id: u32, ip: impl Into<String>, port: u16) -> Self {
        Self {
            id,
            ip: ip.into(),
            port,
        }
    }

    /// Returns whether this descriptor is usable as a broadcast destination.
    ///
    /// An empty ip or zero port marks a placeholder entry that
    /// `SystemInfo::add_replica` must ignore (spec §4.C).
    #[must_use]
    pub fn is_routable(&self) -> bool {
        !self.ip.is_empty() && self.port != 0
    }
}

/// A tagged request understood by `SystemInfo::process_request`. The variant
/// set is intentionally open — only `AddReplica` is handled today, per spec
/// §4.C.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SystemInfoRequest {
    /// Admit a new replica into the roster.
    AddReplica(ReplicaInfo),
}

/// Whether a [`PublicKeyInfo`] entry describes a replica or a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeType {
    /// A consensus-participating replica.
    Replica,
    /// A client proxy.
    Client,
}

/// One public key carried in a heartbeat, to be handed to the verifier's key
/// store (spec §4.J, §6.5 `add_public_key`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicKeyInfo {
    /// The node id this key belongs to.
    pub node_id: u32,
    /// Replica or client.
    pub node_type: NodeType,
    /// Region identifier, used to scope replica-roster admission to peers in
    /// our own region.
    pub region: u32,
    /// Network address, required for replica entries.
    pub ip: String,
    /// TCP port, required for replica entries.
    pub port: u16,
    /// Raw public key bytes (algorithm is implied by the `Verifier` impl).
    pub key_bytes: Vec<u8>,
}

/// The payload of a `HeartBeat` request (spec §4.J).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartBeatInfo {
    /// The sending node's id.
    pub sender: u32,
    /// The sending node's ip.
    pub ip: String,
    /// The sending node's port.
    pub port: u16,
    /// The sender's believed current primary id.
    pub primary: u32,
    /// The sender's believed current view.
    pub version: u64,
    /// Public keys the sender wants to distribute.
    pub public_keys: Vec<PublicKeyInfo>,
    /// Monotonic heartbeat-round counter, used to drop stale reorderings.
    pub hb_version: u64,
    /// Per-peer last-seen heartbeat round, echoed back for diagnostics.
    pub node_version: Vec<u64>,
}
