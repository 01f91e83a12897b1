//! `SystemInfo` (spec §4.C): a trivial atomic holder for the process-wide
//! view of the current primary, view number, and replica roster.

use bft_types::{ReplicaInfo, SystemInfoRequest};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Process-wide, shared view of cluster membership and the current view.
///
/// Constructed from config; mutated on view change and on add-replica
/// notifications (spec §3). Cheap to clone via `Arc` — every subsystem that
/// needs to know "who is primary" or "who are my peers" holds one.
pub struct SystemInfo {
    primary_id: AtomicU32,
    view: AtomicU64,
    replicas: RwLock<Vec<ReplicaInfo>>,
}

impl SystemInfo {
    /// Builds a `SystemInfo` for a roster with the given starting primary.
    #[must_use]
    pub fn new(replicas: Vec<ReplicaInfo>, primary_id: u32) -> Self {
        Self {
            primary_id: AtomicU32::new(primary_id),
            view: AtomicU64::new(1),
            replicas: RwLock::new(replicas),
        }
    }

    /// The current primary's replica id.
    #[must_use]
    pub fn primary_id(&self) -> u32 {
        self.primary_id.load(Ordering::Acquire)
    }

    /// The current view number.
    #[must_use]
    pub fn view(&self) -> u64 {
        self.view.load(Ordering::Acquire)
    }

    /// Sets the current view and its primary atomically with respect to
    /// readers of either field individually (each field is still updated
    /// independently; callers needing a consistent snapshot should read
    /// `view()` before `primary_id()`).
    pub fn set_view(&self, view: u64, primary_id: u32) {
        self.view.store(view, Ordering::Release);
        self.primary_id.store(primary_id, Ordering::Release);
    }

    /// Whether `self_id` is the primary for the current view.
    #[must_use]
    pub fn is_primary(&self, self_id: u32) -> bool {
        self.primary_id() == self_id
    }

    /// A snapshot of the current replica roster.
    #[must_use]
    pub fn replicas(&self) -> Vec<ReplicaInfo> {
        self.replicas.read().clone()
    }

    /// Number of known replicas.
    #[must_use]
    pub fn replica_count(&self) -> usize {
        self.replicas.read().len()
    }

    /// Admits a new replica into the roster. Idempotent by id: a duplicate
    /// id, an empty ip, or a zero port are all ignored (spec §4.C).
    ///
    /// Returns whether the roster actually changed.
    pub fn add_replica(&self, info: ReplicaInfo) -> bool {
        if !info.is_routable() {
            return false;
        }
        let mut replicas = self.replicas.write();
        if replicas.iter().any(|r| r.id == info.id) {
            return false;
        }
        replicas.push(info);
        true
    }

    /// Processes a tagged `SystemInfoRequest`. The variant set is open; only
    /// `AddReplica` is handled today (spec §4.C).
    pub fn process_request(&self, request: SystemInfoRequest) -> bool {
        match request {
            SystemInfoRequest::AddReplica(info) => self.add_replica(info),
        }
    }
}
