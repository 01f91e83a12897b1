//! `ReplicaConfig`: the knobs of spec §6.2, with the stated defaults.
//!
//! This is a plain data struct — loading it from a file, layering env-var
//! overrides, and validating it is ambient-stack work that lives in
//! `bft-node::config` (grounded on the teacher's `guts-node::config`
//! env-over-file-over-default pattern). This crate only owns the shape and
//! the defaults the spec actually names.

use crate::membership::ReplicaInfo;
use serde::{Deserialize, Serialize};

/// Every configuration key recognized by the core, per spec §6.2.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicaConfig {
    /// This node's own id/ip/port.
    pub self_info: ReplicaInfo,
    /// The full replica roster; must have at least `3f + 1` entries.
    pub replicas: Vec<ReplicaInfo>,
    /// Hex-encoded Ed25519 private key for envelope/data signing.
    pub private_key: Option<String>,
    /// Human-readable public key certificate metadata distributed at
    /// startup (region, node type) alongside the raw key bytes.
    pub public_key_cert_info: Option<String>,
    /// Maximum user requests batched into one client-side proposal.
    pub client_batch_num: usize,
    /// Maximum time a client-side batch waits to fill before being sent.
    pub client_batch_wait_time_ms: u64,
    /// Window size `W`: the maximum number of in-flight sequence numbers.
    pub max_process_txn: usize,
    /// Size of the dispatcher's worker pool.
    pub worker_num: usize,
    /// Number of dispatcher input-worker threads draining parsed requests.
    pub input_worker_num: usize,
    /// Number of outbound dispatch worker threads.
    pub output_worker_num: usize,
    /// Maximum envelopes packed into one `BroadcastData` bundle.
    pub tcp_batch_num: usize,
    /// Client-side retry timer for un-acknowledged batches.
    pub view_change_timeout_ms: u64,
    /// Reserved for a future checkpoint layer; must be tolerated as zero.
    pub checkpoint_water_mark: u64,
    /// Reserved for a future checkpoint layer; must be tolerated as false.
    pub enable_checkpoint: bool,
    /// Whether envelope/data signatures are checked.
    pub signature_verifier_enabled: bool,
    /// Whether the heartbeat loop runs.
    pub hb_enabled: bool,
    /// `DuplicateManager` eviction tick period, in microseconds.
    pub duplicate_check_frequency_useconds: u64,
    /// `DuplicateManager` sliding-window size, in microseconds.
    pub duplicate_check_window_useconds: u64,
    /// Executor threads used for the bucketed parallel-execute path.
    pub execute_thread_num: usize,
    /// Bucket count for the parallel-execute scheme (spec §4.H).
    pub bucket_num: usize,
    /// Whether the application opted into speculative out-of-order execution.
    pub enable_ooo_execution: bool,
    /// Heartbeat round interval in seconds (1s in test mode per spec §4.J).
    pub heartbeat_interval_secs: u64,
    /// Number of distinct replica keys required before `is_ready` flips true;
    /// defaults to `2f + 1` for the configured roster at construction time.
    pub min_data_receive_num: usize,
}

impl Default for ReplicaConfig {
    fn default() -> Self {
        Self {
            self_info: ReplicaInfo::new(0, "", 0),
            replicas: Vec::new(),
            private_key: None,
            public_key_cert_info: None,
            client_batch_num: 100,
            client_batch_wait_time_ms: 100,
            max_process_txn: 2048,
            worker_num: 64,
            input_worker_num: 1,
            output_worker_num: 1,
            tcp_batch_num: 100,
            view_change_timeout_ms: 60_000,
            checkpoint_water_mark: 0,
            enable_checkpoint: false,
            signature_verifier_enabled: true,
            hb_enabled: true,
            duplicate_check_frequency_useconds: 5_000_000,
            duplicate_check_window_useconds: 20_000_000,
            execute_thread_num: 1,
            bucket_num: 1024,
            enable_ooo_execution: false,
            heartbeat_interval_secs: 60,
            min_data_receive_num: 1,
        }
    }
}

impl ReplicaConfig {
    /// Number of replicas `n`.
    #[must_use]
    pub fn n(&self) -> usize {
        self.replicas.len()
    }

    /// Maximum tolerated Byzantine-faulty replicas, `f = floor((n - 1) / 3)`.
    #[must_use]
    pub fn f(&self) -> usize {
        (self.n().saturating_sub(1)) / 3
    }

    /// Prepare/commit quorum size, `2f + 1`.
    #[must_use]
    pub fn quorum(&self) -> usize {
        2 * self.f() + 1
    }

    /// Client liveness threshold, `f + 1` matching replies.
    #[must_use]
    pub fn client_quorum(&self) -> usize {
        self.f() + 1
    }

    /// Returns whether the configured roster meets the minimum `3f + 1` size.
    #[must_use]
    pub fn has_valid_roster(&self) -> bool {
        self.n() >= 3 * self.f() + 1 && self.n() >= 4
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roster(n: u32) -> Vec<ReplicaInfo> {
        (0..n)
            .map(|i| ReplicaInfo::new(i, "127.0.0.1", 9000 + i as u16))
            .collect()
    }

    #[test]
    fn quorum_math_four_replicas() {
        let mut cfg = ReplicaConfig::default();
        cfg.replicas = roster(4);
        assert_eq!(cfg.f(), 1);
        assert_eq!(cfg.quorum(), 3);
        assert_eq!(cfg.client_quorum(), 2);
        assert!(cfg.has_valid_roster());
    }

    #[test]
    fn quorum_math_seven_replicas() {
        let mut cfg = ReplicaConfig::default();
        cfg.replicas = roster(7);
        assert_eq!(cfg.f(), 2);
        assert_eq!(cfg.quorum(), 5);
        assert_eq!(cfg.client_quorum(), 3);
    }

    #[test]
    fn undersized_roster_is_invalid() {
        let mut cfg = ReplicaConfig::default();
        cfg.replicas = roster(3);
        assert!(!cfg.has_valid_roster());
    }

    #[test]
    fn defaults_match_spec() {
        let cfg = ReplicaConfig::default();
        assert_eq!(cfg.client_batch_num, 100);
        assert_eq!(cfg.max_process_txn, 2048);
        assert_eq!(cfg.view_change_timeout_ms, 60_000);
        assert!(cfg.signature_verifier_enabled);
        assert!(cfg.hb_enabled);
    }
}
