//! The observability surface of spec §6.6: a counter registry, a readiness
//! flag, and a current-primary query.
//!
//! This crate only owns the counters themselves — exporting them as
//! Prometheus gauges/histograms is ambient-stack work that lives in
//! `bft-node::observability::metrics` (grounded on the teacher's
//! `guts-node::observability::metrics`), which reads these atomics on scrape.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// A minimal running-average latency histogram: sum and count of observed
/// latencies in microseconds. `bft-node` turns this into a proper
/// `prometheus_client` histogram; this crate only needs to accumulate it
/// lock-free on the hot path.
#[derive(Debug, Default)]
pub struct LatencyHistogram {
    count: AtomicU64,
    sum_micros: AtomicU64,
    max_micros: AtomicU64,
}

impl LatencyHistogram {
    /// Records one observed latency.
    pub fn observe(&self, latency: std::time::Duration) {
        let micros = latency.as_micros().min(u128::from(u64::MAX)) as u64;
        self.count.fetch_add(1, Ordering::Relaxed);
        self.sum_micros.fetch_add(micros, Ordering::Relaxed);
        self.max_micros.fetch_max(micros, Ordering::Relaxed);
    }

    /// Number of observations recorded.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Mean latency in microseconds, or `0` if nothing has been observed.
    #[must_use]
    pub fn mean_micros(&self) -> u64 {
        let count = self.count();
        if count == 0 {
            return 0;
        }
        self.sum_micros.load(Ordering::Relaxed) / count
    }

    /// Largest latency observed so far, in microseconds.
    #[must_use]
    pub fn max_micros(&self) -> u64 {
        self.max_micros.load(Ordering::Relaxed)
    }
}

/// Lock-free counters and readiness for one replica/client process.
///
/// Every field is an atomic; no field requires external locking, matching
/// spec §5's "no global mutable state beyond `Stats`".
#[derive(Debug, Default)]
pub struct Stats {
    /// Client requests accepted by the response path.
    pub client_calls: AtomicU64,
    /// Envelopes handed to the broadcast path (pre-batching).
    pub broadcast_msgs: AtomicU64,
    /// Batches proposed by this replica as primary.
    pub propose: AtomicU64,
    /// Seqs that reached `ReadyExecute` (committed).
    pub commit: AtomicU64,
    /// Seqs handed to the transaction manager for execution.
    pub execute: AtomicU64,
    /// Seqs whose execution completed and produced a response.
    pub execute_done: AtomicU64,
    /// Sequence assignments refused due to a full window (spec §7 back-pressure).
    pub seq_fail: AtomicU64,
    /// Speculative out-of-order executions run ahead of a seq's official
    /// turn (spec §4.H, §9). Orthogonal to `execute`/`execute_done`: the
    /// in-order pipeline still produces the one official response.
    pub ooo_execute: AtomicU64,
    /// End-to-end client latency, from batch submission to f+1 replies.
    pub latency: LatencyHistogram,
    /// Whether this process has observed enough peers to consider itself
    /// ready (spec §4.J). Readiness is an observability signal, not a gate.
    pub is_ready: AtomicBool,
}

impl Stats {
    /// Creates a fresh, zeroed counter set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether this process is ready, per the last heartbeat-driven update.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.is_ready.load(Ordering::Relaxed)
    }

    /// Marks readiness. Idempotent; only flips forward in normal operation
    /// but callers may reset it for tests.
    pub fn set_ready(&self, ready: bool) {
        self.is_ready.store(ready, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latency_histogram_tracks_mean_and_max() {
        let hist = LatencyHistogram::default();
        hist.observe(std::time::Duration::from_micros(100));
        hist.observe(std::time::Duration::from_micros(300));
        assert_eq!(hist.count(), 2);
        assert_eq!(hist.mean_micros(), 200);
        assert_eq!(hist.max_micros(), 300);
    }

    #[test]
    fn empty_histogram_has_zero_mean() {
        let hist = LatencyHistogram::default();
        assert_eq!(hist.mean_micros(), 0);
    }

    #[test]
    fn stats_readiness_defaults_false() {
        let stats = Stats::new();
        assert!(!stats.is_ready());
        stats.set_ready(true);
        assert!(stats.is_ready());
    }
}
