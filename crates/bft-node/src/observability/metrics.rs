//! Prometheus metrics collection.
//!
//! `bft-consensus::Stats` accumulates its counters as plain atomics so the
//! hot consensus path never touches a lock or a `prometheus_client` type
//! (spec §6.6). This module owns the Prometheus-facing side: a registry of
//! gauges/histograms that are synced from a `Stats` snapshot on each scrape,
//! grounded on the teacher's `guts-node::observability::metrics`, relabeled
//! from git/HTTP counters to the consensus surface.

use bft_consensus::Stats;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Global metrics state, constructed lazily on first access.
pub static METRICS: Lazy<MetricsState> = Lazy::new(MetricsState::new);

/// Metrics state container for one replica/client process.
#[derive(Clone)]
pub struct MetricsState {
    /// Prometheus registry.
    pub registry: Arc<RwLock<Registry>>,
    /// Client requests accepted by the response path.
    pub client_calls: Gauge,
    /// Envelopes handed to the broadcast path.
    pub broadcast_msgs: Gauge,
    /// Batches proposed by this replica as primary.
    pub propose: Gauge,
    /// Seqs that reached `ReadyExecute` (committed).
    pub commit: Gauge,
    /// Seqs handed to the transaction manager for execution.
    pub execute: Gauge,
    /// Seqs whose execution completed and produced a response.
    pub execute_done: Gauge,
    /// Sequence assignments refused due to a full window.
    pub seq_fail: Gauge,
    /// Speculative out-of-order executions run ahead of a seq's turn.
    pub ooo_execute: Gauge,
    /// Whether this process currently considers itself ready (0/1).
    pub ready: Gauge,
    /// End-to-end client latency distribution, in seconds.
    pub latency_seconds: Histogram,
}

impl Default for MetricsState {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsState {
    /// Create a new metrics state with all metrics registered.
    #[must_use]
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let client_calls = Gauge::default();
        registry.register(
            "bft_client_calls",
            "Client requests accepted by the response path",
            client_calls.clone(),
        );

        let broadcast_msgs = Gauge::default();
        registry.register(
            "bft_broadcast_msgs",
            "Envelopes handed to the broadcast path",
            broadcast_msgs.clone(),
        );

        let propose = Gauge::default();
        registry.register(
            "bft_propose_total",
            "Batches proposed by this replica as primary",
            propose.clone(),
        );

        let commit = Gauge::default();
        registry.register(
            "bft_commit_total",
            "Sequence numbers that reached quorum commit",
            commit.clone(),
        );

        let execute = Gauge::default();
        registry.register(
            "bft_execute_total",
            "Sequence numbers handed to the transaction manager",
            execute.clone(),
        );

        let execute_done = Gauge::default();
        registry.register(
            "bft_execute_done_total",
            "Sequence numbers whose execution completed",
            execute_done.clone(),
        );

        let seq_fail = Gauge::default();
        registry.register(
            "bft_seq_fail_total",
            "Sequence assignments refused due to a full window",
            seq_fail.clone(),
        );

        let ooo_execute = Gauge::default();
        registry.register(
            "bft_ooo_execute_total",
            "Speculative out-of-order executions run ahead of a seq's turn",
            ooo_execute.clone(),
        );

        let ready = Gauge::default();
        registry.register(
            "bft_ready",
            "Whether this process currently considers itself ready",
            ready.clone(),
        );

        let latency_seconds = Histogram::new(exponential_buckets(0.0001, 2.0, 16));
        registry.register(
            "bft_client_latency_seconds",
            "End-to-end client latency from batch submission to f+1 replies",
            latency_seconds.clone(),
        );

        Self {
            registry: Arc::new(RwLock::new(registry)),
            client_calls,
            broadcast_msgs,
            propose,
            commit,
            execute,
            execute_done,
            seq_fail,
            ooo_execute,
            ready,
            latency_seconds,
        }
    }

    /// Syncs every gauge from a live `Stats` snapshot. Intended to run on
    /// each `/metrics` scrape rather than on the hot path.
    pub fn sync_from_stats(&self, stats: &Stats) {
        self.client_calls.set(stats.client_calls.load(Ordering::Relaxed) as i64);
        self.broadcast_msgs.set(stats.broadcast_msgs.load(Ordering::Relaxed) as i64);
        self.propose.set(stats.propose.load(Ordering::Relaxed) as i64);
        self.commit.set(stats.commit.load(Ordering::Relaxed) as i64);
        self.execute.set(stats.execute.load(Ordering::Relaxed) as i64);
        self.execute_done.set(stats.execute_done.load(Ordering::Relaxed) as i64);
        self.seq_fail.set(stats.seq_fail.load(Ordering::Relaxed) as i64);
        self.ooo_execute.set(stats.ooo_execute.load(Ordering::Relaxed) as i64);
        self.ready.set(i64::from(stats.is_ready()));

        let mean_micros = stats.latency.mean_micros();
        if mean_micros > 0 {
            self.latency_seconds.observe(mean_micros as f64 / 1_000_000.0);
        }
    }

    /// Encode metrics for Prometheus scraping.
    #[must_use]
    pub fn encode(&self) -> String {
        let mut buffer = String::new();
        let registry = self.registry.read();
        prometheus_client::encoding::text::encode(&mut buffer, &registry)
            .expect("failed to encode metrics");
        buffer
    }
}
