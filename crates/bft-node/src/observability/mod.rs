//! # Observability Module
//!
//! - **Structured Logging**: JSON or pretty logs via `tracing-subscriber`
//! - **Prometheus Metrics**: the consensus `Stats` surface (spec §6.6),
//!   synced to a `prometheus_client` registry on each scrape
//!
//! ## Usage
//!
//! ```rust,no_run
//! use bft_node::observability::{init_logging, MetricsState};
//!
//! init_logging("info", true);
//! let metrics = MetricsState::new();
//! ```

mod logging;
mod metrics;

pub use logging::{init_logging, LogFormat};
pub use metrics::{MetricsState, METRICS};
