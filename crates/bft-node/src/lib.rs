//! # bft-node
//!
//! Binary wiring and the ambient ops stack for a BFT replica or client
//! process built on `bft-types`/`bft-crypto`/`bft-net`/`bft-consensus`.
//! Nothing in here is part of the consensus protocol itself — it loads
//! configuration, wires the core's pieces into a running [`app::Node`],
//! and exposes the health/metrics surface an operator points a probe at.
//!
//! ## Modules
//!
//! - [`config`] — layered env/file `NodeConfig`
//! - [`app`] — constructs a [`app::Node`] from a `NodeConfig`
//! - [`observability`] — structured logging and Prometheus metrics
//! - [`health`] — liveness/readiness/startup HTTP endpoints
//! - [`resilience`] — retry/circuit-breaker/rate-limit helpers for the
//!   ambient HTTP surface (not the hot consensus path, which has its own
//!   retry count per spec §4.A)

pub mod app;
pub mod config;
pub mod health;
pub mod observability;
pub mod resilience;
