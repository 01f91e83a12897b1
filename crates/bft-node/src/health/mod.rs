//! # Health Check Module
//!
//! - **Liveness Probe**: Is the process running?
//! - **Readiness Probe**: Has this replica/client observed enough peers to
//!   be considered ready (spec §4.J), and is the consensus core answering?
//! - **Startup Probe**: Has initial wiring completed?
//!
//! Grounded on the teacher's `guts-node::health`, with readiness wired to
//! `bft_consensus::Stats::is_ready` instead of storage/P2P/realtime checks.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use axum::Router;
//! use bft_node::health::{health_routes, HealthState};
//!
//! let health_state = HealthState::new();
//! health_state.set_startup_complete(true);
//!
//! let app: Router<()> = Router::new()
//!     .merge(health_routes(health_state));
//! ```

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use bft_consensus::Stats;
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Health status values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Component is healthy.
    Up,
    /// Component is unhealthy.
    Down,
    /// Component status is unknown.
    Unknown,
}

/// Individual component health.
#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    /// Component status.
    pub status: HealthStatus,
    /// Optional additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ComponentHealth {
    /// Create a healthy component.
    #[must_use]
    pub fn up() -> Self {
        Self {
            status: HealthStatus::Up,
            details: None,
        }
    }

    /// Create an unhealthy component with reason.
    #[must_use]
    pub fn down_with_reason(reason: &str) -> Self {
        Self {
            status: HealthStatus::Down,
            details: Some(serde_json::json!({ "reason": reason })),
        }
    }
}

/// Liveness probe response.
#[derive(Debug, Clone, Serialize)]
pub struct LivenessResponse {
    /// Overall status.
    pub status: HealthStatus,
    /// Uptime in seconds.
    pub uptime_seconds: u64,
}

/// Readiness probe response.
#[derive(Debug, Clone, Serialize)]
pub struct ReadinessResponse {
    /// Overall status.
    pub status: HealthStatus,
    /// Component health checks.
    pub checks: ReadinessChecks,
}

/// Readiness component checks.
#[derive(Debug, Clone, Serialize)]
pub struct ReadinessChecks {
    /// Whether `Stats::is_ready()` has flipped true (spec §4.J).
    pub consensus: ComponentHealth,
}

/// Startup probe response.
#[derive(Debug, Clone, Serialize)]
pub struct StartupResponse {
    /// Overall status.
    pub status: HealthStatus,
}

/// Overall health response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status.
    pub status: HealthStatus,
    /// Version info.
    pub version: String,
    /// Uptime in seconds.
    pub uptime_seconds: u64,
    /// Component checks.
    pub checks: ReadinessChecks,
}

/// Health state for tracking process startup and consensus readiness.
#[derive(Clone)]
pub struct HealthState {
    start_time: Instant,
    startup_complete: Arc<AtomicBool>,
    stats: Arc<Stats>,
}

impl HealthState {
    /// Create a new health state over a shared `Stats` handle.
    #[must_use]
    pub fn new(stats: Arc<Stats>) -> Self {
        Self {
            start_time: Instant::now(),
            startup_complete: Arc::new(AtomicBool::new(false)),
            stats,
        }
    }

    /// Get uptime in seconds.
    #[must_use]
    pub fn uptime(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Mark startup as complete.
    pub fn set_startup_complete(&self, complete: bool) {
        self.startup_complete.store(complete, Ordering::SeqCst);
    }

    /// Check if startup is complete.
    #[must_use]
    pub fn is_startup_complete(&self) -> bool {
        self.startup_complete.load(Ordering::SeqCst)
    }

    /// Check if the consensus core considers this process ready.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.stats.is_ready()
    }

    fn consensus_health(&self) -> ComponentHealth {
        if self.stats.is_ready() {
            ComponentHealth::up()
        } else {
            ComponentHealth::down_with_reason("heartbeat quorum not yet observed")
        }
    }

    fn readiness_checks(&self) -> ReadinessChecks {
        ReadinessChecks {
            consensus: self.consensus_health(),
        }
    }
}

/// Create health check routes.
pub fn health_routes<S>(state: HealthState) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new()
        .route("/health", get(health_handler))
        .route("/health/live", get(liveness_handler))
        .route("/health/ready", get(readiness_handler))
        .route("/health/startup", get(startup_handler))
        .with_state(state)
}

async fn health_handler(State(state): State<HealthState>) -> Response {
    let checks = state.readiness_checks();
    let overall_status = if checks.consensus.status == HealthStatus::Up {
        HealthStatus::Up
    } else {
        HealthStatus::Down
    };

    let response = HealthResponse {
        status: overall_status,
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.uptime(),
        checks,
    };

    let status_code = match overall_status {
        HealthStatus::Up => StatusCode::OK,
        _ => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(response)).into_response()
}

async fn liveness_handler(State(state): State<HealthState>) -> Response {
    let response = LivenessResponse {
        status: HealthStatus::Up,
        uptime_seconds: state.uptime(),
    };

    (StatusCode::OK, Json(response)).into_response()
}

async fn readiness_handler(State(state): State<HealthState>) -> Response {
    let checks = state.readiness_checks();
    let overall_status = checks.consensus.status;

    let response = ReadinessResponse {
        status: overall_status,
        checks,
    };

    let status_code = match overall_status {
        HealthStatus::Up => StatusCode::OK,
        _ => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(response)).into_response()
}

async fn startup_handler(State(state): State<HealthState>) -> Response {
    if state.is_startup_complete() {
        (StatusCode::OK, Json(StartupResponse { status: HealthStatus::Up })).into_response()
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(StartupResponse { status: HealthStatus::Down }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn startup_and_readiness_track_independently() {
        let stats = Arc::new(Stats::new());
        let state = HealthState::new(stats.clone());

        assert!(!state.is_startup_complete());
        assert!(!state.is_ready());

        state.set_startup_complete(true);
        stats.set_ready(true);

        assert!(state.is_startup_complete());
        assert!(state.is_ready());
    }

    #[test]
    fn component_health_reasons() {
        let up = ComponentHealth::up();
        assert_eq!(up.status, HealthStatus::Up);

        let down = ComponentHealth::down_with_reason("test failure");
        assert_eq!(down.status, HealthStatus::Down);
        assert!(down.details.is_some());
    }
}
