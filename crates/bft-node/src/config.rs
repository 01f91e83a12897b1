//! Node configuration: layered env-var / file / default loading around the
//! core's [`bft_types::ReplicaConfig`], plus the ambient ops knobs (API/
//! metrics addresses, logging, resilience) that spec.md's Non-goals exclude
//! as *design* but which the running process still needs (spec §5 / §6.2).
//!
//! Grounded verbatim on `guts-node::config`'s env-over-file-over-default
//! merge pattern and its `validator`-derived validation.
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `BFT_NODE_SELF_ID` | This node's replica/client id | *required* |
//! | `BFT_NODE_API_ADDR` | Health HTTP address | `127.0.0.1:8080` |
//! | `BFT_NODE_METRICS_ADDR` | Metrics HTTP address | `127.0.0.1:9090` |
//! | `BFT_NODE_LOG_LEVEL` | Log level | `info` |
//! | `BFT_NODE_LOG_FORMAT` | Log format (json/pretty) | `pretty` |
//! | `BFT_NODE_PRIVATE_KEY` | Ed25519 private key (hex) | *generated if unset* |

use bft_types::ReplicaConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use validator::Validate;

/// Configuration loading/validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A value read from the environment could not be parsed.
    #[error("failed to parse environment variable {key}: {message}")]
    EnvParse {
        /// The offending variable name.
        key: String,
        /// Why parsing failed.
        message: String,
    },
    /// The configuration file could not be read or parsed.
    #[error("failed to load configuration file: {0}")]
    FileLoad(String),
    /// The merged configuration failed validation.
    #[error("validation failed: {0}")]
    Validation(String),
}

/// Every ambient knob a running `bft-node` process needs, layered on top of
/// the core's [`ReplicaConfig`] (spec §6.2).
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct NodeConfig {
    /// The consensus core's own configuration (spec §6.2).
    #[serde(default)]
    pub replica: ReplicaConfig,

    /// Health/liveness HTTP server configuration.
    #[validate(nested)]
    #[serde(default)]
    pub api: ApiConfig,

    /// Prometheus metrics HTTP server configuration.
    #[validate(nested)]
    #[serde(default)]
    pub metrics: MetricsConfig,

    /// Structured logging configuration.
    #[validate(nested)]
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Retry/circuit-breaker configuration for outbound maintenance calls
    /// (not the hot consensus path, which has its own §4.A retry count).
    #[validate(nested)]
    #[serde(default)]
    pub resilience: ResilienceConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            replica: ReplicaConfig::default(),
            api: ApiConfig::default(),
            metrics: MetricsConfig::default(),
            logging: LoggingConfig::default(),
            resilience: ResilienceConfig::default(),
        }
    }
}

impl NodeConfig {
    /// Loads a `NodeConfig` from a YAML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileLoad(e.to_string()))?;
        serde_yaml::from_str(&content).map_err(|e| ConfigError::FileLoad(e.to_string()))
    }

    /// Applies environment-variable overrides on top of whatever was loaded
    /// from file/defaults. Only variables actually set in the environment
    /// take effect (spec §6.2's keys stay at their file/default value
    /// otherwise).
    pub fn merge_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(id) = std::env::var("BFT_NODE_SELF_ID") {
            self.replica.self_info.id = id.parse().map_err(|_| ConfigError::EnvParse {
                key: "BFT_NODE_SELF_ID".into(),
                message: "expected u32".into(),
            })?;
        }
        if let Ok(key) = std::env::var("BFT_NODE_PRIVATE_KEY") {
            self.replica.private_key = Some(key);
        }
        if let Ok(addr) = std::env::var("BFT_NODE_API_ADDR") {
            self.api.addr = addr.parse().map_err(|_| ConfigError::EnvParse {
                key: "BFT_NODE_API_ADDR".into(),
                message: "expected socket address".into(),
            })?;
        }
        if let Ok(addr) = std::env::var("BFT_NODE_METRICS_ADDR") {
            self.metrics.addr = addr.parse().map_err(|_| ConfigError::EnvParse {
                key: "BFT_NODE_METRICS_ADDR".into(),
                message: "expected socket address".into(),
            })?;
        }
        if let Ok(level) = std::env::var("BFT_NODE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("BFT_NODE_LOG_FORMAT") {
            self.logging.format = format;
        }
        Ok(())
    }

    /// Validates the merged configuration: `validator`-derived range checks
    /// plus the core's own roster-size invariant (spec §6.2 "at least
    /// `3f+1` entries").
    pub fn validate_config(&self) -> Result<(), ConfigError> {
        self.validate().map_err(|e| ConfigError::Validation(e.to_string()))?;

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(ConfigError::Validation(format!(
                "invalid log level '{}', expected one of {:?}",
                self.logging.level, valid_levels
            )));
        }
        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.logging.format.to_lowercase().as_str()) {
            return Err(ConfigError::Validation(format!(
                "invalid log format '{}', expected one of {:?}",
                self.logging.format, valid_formats
            )));
        }
        if !self.replica.replicas.is_empty() && !self.replica.has_valid_roster() {
            return Err(ConfigError::Validation(format!(
                "roster of {} replicas does not satisfy n >= 3f+1",
                self.replica.n()
            )));
        }
        Ok(())
    }
}

/// Health/liveness HTTP server configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct ApiConfig {
    /// Listen address for `/health`, `/health/live`, `/health/ready`.
    pub addr: SocketAddr,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8080".parse().expect("valid default address"),
        }
    }
}

/// Prometheus metrics HTTP server configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct MetricsConfig {
    /// Whether the metrics HTTP server is started at all.
    pub enabled: bool,
    /// Listen address for `/metrics`.
    pub addr: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            addr: "127.0.0.1:9090".parse().expect("valid default address"),
        }
    }
}

/// Structured logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    pub level: String,
    /// Log format (json, pretty).
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

/// Retry/circuit-breaker knobs for `bft-node`'s own outbound maintenance
/// calls (spec §9: kept orthogonal to the hot consensus path).
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct ResilienceConfig {
    /// Retry policy.
    #[validate(nested)]
    #[serde(default)]
    pub retry: RetryConfig,
    /// Circuit breaker policy.
    #[validate(nested)]
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
        }
    }
}

/// See [`crate::resilience::RetryPolicy`].
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct RetryConfig {
    /// Maximum retry attempts.
    #[validate(range(min = 0, max = 10))]
    pub max_attempts: u32,
    /// Initial delay in milliseconds.
    #[validate(range(min = 10, max = 60_000))]
    pub initial_delay_ms: u64,
    /// Maximum delay in milliseconds.
    #[validate(range(min = 100, max = 300_000))]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 100,
            max_delay_ms: 5_000,
        }
    }
}

impl RetryConfig {
    /// Builds the runtime [`crate::resilience::RetryPolicy`] this config describes.
    #[must_use]
    pub fn to_policy(&self) -> crate::resilience::RetryPolicy {
        crate::resilience::RetryPolicy {
            max_attempts: self.max_attempts,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

/// See [`crate::resilience::CircuitBreaker`].
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct CircuitBreakerConfig {
    /// Failures before opening.
    #[validate(range(min = 1, max = 100))]
    pub failure_threshold: u32,
    /// Successes to close from half-open.
    #[validate(range(min = 1, max = 100))]
    pub success_threshold: u32,
    /// Seconds before transitioning from open to half-open.
    #[validate(range(min = 1, max = 3_600))]
    pub timeout_secs: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 3,
            timeout_secs: 30,
        }
    }
}

impl CircuitBreakerConfig {
    /// Builds the runtime [`crate::resilience::CircuitBreaker`] this config describes.
    #[must_use]
    pub fn to_circuit_breaker(&self) -> crate::resilience::CircuitBreaker {
        crate::resilience::CircuitBreaker::new(
            self.failure_threshold,
            self.success_threshold,
            Duration::from_secs(u64::from(self.timeout_secs)),
        )
    }
}
