//! # bft-node
//!
//! The entry point for running a single BFT replica or client process.

use anyhow::{Context, Result};
use axum::{routing::get, Router};
use bft_consensus::EchoTransactionManager;
use bft_node::app::{Node, NodeRole};
use bft_node::config::NodeConfig;
use bft_node::health::{health_routes, HealthState};
use bft_node::observability::{init_logging, LogFormat, METRICS};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

/// bft-node - a single replica or client process of the consensus framework
#[derive(Parser, Debug)]
#[command(name = "bft-node")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// This node's replica/client id, overriding the config file
    #[arg(long)]
    self_id: Option<u32>,

    /// Whether this process orders/executes (`replica`) or only submits
    /// batches and waits on quorum replies (`client`)
    #[arg(long, value_enum, default_value = "replica")]
    role: Role,

    /// Health HTTP listen address, overriding the config file
    #[arg(long)]
    api_addr: Option<SocketAddr>,

    /// Metrics HTTP listen address, overriding the config file
    #[arg(long)]
    metrics_addr: Option<SocketAddr>,

    /// Log level, overriding the config file
    #[arg(long)]
    log_level: Option<String>,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum Role {
    Replica,
    Client,
}

impl From<Role> for NodeRole {
    fn from(role: Role) -> Self {
        match role {
            Role::Replica => NodeRole::Replica,
            Role::Client => NodeRole::Client,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => NodeConfig::from_file(path).context("loading configuration file")?,
        None => NodeConfig::default(),
    };
    config.merge_env().context("applying environment overrides")?;

    if let Some(self_id) = args.self_id {
        config.replica.self_info.id = self_id;
    }
    if let Some(addr) = args.api_addr {
        config.api.addr = addr;
    }
    if let Some(addr) = args.metrics_addr {
        config.metrics.addr = addr;
    }
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }
    config.validate_config().context("validating configuration")?;

    let log_format = LogFormat::parse(&config.logging.format);
    init_logging(&config.logging.level, log_format == LogFormat::Json);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        self_id = config.replica.self_info.id,
        role = ?args.role,
        "starting bft-node"
    );

    let transaction_manager = Arc::new(EchoTransactionManager::new());
    let node = Node::start(&config, args.role.into(), transaction_manager)
        .await
        .context("wiring consensus node")?;

    let health_state = HealthState::new(node.stats.clone());
    let health_listener = tokio::net::TcpListener::bind(config.api.addr)
        .await
        .context("binding health HTTP listener")?;
    let health_router = health_routes(health_state.clone());
    let health_task = tokio::spawn(async move {
        if let Err(e) = axum::serve(health_listener, health_router).await {
            tracing::error!(error = %e, "health server exited");
        }
    });

    let metrics_task = if config.metrics.enabled {
        let metrics_listener = tokio::net::TcpListener::bind(config.metrics.addr)
            .await
            .context("binding metrics HTTP listener")?;
        let stats = node.stats.clone();
        let metrics_router = Router::new().route(
            "/metrics",
            get(move || {
                let stats = stats.clone();
                async move {
                    METRICS.sync_from_stats(&stats);
                    METRICS.encode()
                }
            }),
        );
        Some(tokio::spawn(async move {
            if let Err(e) = axum::serve(metrics_listener, metrics_router).await {
                tracing::error!(error = %e, "metrics server exited");
            }
        }))
    } else {
        None
    };

    health_state.set_startup_complete(true);
    tracing::info!(
        api_addr = %config.api.addr,
        metrics_addr = %config.metrics.addr,
        "bft-node running, press Ctrl+C to stop"
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");

    node.shutdown();
    health_task.abort();
    if let Some(task) = metrics_task {
        task.abort();
    }

    Ok(())
}
