//! Sidecar proxy lifecycle agent (v1)
//!
//! Keeps a local Envoy process in sync with the mesh's desired state,
//! hot-restarting it epoch by epoch without dropping connections.
//!
//! # Architecture Overview
//!
//! ```text
//!   registry / config store / cert dir / SIGHUP
//!                     │  ChangeEvent
//!                     ▼
//!            ┌──────────────────┐   ProxyConfig   ┌──────────────────┐
//!            │  ReloadWatcher   │────────────────▶│  RestartAgent    │
//!            │ generate + hash  │                 │ epoch state loop │
//!            └──────────────────┘                 └────────┬─────────┘
//!                                                          │ run / cleanup
//!                                                          ▼
//!                                                 ┌──────────────────┐
//!                                                 │   EnvoyRunner    │
//!                                                 │ envoy-rev<N>.json│
//!                                                 │ + proxy process  │
//!                                                 └──────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use sidecar_agent::config::{load_config, validate_config, AgentConfig, ConfigError, ProxyLogLevel};
use sidecar_agent::lifecycle::{signals, Shutdown};
use sidecar_agent::observability::{logging, metrics};
use sidecar_agent::proxy::BootstrapGenerator;
use sidecar_agent::watcher::StaticController;
use sidecar_agent::{AgentSettings, EnvoyRunner, ProxyContext, ReloadWatcher};

#[derive(Parser)]
#[command(name = "sidecar-agent")]
#[command(about = "Keeps the local sidecar proxy in sync with the mesh", long_about = None)]
struct Cli {
    /// Agent configuration file (TOML). Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Node IP address; also the proxy's service-node identity.
    #[arg(long)]
    ip: Option<String>,

    /// Agent log level.
    #[arg(long)]
    log_level: Option<String>,

    /// Proxy log level passed as `-l`.
    #[arg(long)]
    proxy_log_level: Option<ProxyLogLevel>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => AgentConfig::default(),
    };
    if let Some(ip) = cli.ip {
        config.node.ip_address = ip;
    }
    if let Some(level) = cli.log_level {
        config.observability.log_level = level;
    }
    if cli.proxy_log_level.is_some() {
        config.runner.proxy_log_level = cli.proxy_log_level;
    }
    validate_config(&config).map_err(ConfigError::Validation)?;

    logging::init_logging(&config.observability);

    tracing::info!("sidecar-agent v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        node = %config.node.ip_address,
        cluster = %config.mesh.service_cluster,
        auth_policy = ?config.mesh.auth_policy,
        binary = %config.runner.binary_path,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let runner = Arc::new(EnvoyRunner::new(
        config.mesh.clone(),
        config.node.ip_address.clone(),
        config.runner.clone(),
    ));

    let watcher = ReloadWatcher::new(
        &StaticController,
        None,
        ProxyContext::from_config(&config),
        BootstrapGenerator,
        runner,
        AgentSettings::from_config(&config),
    )
    .await?;

    let shutdown = Shutdown::new();
    let signal_task = tokio::spawn(signals::listen(shutdown.clone(), watcher.sink()));

    watcher.run(shutdown.subscribe()).await;

    if signal_task.is_finished() {
        signal_task.await??;
    } else {
        signal_task.abort();
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
