//! fluxbind-nri - NRI plugin applying fluxbind cpuset hints
//!
//! Runs as a DaemonSet on each node, attached to the container runtime's NRI
//! socket. Containers carrying a `FLUXBIND_CPUSET` hint are pinned to the
//! CPUs it names when they are created.

use anyhow::Result;
use clap::Parser;
use fluxbind_lib::{
    affinity::AdjustmentBuilder,
    api::{self, AppState},
    health::{components, HealthRegistry},
    observability::{PluginMetrics, StructuredLogger},
    plugin::Driver,
    stub::{Stub, Supervisor, UnixConnector},
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod config;

use config::{LogFormat, Overrides, PluginConfig};

const PLUGIN_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "fluxbind-nri")]
#[command(author, version, about = "NRI plugin applying fluxbind cpuset hints", long_about = None)]
struct Cli {
    /// Configuration file (toml, yaml or json)
    #[arg(long, short, env = "FLUXBIND_NRI_CONFIG")]
    config: Option<PathBuf>,

    #[command(flatten)]
    overrides: Overrides,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = PluginConfig::load(cli.config.as_deref(), &cli.overrides)?;

    init_tracing(config.log_format);
    info!(
        plugin = %config.plugin_name,
        socket = %config.socket_path.display(),
        env_prefix = %config.env_prefix,
        "Plugin configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry
        .set_degraded(components::NRI_STUB, "Waiting for runtime connection")
        .await;

    let metrics = PluginMetrics::new();
    metrics.set_connected(false);

    let logger = StructuredLogger::new(&config.plugin_name);
    logger.log_startup(PLUGIN_VERSION, &config.plugin_idx);

    if config.api_port != 0 {
        health_registry.register(components::API).await;
        let app_state = Arc::new(AppState::new(health_registry.clone(), metrics.clone()));
        let health = health_registry.clone();
        let port = config.api_port;
        tokio::spawn(async move {
            if let Err(e) = api::serve(port, app_state).await {
                error!(error = %e, port, "API server failed");
                health.set_unhealthy(components::API, e.to_string()).await;
            }
        });
    }

    let driver = Driver::new(
        AdjustmentBuilder::with_prefix(&config.env_prefix),
        metrics.clone(),
        logger.clone(),
    );
    let stub = Stub::new(
        config.stub_config(),
        Arc::new(driver),
        health_registry.clone(),
        metrics.clone(),
        logger.clone(),
    );
    let supervisor = Supervisor::new(
        UnixConnector::new(&config.socket_path),
        stub,
        config.reconnect_interval(),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let supervisor_handle = tokio::spawn(async move { supervisor.run(shutdown_rx).await });

    let reason = shutdown_signal().await?;
    logger.log_shutdown(reason);
    let _ = shutdown_tx.send(true);
    supervisor_handle.await?;

    info!("Shutting down");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init(),
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .init(),
    }
}

async fn shutdown_signal() -> Result<&'static str> {
    let mut terminate =
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            Ok("SIGINT received")
        }
        _ = terminate.recv() => Ok("SIGTERM received"),
    }
}
