//! Sizer Agent - Container resource profiling service
//!
//! Exposes an HTTP API that profiles container images against a local
//! Docker daemon and maps their resource usage to instance size
//! recommendations.

use anyhow::Result;
use sizer_lib::{BulkRunner, DockerRuntime, RunManager, SamplerConfig};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting sizer-agent");

    let config = config::SizerConfig::load()?;
    info!(
        docker_host = %config.docker_host,
        api_port = config.api_port,
        sample_interval_secs = config.sample_interval_secs,
        "Agent configured"
    );

    let runtime = Arc::new(DockerRuntime::new(&config.docker_host)?);
    let sampler = SamplerConfig {
        interval: Duration::from_secs(config.sample_interval_secs.max(1)),
    };
    let manager = Arc::new(RunManager::new(runtime, sampler));
    let bulk = Arc::new(BulkRunner::new(manager.clone()));

    let app_state = Arc::new(api::AppState::new(
        manager,
        bulk,
        config.default_duration_secs,
    ));

    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    api_handle.abort();

    Ok(())
}
