mod api;
mod config;
mod dispatcher;
mod error;
mod formatter;
mod metrics;
mod models;
mod sandbox;

use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;

use crate::{
    config::EngineConfig, dispatcher::Dispatcher, metrics::MetricsRegistry,
    sandbox::SandboxFactory,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = EngineConfig::from_env();
    init_tracing(&config);

    let metrics = Arc::new(MetricsRegistry::new());
    let sandbox = SandboxFactory::from_config(&config).context("sandbox backend init failed")?;
    let dispatcher = Arc::new(Dispatcher::new(config.clone(), sandbox.clone(), metrics.clone()));

    let app = api::routes(config.clone(), dispatcher, metrics);
    let listener = TcpListener::bind(config.bind_addr)
        .await
        .context("failed to bind listener")?;

    tracing::info!(
        addr = %config.bind_addr,
        backend = sandbox.name(),
        max_concurrency = config.max_concurrency,
        "code execution service listening"
    );

    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}

fn init_tracing(config: &EngineConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.log_level.clone()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_current_span(false)
        .with_span_list(false)
        .init();
}
