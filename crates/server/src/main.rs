//! sw-cache worker entry point.
//!
//! This is the main binary that boots the offline cache worker and serves its
//! hooks as MCP tools on stdio transport.
//! Logging goes to stderr to avoid interfering with the JSON-RPC protocol on stdout.

use std::sync::Arc;

use anyhow::Result;
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use swcache_client::{FetchConfig, HttpNetwork};
use swcache_core::{AppConfig, CacheDb, SystemClock};
use tracing_subscriber::EnvFilter;

mod error;
mod handler;
mod tools;
mod worker;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load()?;
    tracing::info!(
        origin = %config.origin,
        db_path = %config.db_path.display(),
        preset = ?config.preset,
        strategy = ?config.strategy,
        "Starting sw-cache worker on stdio transport"
    );

    let db = CacheDb::open(&config.db_path).await?;
    let network = HttpNetwork::new(FetchConfig::from_app_config(&config)?)?;
    let worker = Arc::new(worker::Worker::new(&config, db, Arc::new(network), Arc::new(SystemClock))?);

    let handler = handler::CacheWorkerServer::new(worker.clone());
    let transport = stdio();
    let server = serve_server(handler, transport).await?;

    server.waiting().await?;
    worker.settle().await;

    Ok(())
}
