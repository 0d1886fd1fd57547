//! `placement serve`: HTTP API plus the maintenance and config-reload tasks.

use super::{open, ConfigArgs};
use anyhow::Result;
use placement_core::ConfigWatcher;
use placement_engine::Engine;
use placement_web_api::ApiServer;
use std::sync::Arc;
use tracing::{error, info};

/// Runs the service until SIGINT or SIGTERM.
///
/// # Errors
/// Returns an error if the database cannot be opened or signal handlers
/// cannot be installed.
pub async fn run_serve(args: ConfigArgs) -> Result<()> {
    let (config, store) = open(&args).await?;
    let addr = config.server.addr();
    info!(config = %args.config, addr = %addr, "starting placement engine");

    let (watcher, config_rx) = ConfigWatcher::new(config);
    let watch_path = args.config.clone();
    let watcher_handle = tokio::spawn(async move {
        if let Err(e) = watcher.watch(watch_path).await {
            error!(error = %e, "config watcher stopped");
        }
    });

    let (engine, recorder_handle) = Engine::start(Arc::clone(&store), config_rx);
    let engine = Arc::new(engine);
    let maintenance_handle = engine.maintenance.clone().spawn();

    let server = ApiServer::new(Arc::clone(&engine));
    let server_handle = tokio::spawn(async move {
        if let Err(e) = server.serve(&addr).await {
            error!(error = %e, "server error");
        }
    });

    shutdown_signal().await?;

    server_handle.abort();
    maintenance_handle.abort();
    watcher_handle.abort();

    if let Err(e) = engine.recorder.flush().await {
        error!(error = %e, "failed to flush decision recorder");
    }
    let stats = engine.recorder.stats();
    info!(
        recorded = stats.recorded(),
        dropped = stats.dropped(),
        failed = stats.failed(),
        "decision recorder drained"
    );
    drop(engine);
    recorder_handle.abort();
    store.database().close().await;

    info!("placement engine stopped");
    Ok(())
}

async fn shutdown_signal() -> Result<()> {
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())?;

    tokio::select! {
        _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
        _ = sigint.recv() => info!("received SIGINT, shutting down"),
    }
    Ok(())
}
