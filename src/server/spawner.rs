// src/server/spawner.rs

//! Spawns all of the gateway's long-running background tasks.

use super::context::ServerContext;
use super::metrics_server;
use crate::core::tasks::heartbeat::HeartbeatTask;
use anyhow::{Result, anyhow};
use tracing::info;

/// Spawns all critical background tasks into the context's JoinSet.
pub fn spawn_all(ctx: &mut ServerContext) -> Result<()> {
    let shutdown_tx = &ctx.shutdown_tx;
    let background_tasks = &mut ctx.background_tasks;

    // --- Metrics Server ---
    if ctx.config.metrics.enabled {
        let port = ctx.config.metrics.port;
        let handle = ctx.handle.clone();
        let shutdown_rx_metrics = shutdown_tx.subscribe();
        background_tasks.spawn(async move {
            metrics_server::run_metrics_server(port, handle, shutdown_rx_metrics).await;
            Ok(())
        });
    } else {
        info!("Prometheus metrics server is disabled in the configuration.");
    }

    // --- Gateway Core ---
    let core = ctx
        .core
        .take()
        .ok_or_else(|| anyhow!("Gateway core has already been spawned"))?;
    let shutdown_rx_core = shutdown_tx.subscribe();
    background_tasks.spawn(async move {
        core.run(shutdown_rx_core).await;
        Ok(())
    });

    // --- Upstream Links ---
    for worker in ctx.link_workers.drain(..) {
        let shutdown_rx_link = shutdown_tx.subscribe();
        background_tasks.spawn(async move {
            worker.run(shutdown_rx_link).await;
            Ok(())
        });
    }

    // --- Heartbeat ---
    if ctx.config.heartbeat.enabled() {
        let heartbeat = HeartbeatTask::new(ctx.config.heartbeat.interval, ctx.handle.sender());
        let shutdown_rx_heartbeat = shutdown_tx.subscribe();
        background_tasks.spawn(async move {
            heartbeat.run(shutdown_rx_heartbeat).await;
            Ok(())
        });
    }

    info!("All background tasks have been spawned.");
    Ok(())
}
