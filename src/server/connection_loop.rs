// src/server/connection_loop.rs

//! Contains the main server loop: serves WebSocket clients and handles graceful shutdown.

use super::context::ServerContext;
use super::routes::{self, AppState};
use anyhow::Context;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::signal::unix::{SignalKind, signal};
use tracing::{error, info, warn};

/// Serves clients until a signal arrives or a background task fails.
pub async fn run(mut ctx: ServerContext) -> anyhow::Result<()> {
    let mut sigint =
        signal(SignalKind::interrupt()).context("Failed to register SIGINT handler")?;
    let mut sigterm =
        signal(SignalKind::terminate()).context("Failed to register SIGTERM handler")?;

    let app = routes::router(
        AppState {
            events_tx: ctx.handle.sender(),
            client_buffer: ctx.config.client_buffer,
            permits: ctx.connection_permits.clone(),
            shutdown_tx: ctx.shutdown_tx.clone(),
        },
        &ctx.config.path,
    );

    let listener = ctx.listener;
    let mut server_shutdown_rx = ctx.shutdown_tx.subscribe();
    let mut server = tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            server_shutdown_rx.recv().await.ok();
        })
        .await
    });

    loop {
        tokio::select! {
            biased;

            _ = sigint.recv() => {
                info!("SIGINT received, initiating graceful shutdown.");
                break;
            }
            _ = sigterm.recv() => {
                info!("SIGTERM received, initiating graceful shutdown.");
                break;
            }

            Some(res) = ctx.background_tasks.join_next() => {
                match res {
                    Ok(Ok(())) => warn!("A background task finished unexpectedly without an error."),
                    Ok(Err(e)) => { error!("CRITICAL: Background task failed: {}. Shutting down.", e); break; }
                    Err(e) => { error!("CRITICAL: Background task panicked: {e:?}. Shutting down."); break; }
                }
            },

            res = &mut server => {
                match res {
                    Ok(Ok(())) => warn!("WebSocket server stopped unexpectedly."),
                    Ok(Err(e)) => error!("CRITICAL: WebSocket server failed: {}. Shutting down.", e),
                    Err(e) => error!("CRITICAL: WebSocket server panicked: {e:?}. Shutting down."),
                }
                break;
            }
        }
    }

    info!("Shutting down. Sending signal to all tasks.");
    if ctx.shutdown_tx.send(()).is_err() {
        error!("Failed to send shutdown signal. Some tasks may not terminate gracefully.");
    }

    if !server.is_finished()
        && tokio::time::timeout(Duration::from_secs(10), &mut server)
            .await
            .is_err()
    {
        warn!("Timed out waiting for client connections to close.");
        server.abort();
    }
    info!("All client connections closed.");

    for (address, state) in ctx.links.states() {
        info!("Upstream link {} is {} at shutdown.", address, state);
    }

    info!("Waiting for background tasks to finish...");
    if tokio::time::timeout(Duration::from_secs(10), async {
        while ctx.background_tasks.join_next().await.is_some() {}
    })
    .await
    .is_err()
    {
        warn!("Timed out waiting for background tasks to finish cleanly.");
    };
    info!("Gateway shutdown complete.");
    Ok(())
}
