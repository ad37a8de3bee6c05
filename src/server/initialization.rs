// src/server/initialization.rs

//! Builds the gateway core, the upstream link workers and the client listener.

use super::context::ServerContext;
use crate::config::Config;
use crate::core::hooks::GatewayHooks;
use crate::core::state::{CoreSettings, GatewayCore};
use crate::core::upstream::{Connector, LinkManager, TcpConnector};
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{Semaphore, broadcast};
use tokio::task::JoinSet;
use tracing::info;

/// Initializes all gateway components before starting the main loop.
pub async fn setup(config: Config, hooks: GatewayHooks) -> Result<ServerContext> {
    log_startup_info(&config);
    let (shutdown_tx, _) = broadcast::channel(1);

    let (core, handle) = GatewayCore::new(CoreSettings::from_config(&config), hooks);
    info!("Gateway core initialized.");

    let connector: Arc<dyn Connector> =
        Arc::new(TcpConnector::new(config.upstream.max_line_length));
    let (links, link_workers) = LinkManager::new(
        &config.upstream.addresses,
        connector,
        config.upstream.reconnect_delay,
        config.upstream.write_buffer,
        handle.sender(),
    );

    let listener = TcpListener::bind((config.host.as_str(), config.port))
        .await
        .with_context(|| format!("Failed to bind {}:{}", config.host, config.port))?;
    info!(
        "Gateway listening for WebSocket clients on ws://{}:{}{}",
        config.host, config.port, config.path
    );
    let connection_permits = Arc::new(Semaphore::new(config.max_clients));

    Ok(ServerContext {
        config,
        core: Some(core),
        handle,
        links,
        link_workers,
        listener,
        shutdown_tx,
        background_tasks: JoinSet::new(),
        connection_permits,
    })
}

/// Logs key configuration parameters at startup.
fn log_startup_info(config: &Config) {
    info!(
        "Upstream links: {} (reconnect delay {:?}).",
        config.upstream.addresses.join(", "),
        config.upstream.reconnect_delay
    );
    info!(
        "Client ingress: {:?} policy, {:?} subscriptions, key field '{}'.",
        config.ingress.policy, config.ingress.subscription_mode, config.ingress.tags_field
    );
    if config.heartbeat.enabled() {
        info!("Heartbeat every {:?}.", config.heartbeat.interval);
    } else {
        info!("Heartbeat disabled (no payload configured).");
    }
}
