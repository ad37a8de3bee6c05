// src/server/mod.rs

use crate::config::Config;
use crate::core::hooks::GatewayHooks;
use anyhow::Result;

mod connection_loop;
mod context;
mod initialization;
mod metrics_server;
mod routes;
mod spawner;

pub use routes::{AppState, router};

/// The main gateway startup function, orchestrating all setup phases.
pub async fn run(config: Config) -> Result<()> {
    run_with_hooks(config, GatewayHooks::new()).await
}

/// Like `run`, with application hooks attached to the gateway core.
pub async fn run_with_hooks(config: Config, hooks: GatewayHooks) -> Result<()> {
    // 1. Build the core, the link workers and the client listener.
    let mut server_context = initialization::setup(config, hooks).await?;

    // 2. Spawn all background tasks.
    spawner::spawn_all(&mut server_context)?;

    // 3. Serve clients until shutdown.
    connection_loop::run(server_context).await
}
