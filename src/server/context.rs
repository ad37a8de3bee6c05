// src/server/context.rs

use crate::config::Config;
use crate::core::state::{GatewayCore, GatewayHandle};
use crate::core::upstream::{LinkManager, LinkWorker};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{Semaphore, broadcast};
use tokio::task::JoinSet;

/// Holds all the initialized state required to run the gateway's main loop.
pub struct ServerContext {
    pub config: Config,
    /// Taken by the spawner when the core task starts.
    pub core: Option<GatewayCore>,
    pub handle: GatewayHandle,
    pub links: LinkManager,
    /// Taken by the spawner when the link tasks start.
    pub link_workers: Vec<LinkWorker>,
    pub listener: TcpListener,
    pub shutdown_tx: broadcast::Sender<()>,
    pub background_tasks: JoinSet<Result<(), anyhow::Error>>,
    pub connection_permits: Arc<Semaphore>,
}
