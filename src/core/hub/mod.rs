// src/core/hub/mod.rs

//! The hub process mode (`--hub`).
//!
//! A hub is the backend end of upstream links. Gateways and backend publishers
//! both connect to it, and every well-formed dispatch command received on any
//! link is written back out to every connected link, the sender included. This
//! gives each gateway process the same command stream.

pub mod config;

use self::config::HubConfig;
use crate::core::errors::RelayError;
use crate::core::protocol::{DispatchCodec, DispatchCommand};
use anyhow::Result;
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tokio_util::codec::Framed;
use tracing::{debug, error, info, warn};

/// The main entry point for running in hub mode.
pub async fn run(config_path: &str) -> Result<()> {
    let config = HubConfig::from_file(config_path).await?;
    let hub = Hub::bind(&config).await?;
    info!("Hub listening on {}", hub.local_addr()?);

    let (shutdown_tx, _) = broadcast::channel(1);
    let mut hub_task = tokio::spawn(hub.run(shutdown_tx.subscribe()));

    tokio::select! {
        res = &mut hub_task => {
            return match res {
                Ok(result) => result,
                Err(e) => Err(anyhow::anyhow!("Hub task panicked: {e}")),
            };
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C. Shutting down hub.");
        }
    }

    let _ = shutdown_tx.send(());
    match hub_task.await {
        Ok(result) => result,
        Err(e) => Err(anyhow::anyhow!("Hub task panicked: {e}")),
    }
}

pub struct Hub {
    listener: TcpListener,
    max_line_length: usize,
    channel_capacity: usize,
}

impl Hub {
    pub async fn bind(config: &HubConfig) -> Result<Self> {
        let addr = format!("{}:{}", config.host, config.port);
        let listener = TcpListener::bind(&addr).await?;
        Ok(Self {
            listener,
            max_line_length: config.max_line_length,
            channel_capacity: config.channel_capacity,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts links until shutdown.
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        let (fanout_tx, _) = broadcast::channel::<DispatchCommand>(self.channel_capacity);
        let mut links: JoinSet<()> = JoinSet::new();

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Hub shutting down; closing {} link(s).", links.len());
                    break;
                }
                accepted = self.listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            error!("Failed to accept link: {}", e);
                            continue;
                        }
                    };
                    info!("Accepted link from {}", peer);
                    let codec = DispatchCodec::new(self.max_line_length);
                    let fanout_tx = fanout_tx.clone();
                    let link_shutdown = shutdown_rx.resubscribe();
                    links.spawn(async move {
                        match handle_link(stream, codec, fanout_tx, link_shutdown).await {
                            Ok(()) => info!("Link from {} closed.", peer),
                            Err(e) => warn!("Link from {} dropped: {}", peer, e),
                        }
                    });
                }
                Some(_) = links.join_next(), if !links.is_empty() => {}
            }
        }

        links.shutdown().await;
        Ok(())
    }
}

async fn handle_link(
    stream: TcpStream,
    codec: DispatchCodec,
    fanout_tx: broadcast::Sender<DispatchCommand>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), RelayError> {
    // Subscribe before reading so the sender also receives its own commands.
    let mut fanout_rx = fanout_tx.subscribe();
    let mut framed = Framed::new(stream, codec);

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => return Ok(()),
            frame = framed.next() => match frame {
                Some(Ok(Ok(command))) => {
                    debug!("Hub fanning out {}.", command.kind());
                    let _ = fanout_tx.send(command);
                }
                Some(Ok(Err(e))) => warn!("Dropping malformed command: {}", e),
                Some(Err(e)) => return Err(e),
                None => return Ok(()),
            },
            received = fanout_rx.recv() => match received {
                Ok(command) => framed.send(command).await?,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Link fell behind; {} command(s) skipped.", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return Ok(()),
            },
        }
    }
}
