// src/core/upstream/worker.rs

//! Drives one upstream link through its connect/reconnect cycle.
//!
//! The worker connects, announces the link to the gateway core, then pumps
//! inbound dispatch commands to the core and outbound publishes to the
//! backend. Whenever the link fails or closes it waits a fixed delay and tries
//! again, forever.

use super::LinkState;
use super::connector::{Connector, LinkTransport};
use crate::core::errors::RelayError;
use crate::core::events::GatewayEvent;
use crate::core::metrics;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, info, warn};

pub struct LinkWorker {
    address: String,
    connector: Arc<dyn Connector>,
    reconnect_delay: Duration,
    write_buffer: usize,
    events_tx: mpsc::Sender<GatewayEvent>,
    state_tx: watch::Sender<LinkState>,
}

impl LinkWorker {
    pub(super) fn new(
        address: String,
        connector: Arc<dyn Connector>,
        reconnect_delay: Duration,
        write_buffer: usize,
        events_tx: mpsc::Sender<GatewayEvent>,
        state_tx: watch::Sender<LinkState>,
    ) -> Self {
        Self {
            address,
            connector,
            reconnect_delay,
            write_buffer: write_buffer.max(1),
            events_tx,
            state_tx,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Runs the link until shutdown or until the gateway core goes away.
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!("Upstream link worker for {} started.", self.address);

        loop {
            let result = tokio::select! {
                result = self.connection_cycle() => result,
                _ = shutdown_rx.recv() => {
                    info!("Upstream link worker for {} shutting down.", self.address);
                    self.state_tx.send_replace(LinkState::Disconnected);
                    return;
                }
            };

            let was_connected = self.state_tx.send_replace(LinkState::Disconnected)
                == LinkState::Connected;
            if was_connected {
                let down = GatewayEvent::LinkDown {
                    address: self.address.clone(),
                };
                if self.events_tx.send(down).await.is_err() {
                    return;
                }
            }

            match result {
                Ok(()) => info!("Upstream link {} closed by peer.", self.address),
                Err(RelayError::GatewayStopped) => {
                    info!("Gateway core stopped; link worker for {} exiting.", self.address);
                    return;
                }
                Err(e) => warn!("Upstream link {} failed: {}", self.address, e),
            }

            info!(
                "Will try to reconnect to {} in {:?}",
                self.address, self.reconnect_delay
            );
            tokio::select! {
                _ = tokio::time::sleep(self.reconnect_delay) => {}
                _ = shutdown_rx.recv() => {
                    info!("Upstream link worker for {} shutting down during reconnect delay.", self.address);
                    return;
                }
            }
        }
    }

    // One pass through Connecting and, on success, Connected. Returns when the link ends.
    async fn connection_cycle(&self) -> Result<(), RelayError> {
        self.state_tx.send_replace(LinkState::Connecting);
        metrics::UPSTREAM_CONNECT_ATTEMPTS_TOTAL.inc();
        debug!("Connecting to upstream {}", self.address);

        let LinkTransport {
            mut sink,
            mut stream,
        } = self.connector.connect(&self.address).await?;

        // Bounded so a backend that stops reading pushes back on publishers.
        let (writer_tx, mut writer_rx) = mpsc::channel(self.write_buffer);
        self.state_tx.send_replace(LinkState::Connected);
        info!("Connected to upstream {}", self.address);
        self.events_tx
            .send(GatewayEvent::LinkUp {
                address: self.address.clone(),
                writer: writer_tx,
            })
            .await
            .map_err(|_| RelayError::GatewayStopped)?;

        loop {
            tokio::select! {
                Some(command) = writer_rx.recv() => {
                    sink.send(command).await?;
                }
                frame = stream.next() => match frame {
                    Some(Ok(Ok(command))) => {
                        let event = GatewayEvent::LinkCommand {
                            address: self.address.clone(),
                            command,
                        };
                        self.events_tx
                            .send(event)
                            .await
                            .map_err(|_| RelayError::GatewayStopped)?;
                    }
                    Some(Ok(Err(e))) => {
                        metrics::MALFORMED_COMMANDS_TOTAL.inc();
                        warn!("Dropping malformed command from {}: {}", self.address, e);
                    }
                    Some(Err(e)) => return Err(e),
                    None => return Ok(()),
                },
            }
        }
    }
}
