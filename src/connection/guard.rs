// src/connection/guard.rs

//! Defines `ConnectionGuard`, an RAII guard for connection resource management.

use crate::core::ClientId;
use crate::core::events::GatewayEvent;
use crate::core::metrics;
use std::net::SocketAddr;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::debug;

/// Ensures the gateway core hears about a closed connection exactly once,
/// however the handler's scope is exited.
pub struct ConnectionGuard {
    id: ClientId,
    addr: SocketAddr,
    events_tx: mpsc::Sender<GatewayEvent>,
}

impl ConnectionGuard {
    pub(crate) fn new(id: ClientId, addr: SocketAddr, events_tx: mpsc::Sender<GatewayEvent>) -> Self {
        metrics::CONNECTED_CLIENTS.inc();
        Self {
            id,
            addr,
            events_tx,
        }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        metrics::CONNECTED_CLIENTS.dec();
        debug!(
            "ConnectionGuard dropping, releasing client {} ({})",
            self.id, self.addr
        );

        let event = GatewayEvent::ClientClosed { id: self.id };
        match self.events_tx.try_send(event) {
            Ok(()) | Err(TrySendError::Closed(_)) => {}
            Err(TrySendError::Full(event)) => {
                // The core is backed up. Deliver the close later rather than lose it.
                if let Ok(handle) = tokio::runtime::Handle::try_current() {
                    let events_tx = self.events_tx.clone();
                    handle.spawn(async move {
                        let _ = events_tx.send(event).await;
                    });
                }
            }
        }
    }
}
