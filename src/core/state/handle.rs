// src/core/state/handle.rs

use crate::core::errors::RelayError;
use crate::core::events::{GatewayEvent, GatewayStats};
use crate::core::protocol::{DispatchCommand, Payload};
use tokio::sync::{mpsc, oneshot};

/// A cloneable handle to the gateway core.
///
/// Publishing writes a dispatch command to every connected upstream link. The
/// command comes back through the links like any other, so local clients are
/// reached only via the upstream round trip.
#[derive(Debug, Clone)]
pub struct GatewayHandle {
    events_tx: mpsc::Sender<GatewayEvent>,
}

impl GatewayHandle {
    pub(super) fn new(events_tx: mpsc::Sender<GatewayEvent>) -> Self {
        Self { events_tx }
    }

    /// The raw event sender, for transports feeding client events into the core.
    pub fn sender(&self) -> mpsc::Sender<GatewayEvent> {
        self.events_tx.clone()
    }

    /// Publishes a broadcast command. Returns the number of links written to,
    /// or `RelayError::NotReady` if none is connected.
    pub async fn send_to_all(&self, content: impl Into<Payload>) -> Result<usize, RelayError> {
        self.publish(DispatchCommand::send_to_all(content)).await
    }

    /// Publishes a tagged command for the given keys.
    pub async fn send_by_keys<I, S>(
        &self,
        keys: I,
        content: impl Into<Payload>,
    ) -> Result<usize, RelayError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.publish(DispatchCommand::send_by_tags(keys, content))
            .await
    }

    pub async fn publish(&self, command: DispatchCommand) -> Result<usize, RelayError> {
        let (reply, rx) = oneshot::channel();
        self.events_tx
            .send(GatewayEvent::Publish { command, reply })
            .await
            .map_err(|_| RelayError::GatewayStopped)?;
        rx.await.map_err(|_| RelayError::GatewayStopped)?
    }

    pub async fn stats(&self) -> Result<GatewayStats, RelayError> {
        let (reply, rx) = oneshot::channel();
        self.events_tx
            .send(GatewayEvent::Snapshot { reply })
            .await
            .map_err(|_| RelayError::GatewayStopped)?;
        rx.await.map_err(|_| RelayError::GatewayStopped)
    }
}
