// src/connection/handler.rs

//! Defines the `ConnectionHandler` which manages the full lifecycle of a client connection.

use super::guard::ConnectionGuard;
use crate::core::ClientId;
use crate::core::errors::RelayError;
use crate::core::events::GatewayEvent;
use crate::core::pubsub::{ClientSink, Outbound};
use axum::extract::ws::{CloseFrame, Message, WebSocket, close_code};
use futures::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::net::SocketAddr;
use tokio::sync::{OwnedSemaphorePermit, broadcast, mpsc};
use tracing::{debug, info, warn};

/// Manages one WebSocket client from registration to cleanup.
pub struct ConnectionHandler {
    socket: WebSocket,
    id: ClientId,
    addr: SocketAddr,
    events_tx: mpsc::Sender<GatewayEvent>,
    client_buffer: usize,
    shutdown_rx: broadcast::Receiver<()>,
    // Held for the life of the connection to enforce `max_clients`.
    _permit: Option<OwnedSemaphorePermit>,
}

impl ConnectionHandler {
    pub fn new(
        socket: WebSocket,
        id: ClientId,
        addr: SocketAddr,
        events_tx: mpsc::Sender<GatewayEvent>,
        client_buffer: usize,
        shutdown_rx: broadcast::Receiver<()>,
        permit: Option<OwnedSemaphorePermit>,
    ) -> Self {
        Self {
            socket,
            id,
            addr,
            events_tx,
            client_buffer,
            shutdown_rx,
            _permit: permit,
        }
    }

    /// Registers the client with the gateway core, then pumps frames in both
    /// directions until either side closes.
    pub async fn run(self, query: HashMap<String, String>) -> Result<(), RelayError> {
        let Self {
            socket,
            id,
            addr,
            events_tx,
            client_buffer,
            mut shutdown_rx,
            _permit,
        } = self;

        let _guard = ConnectionGuard::new(id, addr, events_tx.clone());
        let (sink, mut outbound_rx) = ClientSink::channel(id, client_buffer);
        events_tx
            .send(GatewayEvent::ClientConnected {
                id,
                addr: Some(addr),
                sink,
                query,
            })
            .await
            .map_err(|_| RelayError::GatewayStopped)?;
        info!("Client {} connected from {}", id, addr);

        let (mut ws_tx, mut ws_rx) = socket.split();

        loop {
            tokio::select! {
                biased;

                _ = shutdown_rx.recv() => {
                    let _ = ws_tx.send(close_message(close_code::AWAY, "server shutting down")).await;
                    break;
                }

                outbound = outbound_rx.recv() => match outbound {
                    Some(Outbound::Payload(payload)) => {
                        if let Err(e) = ws_tx.send(Message::Text(payload.to_string().into())).await {
                            debug!("Write to client {} failed: {}", id, e);
                            break;
                        }
                    }
                    Some(Outbound::Close(reason)) => {
                        debug!("Closing client {}: {}", id, reason);
                        let _ = ws_tx.send(close_message(close_code::POLICY, reason)).await;
                        break;
                    }
                    // The core released this client.
                    None => {
                        let _ = ws_tx.send(Message::Close(None)).await;
                        break;
                    }
                },

                inbound = ws_rx.next() => match inbound {
                    Some(Ok(Message::Text(text))) => {
                        forward(&events_tx, id, text.to_string()).await?;
                    }
                    Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
                        Ok(text) => forward(&events_tx, id, text).await?,
                        Err(_) => debug!("Ignoring non-UTF-8 binary frame from client {}.", id),
                    },
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("Client {} closed the connection.", id);
                        break;
                    }
                    // Pings are answered by the WebSocket layer.
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        if is_normal_disconnect(&e) {
                            debug!("Client {} disconnected: {}", id, e);
                        } else {
                            warn!("WebSocket error for client {}: {}", id, e);
                        }
                        break;
                    }
                },
            }
        }

        info!("Client {} disconnected", id);
        Ok(())
    }
}

async fn forward(
    events_tx: &mpsc::Sender<GatewayEvent>,
    id: ClientId,
    body: String,
) -> Result<(), RelayError> {
    events_tx
        .send(GatewayEvent::ClientMessage { id, body })
        .await
        .map_err(|_| RelayError::GatewayStopped)
}

fn close_message(code: u16, reason: impl Into<String>) -> Message {
    let reason: String = reason.into();
    Message::Close(Some(CloseFrame {
        code,
        reason: reason.into(),
    }))
}

fn is_normal_disconnect(e: &axum::Error) -> bool {
    let message = e.to_string();
    message.contains("Connection reset")
        || message.contains("Broken pipe")
        || message.contains("Connection closed")
}
