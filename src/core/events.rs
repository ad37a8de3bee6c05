// src/core/events.rs

//! Defines the events fed into the gateway core.
//!
//! Every mutation of routing state happens on the core task in response to one
//! of these events. Events from one producer are handled in the order they were
//! sent, which gives each upstream link in-order processing of its commands.

use crate::core::ClientId;
use crate::core::errors::RelayError;
use crate::core::protocol::DispatchCommand;
use crate::core::pubsub::ClientSink;
use std::collections::HashMap;
use std::net::SocketAddr;
use tokio::sync::{mpsc, oneshot};

/// The capacity of the MPSC channel feeding the core.
/// Large enough to absorb bursts of client traffic without stalling producers.
pub const EVENT_CHANNEL_CAPACITY: usize = 65536;

/// A point-in-time summary of gateway state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GatewayStats {
    pub clients: usize,
    pub topics: usize,
    pub connected_links: usize,
    pub last_seq: u64,
}

#[derive(Debug)]
pub enum GatewayEvent {
    /// A client connection was accepted. `query` carries any transport-supplied
    /// parameters, such as those of a WebSocket upgrade request.
    ClientConnected {
        id: ClientId,
        addr: Option<SocketAddr>,
        sink: ClientSink,
        query: HashMap<String, String>,
    },
    /// A client sent a message.
    ClientMessage { id: ClientId, body: String },
    /// A client connection closed. May arrive more than once for the same id.
    ClientClosed { id: ClientId },
    /// An upstream link reached the Connected state. Commands written to
    /// `writer` are sent over the link; its capacity is the link's write buffer.
    LinkUp {
        address: String,
        writer: mpsc::Sender<DispatchCommand>,
    },
    /// A dispatch command arrived on an upstream link.
    LinkCommand {
        address: String,
        command: DispatchCommand,
    },
    /// An upstream link left the Connected state.
    LinkDown { address: String },
    /// The application wants `command` written to every connected link.
    Publish {
        command: DispatchCommand,
        reply: oneshot::Sender<Result<usize, RelayError>>,
    },
    /// Heartbeat timer tick.
    Heartbeat,
    /// Statistics query.
    Snapshot { reply: oneshot::Sender<GatewayStats> },
}
