// src/core/upstream/mod.rs

//! Persistent links to backend worker processes.
//!
//! Each configured address gets its own `LinkWorker` and its own state:
//!
//! ```text
//! Disconnected --> Connecting --> Connected
//!      ^               |              |
//!      +---- delay ----+--------------+
//! ```

pub mod connector;
pub mod worker;

pub use connector::{Connector, LinkTransport, TcpConnector};
pub use worker::LinkWorker;

use crate::core::events::GatewayEvent;
use indexmap::IndexMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
}

impl std::fmt::Display for LinkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LinkState::Disconnected => "disconnected",
            LinkState::Connecting => "connecting",
            LinkState::Connected => "connected",
        };
        f.write_str(name)
    }
}

/// Observes the state of every configured link. The links themselves are
/// driven by the `LinkWorker`s returned from `new`.
#[derive(Debug, Clone)]
pub struct LinkManager {
    links: IndexMap<String, watch::Receiver<LinkState>>,
}

impl LinkManager {
    /// Creates one worker per distinct address. The caller spawns them.
    ///
    /// `write_buffer` bounds each link's queue of pending publishes.
    pub fn new(
        addresses: &[String],
        connector: Arc<dyn Connector>,
        reconnect_delay: Duration,
        write_buffer: usize,
        events_tx: mpsc::Sender<GatewayEvent>,
    ) -> (Self, Vec<LinkWorker>) {
        let mut links = IndexMap::new();
        let mut workers = Vec::new();
        for address in addresses {
            if links.contains_key(address) {
                continue;
            }
            let (state_tx, state_rx) = watch::channel(LinkState::Disconnected);
            links.insert(address.clone(), state_rx);
            workers.push(LinkWorker::new(
                address.clone(),
                connector.clone(),
                reconnect_delay,
                write_buffer,
                events_tx.clone(),
                state_tx,
            ));
        }
        (Self { links }, workers)
    }

    /// The current state of every link, in configuration order.
    pub fn states(&self) -> Vec<(String, LinkState)> {
        self.links
            .iter()
            .map(|(address, rx)| (address.clone(), *rx.borrow()))
            .collect()
    }

    pub fn state(&self, address: &str) -> Option<LinkState> {
        self.links.get(address).map(|rx| *rx.borrow())
    }

    pub fn connected_count(&self) -> usize {
        self.links
            .values()
            .filter(|rx| *rx.borrow() == LinkState::Connected)
            .count()
    }

    /// A receiver that observes every state change of one link.
    pub fn watch(&self, address: &str) -> Option<watch::Receiver<LinkState>> {
        self.links.get(address).cloned()
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}
