// src/core/pubsub/registry.rs

//! Tracks every open client connection and its per-connection routing state.

use super::SubscriptionIndex;
use crate::core::ClientId;
use crate::core::errors::RelayError;
use crate::core::protocol::Payload;
use indexmap::{IndexMap, IndexSet};
use std::net::SocketAddr;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::debug;

/// A frame queued for a client's socket writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Payload(Payload),
    /// Close the connection with a protocol error reason.
    Close(String),
}

/// The sending half of a client's bounded outbound queue.
///
/// When the last `ClientSink` for a connection is dropped, its writer drains
/// the queue and closes the socket.
#[derive(Debug, Clone)]
pub struct ClientSink {
    id: ClientId,
    tx: mpsc::Sender<Outbound>,
}

impl ClientSink {
    /// Creates a sink together with the receiver its connection writer drains.
    pub fn channel(id: ClientId, capacity: usize) -> (Self, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { id, tx }, rx)
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    /// Queues a payload without waiting. A full queue means the client is not
    /// keeping up and is reported as `SlowConsumer`.
    pub fn send(&self, payload: &Payload) -> Result<(), RelayError> {
        self.tx
            .try_send(Outbound::Payload(payload.clone()))
            .map_err(|e| match e {
                TrySendError::Full(_) => RelayError::SlowConsumer(self.id),
                TrySendError::Closed(_) => RelayError::ClientGone(self.id),
            })
    }

    /// Asks the writer to close the socket. Best effort: if the queue is full
    /// the socket is still closed once the registry drops this sink.
    pub fn close(&self, reason: impl Into<String>) {
        let _ = self.tx.try_send(Outbound::Close(reason.into()));
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// One open client session.
#[derive(Debug)]
pub struct ClientRecord {
    pub id: ClientId,
    pub addr: Option<SocketAddr>,
    pub sink: ClientSink,
    /// Topic keys this connection currently holds.
    pub subscribed_keys: IndexSet<String>,
    /// The highest dispatch sequence already delivered to this connection.
    /// Starts at 0, below any real sequence number.
    pub last_delivered_seq: u64,
}

/// The keys added and removed by a subscription update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionDelta {
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

impl SubscriptionDelta {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// The exclusive owner of all `ClientRecord`s.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    clients: IndexMap<ClientId, ClientRecord>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Default::default()
    }

    /// Registers a freshly accepted connection. Returns `false` if the id is
    /// already taken, in which case the existing record is left untouched.
    pub fn register(&mut self, id: ClientId, addr: Option<SocketAddr>, sink: ClientSink) -> bool {
        if self.clients.contains_key(&id) {
            return false;
        }
        self.clients.insert(
            id,
            ClientRecord {
                id,
                addr,
                sink,
                subscribed_keys: IndexSet::new(),
                last_delivered_seq: 0,
            },
        );
        true
    }

    /// Removes a connection and purges it from every topic in `index`.
    ///
    /// Safe to call more than once; only the first call returns the record.
    pub fn deregister(
        &mut self,
        id: ClientId,
        index: &mut SubscriptionIndex,
    ) -> Option<ClientRecord> {
        let record = self.clients.swap_remove(&id)?;
        for key in &record.subscribed_keys {
            index.unsubscribe(key, id);
        }
        debug!(
            "Deregistered client {} ({} subscriptions released).",
            id,
            record.subscribed_keys.len()
        );
        Some(record)
    }

    /// Replaces the connection's key set with `new_keys`, unsubscribing removed
    /// keys and subscribing added ones.
    ///
    /// Returns `None` if the connection is not registered.
    pub fn update_subscriptions(
        &mut self,
        id: ClientId,
        new_keys: IndexSet<String>,
        index: &mut SubscriptionIndex,
    ) -> Option<SubscriptionDelta> {
        let record = self.clients.get_mut(&id)?;
        let new_keys: IndexSet<String> = new_keys
            .into_iter()
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
            .collect();

        let mut delta = SubscriptionDelta::default();
        for key in record.subscribed_keys.difference(&new_keys) {
            index.unsubscribe(key, id);
            delta.removed.push(key.clone());
        }
        for key in new_keys.difference(&record.subscribed_keys) {
            index.subscribe(key, id);
            delta.added.push(key.clone());
        }
        record.subscribed_keys = new_keys;
        Some(delta)
    }

    /// Adds `keys` to the connection's existing subscriptions without removing any.
    pub fn merge_subscriptions(
        &mut self,
        id: ClientId,
        keys: IndexSet<String>,
        index: &mut SubscriptionIndex,
    ) -> Option<SubscriptionDelta> {
        let mut merged = self.clients.get(&id)?.subscribed_keys.clone();
        merged.extend(keys);
        self.update_subscriptions(id, merged, index)
    }

    pub fn get(&self, id: ClientId) -> Option<&ClientRecord> {
        self.clients.get(&id)
    }

    pub fn get_mut(&mut self, id: ClientId) -> Option<&mut ClientRecord> {
        self.clients.get_mut(&id)
    }

    pub fn contains(&self, id: ClientId) -> bool {
        self.clients.contains_key(&id)
    }

    /// Every currently registered connection, including those with no subscriptions.
    pub fn resolve_all(&self) -> Vec<ClientId> {
        self.clients.keys().copied().collect()
    }

    pub(crate) fn records_mut(&mut self) -> impl Iterator<Item = &mut ClientRecord> {
        self.clients.values_mut()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
