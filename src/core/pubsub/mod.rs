// src/core/pubsub/mod.rs

//! The core publish-subscribe system.
//!
//! It owns the topic index, the registry of open connections, and the
//! dispatcher that resolves a dispatch command into a deduplicated delivery set.
//! None of these types perform I/O or locking; they are owned and mutated by the
//! single gateway core task.

use crate::core::ClientId;
use indexmap::IndexSet;
use std::collections::HashMap;
use tracing::debug;

// Export sub-modules.
pub mod dispatcher;
pub mod registry;

pub use dispatcher::{DeliveryReport, Dispatcher};
pub use registry::{ClientRecord, ClientSink, ConnectionRegistry, Outbound, SubscriptionDelta};

/// Splits a comma-separated key list, trimming each entry and discarding empty ones.
/// Duplicates are collapsed while preserving first-seen order.
pub fn split_topic_keys(raw: &str) -> IndexSet<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .map(str::to_string)
        .collect()
}

/// `SubscriptionIndex` maps a topic key to the set of connections subscribed to it.
///
/// The index holds connection ids only. The `ConnectionRegistry` owns the
/// connections and keeps this index in sync on every subscription change and
/// on deregistration.
#[derive(Debug, Default)]
pub struct SubscriptionIndex {
    topics: HashMap<String, IndexSet<ClientId>>,
}

impl SubscriptionIndex {
    pub fn new() -> Self {
        Default::default()
    }

    /// Adds `client` under `key`. Adding twice is a no-op, and keys that are
    /// empty after trimming are silently dropped.
    ///
    /// Returns `true` if the client was newly added.
    pub fn subscribe(&mut self, key: &str, client: ClientId) -> bool {
        let key = key.trim();
        if key.is_empty() {
            return false;
        }
        match self.topics.get_mut(key) {
            Some(subscribers) => subscribers.insert(client),
            None => {
                self.topics
                    .insert(key.to_string(), IndexSet::from([client]));
                true
            }
        }
    }

    /// Removes `client` from `key`. Removing a non-member is a no-op.
    /// A key whose subscriber set becomes empty is pruned.
    ///
    /// Returns `true` if the client was subscribed.
    pub fn unsubscribe(&mut self, key: &str, client: ClientId) -> bool {
        let key = key.trim();
        let Some(subscribers) = self.topics.get_mut(key) else {
            return false;
        };
        let removed = subscribers.swap_remove(&client);
        if subscribers.is_empty() {
            self.topics.remove(key);
            debug!("Pruned empty topic '{}'.", key);
        }
        removed
    }

    /// Returns the union of the subscriber sets of `keys`. Unknown keys
    /// contribute nothing.
    pub fn resolve<S: AsRef<str>>(&self, keys: &[S]) -> IndexSet<ClientId> {
        self.resolve_iter(keys).collect()
    }

    /// Lazily walks the subscriber sets of `keys` in order. A connection
    /// subscribed to several of the keys is yielded once per matching key;
    /// the dispatcher's sequence check collapses those repeats.
    pub fn resolve_iter<'a, S: AsRef<str>>(
        &'a self,
        keys: &'a [S],
    ) -> impl Iterator<Item = ClientId> + 'a {
        keys.iter()
            .filter_map(|key| self.topics.get(key.as_ref().trim()))
            .flat_map(|subscribers| subscribers.iter().copied())
    }

    /// Returns `true` if `client` is currently listed under `key`.
    pub fn is_subscribed(&self, key: &str, client: ClientId) -> bool {
        self.topics
            .get(key.trim())
            .is_some_and(|subscribers| subscribers.contains(&client))
    }

    /// Returns the number of subscribers for a specific topic.
    pub fn subscriber_count(&self, key: &str) -> usize {
        self.topics.get(key.trim()).map_or(0, IndexSet::len)
    }

    /// Returns the number of topics with at least one subscriber.
    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }

    /// Returns a list of all active topics.
    pub fn topics(&self) -> Vec<String> {
        self.topics.keys().cloned().collect()
    }
}
