// src/core/hooks.rs

//! Application hook points invoked by the gateway core.
//!
//! Hooks run after subscription bookkeeping for the event has been applied,
//! in the order they were added. They execute on the core task, so they must
//! not block; hand heavy work off to another task.

use crate::core::ClientId;
use indexmap::IndexSet;
use std::net::SocketAddr;
use std::sync::Arc;

/// A read-only view of a client handed to hooks.
#[derive(Debug, Clone, Copy)]
pub struct ClientView<'a> {
    pub id: ClientId,
    pub addr: Option<SocketAddr>,
    pub subscribed_keys: &'a IndexSet<String>,
}

pub trait GatewayHook: Send + Sync {
    fn on_connect(&self, _client: &ClientView<'_>) {}

    fn on_message(&self, _client: &ClientView<'_>, _body: &str) {}

    fn on_close(&self, _client: &ClientView<'_>) {}
}

/// An ordered list of hooks, fixed when the gateway is constructed.
#[derive(Clone, Default)]
pub struct GatewayHooks {
    hooks: Vec<Arc<dyn GatewayHook>>,
}

impl std::fmt::Debug for GatewayHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayHooks")
            .field("len", &self.hooks.len())
            .finish()
    }
}

impl GatewayHooks {
    pub fn new() -> Self {
        Default::default()
    }

    /// Appends a hook, builder style.
    pub fn with(mut self, hook: Arc<dyn GatewayHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    pub(crate) fn connected(&self, client: &ClientView<'_>) {
        for hook in &self.hooks {
            hook.on_connect(client);
        }
    }

    pub(crate) fn message(&self, client: &ClientView<'_>, body: &str) {
        for hook in &self.hooks {
            hook.on_message(client, body);
        }
    }

    pub(crate) fn closed(&self, client: &ClientView<'_>) {
        for hook in &self.hooks {
            hook.on_close(client);
        }
    }
}
