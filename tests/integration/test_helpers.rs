// tests/integration/test_helpers.rs

//! Test helpers and utilities for integration tests

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tagrelay::core::ClientId;
use tagrelay::core::events::GatewayEvent;
use tagrelay::core::hooks::{ClientView, GatewayHook, GatewayHooks};
use tagrelay::core::protocol::{DispatchCommand, Payload};
use tagrelay::core::pubsub::{ClientSink, Outbound};
use tagrelay::core::state::{CoreSettings, GatewayCore, GatewayHandle};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

pub const LINK: &str = "backend:2015";

/// Sets up minimal tracing for tests (ignores the error if already initialized).
pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::new("warn"))
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}

/// TestContext drives a gateway core synchronously, one event at a time.
pub struct TestContext {
    pub core: GatewayCore,
    #[allow(dead_code)]
    pub handle: GatewayHandle,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_settings(CoreSettings::default(), GatewayHooks::new())
    }

    pub fn with_settings(settings: CoreSettings, hooks: GatewayHooks) -> Self {
        init_tracing();
        let (core, handle) = GatewayCore::new(settings, hooks);
        Self { core, handle }
    }

    /// Registers a client, optionally with a `tags` query parameter.
    pub fn connect(&mut self, id: ClientId, tags: Option<&str>) -> mpsc::Receiver<Outbound> {
        let (sink, rx) = ClientSink::channel(id, 64);
        let query = tags
            .map(|t| HashMap::from([("tags".to_string(), t.to_string())]))
            .unwrap_or_default();
        self.core.handle_event(GatewayEvent::ClientConnected {
            id,
            addr: None,
            sink,
            query,
        });
        rx
    }

    pub fn message(&mut self, id: ClientId, body: &str) {
        self.core.handle_event(GatewayEvent::ClientMessage {
            id,
            body: body.to_string(),
        });
    }

    pub fn close(&mut self, id: ClientId) {
        self.core.handle_event(GatewayEvent::ClientClosed { id });
    }

    /// Feeds a dispatch command as if it arrived on an upstream link.
    pub fn upstream(&mut self, command: DispatchCommand) {
        self.core.handle_event(GatewayEvent::LinkCommand {
            address: LINK.to_string(),
            command,
        });
    }

    /// Marks the upstream link connected, returning what the core writes to it.
    #[allow(dead_code)]
    pub fn link_up(&mut self) -> mpsc::Receiver<DispatchCommand> {
        self.link_up_with_buffer(LINK, 64)
    }

    /// Marks a link at `address` connected with a write queue of `capacity`.
    #[allow(dead_code)]
    pub fn link_up_with_buffer(
        &mut self,
        address: &str,
        capacity: usize,
    ) -> mpsc::Receiver<DispatchCommand> {
        let (writer, rx) = mpsc::channel(capacity);
        self.core.handle_event(GatewayEvent::LinkUp {
            address: address.to_string(),
            writer,
        });
        rx
    }

    #[allow(dead_code)]
    pub fn link_down(&mut self) {
        self.core.handle_event(GatewayEvent::LinkDown {
            address: LINK.to_string(),
        });
    }
}

/// Everything currently queued for a client.
pub fn drain(rx: &mut mpsc::Receiver<Outbound>) -> Vec<Outbound> {
    let mut frames = Vec::new();
    while let Ok(frame) = rx.try_recv() {
        frames.push(frame);
    }
    frames
}

pub fn payload(text: &str) -> Outbound {
    Outbound::Payload(Payload::from(text))
}

/// A hook that records every callback it receives.
#[derive(Default)]
#[allow(dead_code)]
pub struct RecordingHook {
    pub name: &'static str,
    pub calls: Arc<Mutex<Vec<String>>>,
}

impl GatewayHook for RecordingHook {
    fn on_connect(&self, client: &ClientView<'_>) {
        let keys: Vec<&str> = client.subscribed_keys.iter().map(String::as_str).collect();
        self.calls.lock().unwrap().push(format!(
            "{}:connect:{}:{}",
            self.name,
            client.id,
            keys.join(",")
        ));
    }

    fn on_message(&self, client: &ClientView<'_>, body: &str) {
        self.calls
            .lock()
            .unwrap()
            .push(format!("{}:message:{}:{}", self.name, client.id, body));
    }

    fn on_close(&self, client: &ClientView<'_>) {
        self.calls
            .lock()
            .unwrap()
            .push(format!("{}:close:{}", self.name, client.id));
    }
}
