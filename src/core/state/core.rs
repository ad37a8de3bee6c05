// src/core/state/core.rs

//! Defines `GatewayCore`, the event loop that owns the subscription index, the
//! connection registry, the dispatch sequence and the upstream link writers.

use super::handle::GatewayHandle;
use crate::config::Config;
use crate::core::errors::RelayError;
use crate::core::events::{EVENT_CHANNEL_CAPACITY, GatewayEvent, GatewayStats};
use crate::core::hooks::{ClientView, GatewayHooks};
use crate::core::ingress::{Ingress, IngressOutcome, SubscriptionMode};
use crate::core::metrics;
use crate::core::protocol::{DispatchCommand, Payload};
use crate::core::pubsub::dispatcher::deliver_unsequenced;
use crate::core::pubsub::{
    ClientRecord, ClientSink, ConnectionRegistry, DeliveryReport, Dispatcher, SubscriptionIndex,
};
use crate::core::ClientId;
use indexmap::{IndexMap, IndexSet};
use std::collections::HashMap;
use std::net::SocketAddr;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

/// The parts of the configuration the core needs.
#[derive(Debug, Clone, Default)]
pub struct CoreSettings {
    pub ingress: Ingress,
    pub subscription_mode: SubscriptionMode,
    /// Sent to every client on each heartbeat tick. `None` disables heartbeats.
    pub heartbeat_payload: Option<Payload>,
}

impl CoreSettings {
    pub fn from_config(config: &Config) -> Self {
        let payload = config.heartbeat.payload.as_str();
        Self {
            ingress: Ingress::new(config.ingress.policy, config.ingress.tags_field.clone()),
            subscription_mode: config.ingress.subscription_mode,
            heartbeat_payload: (!payload.is_empty()).then(|| Payload::from(payload)),
        }
    }
}

/// The gateway's single logical thread of control.
///
/// All routing state lives here and is only touched from `handle_event`, so
/// no locking is required.
pub struct GatewayCore {
    index: SubscriptionIndex,
    registry: ConnectionRegistry,
    dispatcher: Dispatcher,
    /// Writers for links currently in the Connected state, keyed by address.
    links: IndexMap<String, mpsc::Sender<DispatchCommand>>,
    settings: CoreSettings,
    hooks: GatewayHooks,
    events_rx: mpsc::Receiver<GatewayEvent>,
}

impl GatewayCore {
    /// Creates a new core and the handle used to feed it events.
    pub fn new(settings: CoreSettings, hooks: GatewayHooks) -> (Self, GatewayHandle) {
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let core = Self {
            index: SubscriptionIndex::new(),
            registry: ConnectionRegistry::new(),
            dispatcher: Dispatcher::new(),
            links: IndexMap::new(),
            settings,
            hooks,
            events_rx,
        };
        (core, GatewayHandle::new(events_tx))
    }

    /// Processes events until shutdown or until every handle is dropped.
    pub async fn run(mut self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!("Gateway core started.");
        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => {
                    info!("Gateway core shutting down.");
                    break;
                }
                event = self.events_rx.recv() => {
                    match event {
                        Some(event) => self.handle_event(event),
                        None => {
                            info!("All gateway handles dropped. Gateway core stopping.");
                            break;
                        }
                    }
                }
            }
        }

        for id in self.registry.resolve_all() {
            if let Some(record) = self.registry.deregister(id, &mut self.index) {
                record.sink.close("server shutting down");
            }
        }
        metrics::ACTIVE_TOPICS.set(0.0);
        metrics::UPSTREAM_LINKS_CONNECTED.set(0.0);
    }

    /// Applies a single event to the routing state. Never blocks.
    pub fn handle_event(&mut self, event: GatewayEvent) {
        match event {
            GatewayEvent::ClientConnected {
                id,
                addr,
                sink,
                query,
            } => self.on_client_connected(id, addr, sink, &query),
            GatewayEvent::ClientMessage { id, body } => self.on_client_message(id, &body),
            GatewayEvent::ClientClosed { id } => {
                if self.drop_client(id, None) {
                    debug!("Client {} closed.", id);
                }
            }
            GatewayEvent::LinkUp { address, writer } => {
                info!("Upstream link {} is ready for publishing.", address);
                self.links.insert(address, writer);
                metrics::UPSTREAM_LINKS_CONNECTED.set(self.links.len() as f64);
            }
            GatewayEvent::LinkCommand { address, command } => {
                self.on_link_command(&address, &command);
            }
            GatewayEvent::LinkDown { address } => {
                if self.links.swap_remove(&address).is_some() {
                    info!("Upstream link {} is no longer available.", address);
                }
                metrics::UPSTREAM_LINKS_CONNECTED.set(self.links.len() as f64);
            }
            GatewayEvent::Publish { command, reply } => {
                let _ = reply.send(self.publish(command));
            }
            GatewayEvent::Heartbeat => self.on_heartbeat(),
            GatewayEvent::Snapshot { reply } => {
                let _ = reply.send(self.stats());
            }
        }
    }

    pub fn stats(&self) -> GatewayStats {
        GatewayStats {
            clients: self.registry.len(),
            topics: self.index.topic_count(),
            connected_links: self.links.len(),
            last_seq: self.dispatcher.last_seq(),
        }
    }

    pub fn index(&self) -> &SubscriptionIndex {
        &self.index
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    fn on_client_connected(
        &mut self,
        id: ClientId,
        addr: Option<SocketAddr>,
        sink: ClientSink,
        query: &HashMap<String, String>,
    ) {
        if !self.registry.register(id, addr, sink) {
            warn!("Client id {} is already registered; ignoring duplicate.", id);
            return;
        }
        if let Some(keys) = self.settings.ingress.from_query(query) {
            self.apply_subscription(id, keys);
        }
        if let Some(record) = self.registry.get(id) {
            self.hooks.connected(&view(record));
        }
    }

    fn on_client_message(&mut self, id: ClientId, body: &str) {
        if !self.registry.contains(id) {
            debug!("Ignoring message from unknown client {}.", id);
            return;
        }
        match self.settings.ingress.interpret(body) {
            IngressOutcome::Subscribe(keys) => self.apply_subscription(id, keys),
            IngressOutcome::Ignore => {}
            IngressOutcome::Violation(reason) => {
                warn!("Closing client {}: protocol violation ({}).", id, reason);
                self.drop_client(id, Some(&reason));
                return;
            }
        }
        if let Some(record) = self.registry.get(id) {
            self.hooks.message(&view(record), body);
        }
    }

    fn apply_subscription(&mut self, id: ClientId, keys: IndexSet<String>) {
        let delta = match self.settings.subscription_mode {
            SubscriptionMode::Merge => {
                self.registry
                    .merge_subscriptions(id, keys, &mut self.index)
            }
            SubscriptionMode::Replace => {
                self.registry
                    .update_subscriptions(id, keys, &mut self.index)
            }
        };
        if let Some(delta) = delta
            && !delta.is_empty()
        {
            debug!(
                "Client {} subscriptions changed: +{:?} -{:?}",
                id, delta.added, delta.removed
            );
            metrics::ACTIVE_TOPICS.set(self.index.topic_count() as f64);
        }
    }

    fn on_link_command(&mut self, address: &str, command: &DispatchCommand) {
        metrics::DISPATCH_COMMANDS_TOTAL
            .with_label_values(&[command.kind(), address])
            .inc();
        let report = self
            .dispatcher
            .dispatch(command, &self.index, &mut self.registry);
        debug!(
            "Dispatched {} #{} from {}: {} delivered, {} deduplicated, {} failed.",
            command.kind(),
            report.seq,
            address,
            report.delivered,
            report.deduplicated,
            report.failed.len()
        );
        metrics::DEDUPLICATED_TOTAL.inc_by(report.deduplicated as f64);
        self.settle(report);
    }

    fn on_heartbeat(&mut self) {
        let Some(payload) = self.settings.heartbeat_payload.clone() else {
            return;
        };
        let report = deliver_unsequenced(&payload, &self.registry);
        metrics::HEARTBEATS_TOTAL.inc();
        self.settle(report);
    }

    // Records deliveries and cleans up every connection whose send failed.
    fn settle(&mut self, report: DeliveryReport) {
        metrics::DELIVERIES_TOTAL.inc_by(report.delivered as f64);
        for (id, error) in report.failed {
            metrics::SEND_FAILURES_TOTAL.inc();
            warn!("Dropping client {} after failed send: {}", id, error);
            self.drop_client(id, Some("send failed"));
        }
    }

    /// Queues `command` on every connected link that can take it. Links whose
    /// writer has gone away are forgotten; links with a full queue are skipped.
    fn publish(&mut self, command: DispatchCommand) -> Result<usize, RelayError> {
        let mut written = 0;
        self.links
            .retain(|address, writer| match writer.try_send(command.clone()) {
                Ok(()) => {
                    written += 1;
                    true
                }
                Err(TrySendError::Full(_)) => {
                    metrics::PUBLISH_LINK_FULL_TOTAL.inc();
                    warn!(
                        "Upstream link {} is not draining its write queue; skipping it.",
                        address
                    );
                    true
                }
                Err(TrySendError::Closed(_)) => {
                    debug!("Upstream link {} writer is closed; removing it.", address);
                    false
                }
            });
        metrics::UPSTREAM_LINKS_CONNECTED.set(self.links.len() as f64);

        if written == 0 {
            metrics::PUBLISH_NOT_READY_TOTAL.inc();
            warn!("No upstream link accepted {}; it was dropped.", command.kind());
            return Err(RelayError::NotReady);
        }
        Ok(written)
    }

    // Deregisters a client exactly once. Returns `false` if it was already gone.
    fn drop_client(&mut self, id: ClientId, reason: Option<&str>) -> bool {
        let Some(record) = self.registry.deregister(id, &mut self.index) else {
            return false;
        };
        if let Some(reason) = reason {
            record.sink.close(reason);
        }
        metrics::ACTIVE_TOPICS.set(self.index.topic_count() as f64);
        self.hooks.closed(&view(&record));
        true
    }
}

fn view(record: &ClientRecord) -> ClientView<'_> {
    ClientView {
        id: record.id,
        addr: record.addr,
        subscribed_keys: &record.subscribed_keys,
    }
}
