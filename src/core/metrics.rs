// src/core/metrics.rs

//! Defines and registers Prometheus metrics for gateway monitoring.
//!
//! This module uses `lazy_static` to ensure that metrics are registered only once
//! globally for the entire application lifecycle.

use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Gauge, TextEncoder, register_counter, register_counter_vec,
    register_gauge,
};

lazy_static! {
    // --- Gauges ---
    /// The number of clients currently connected to the gateway.
    pub static ref CONNECTED_CLIENTS: Gauge =
        register_gauge!("tagrelay_connected_clients", "Number of currently connected clients.").unwrap();
    /// The number of topics with at least one subscriber.
    pub static ref ACTIVE_TOPICS: Gauge =
        register_gauge!("tagrelay_active_topics", "Number of topics with at least one subscriber.").unwrap();
    /// The number of upstream links currently in the Connected state.
    pub static ref UPSTREAM_LINKS_CONNECTED: Gauge =
        register_gauge!("tagrelay_upstream_links_connected", "Number of connected upstream links.").unwrap();


    // --- Counters ---
    /// The total number of client connections accepted since startup.
    pub static ref CONNECTIONS_RECEIVED_TOTAL: Counter =
        register_counter!("tagrelay_connections_received_total", "Total number of client connections received.").unwrap();
    /// The total number of dispatch commands received from upstream, labeled by type and link.
    pub static ref DISPATCH_COMMANDS_TOTAL: CounterVec =
        register_counter_vec!("tagrelay_dispatch_commands_total", "Total number of dispatch commands, labeled by type and upstream link.", &["type", "link"]).unwrap();
    /// The total number of payloads handed to client queues.
    pub static ref DELIVERIES_TOTAL: Counter =
        register_counter!("tagrelay_deliveries_total", "Total number of payloads delivered to clients.").unwrap();
    /// The total number of repeat matches suppressed by the dedup sequence.
    pub static ref DEDUPLICATED_TOTAL: Counter =
        register_counter!("tagrelay_deduplicated_total", "Total number of duplicate deliveries suppressed.").unwrap();
    /// The total number of per-client send failures.
    pub static ref SEND_FAILURES_TOTAL: Counter =
        register_counter!("tagrelay_send_failures_total", "Total number of failed client sends.").unwrap();
    /// The total number of malformed dispatch commands dropped.
    pub static ref MALFORMED_COMMANDS_TOTAL: Counter =
        register_counter!("tagrelay_malformed_commands_total", "Total number of malformed dispatch commands dropped.").unwrap();
    /// The total number of upstream connect attempts.
    pub static ref UPSTREAM_CONNECT_ATTEMPTS_TOTAL: Counter =
        register_counter!("tagrelay_upstream_connect_attempts_total", "Total number of upstream connect attempts.").unwrap();
    /// The total number of publish calls rejected because no link was connected.
    pub static ref PUBLISH_NOT_READY_TOTAL: Counter =
        register_counter!("tagrelay_publish_not_ready_total", "Total number of publishes rejected with no upstream link.").unwrap();
    /// The total number of times a publish skipped a link whose write queue was full.
    pub static ref PUBLISH_LINK_FULL_TOTAL: Counter =
        register_counter!("tagrelay_publish_link_full_total", "Total number of publishes that skipped a link with a full write queue.").unwrap();
    /// The total number of heartbeat rounds sent.
    pub static ref HEARTBEATS_TOTAL: Counter =
        register_counter!("tagrelay_heartbeats_total", "Total number of heartbeat rounds.").unwrap();
}

/// Gathers all registered metrics and encodes them in the Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder
        .encode_to_string(&metric_families)
        .unwrap_or_default()
}
