// src/config.rs

//! Manages gateway configuration: loading, defaults, and validation.

use crate::core::ingress::{IngressPolicy, SubscriptionMode};
use crate::core::protocol::DEFAULT_MAX_LINE_LENGTH;
use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::time::Duration;
use tracing::warn;

/// How client messages are read as subscription requests.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct IngressConfig {
    #[serde(default)]
    pub policy: IngressPolicy,
    /// The field carrying the key list, both in the upgrade query and in message bodies.
    #[serde(default = "default_tags_field")]
    pub tags_field: String,
    #[serde(default)]
    pub subscription_mode: SubscriptionMode,
}

impl Default for IngressConfig {
    fn default() -> Self {
        Self {
            policy: IngressPolicy::default(),
            tags_field: default_tags_field(),
            subscription_mode: SubscriptionMode::default(),
        }
    }
}

fn default_tags_field() -> String {
    "tags".to_string()
}

/// The backend links the gateway keeps open.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct UpstreamConfig {
    #[serde(default = "default_upstream_addresses")]
    pub addresses: Vec<String>,
    /// Fixed delay between a link failure and the next connect attempt.
    #[serde(with = "humantime_serde", default = "default_reconnect_delay")]
    pub reconnect_delay: Duration,
    #[serde(default = "default_max_line_length")]
    pub max_line_length: usize,
    /// Publishes queued per link while its socket is busy. A full queue skips the link.
    #[serde(default = "default_write_buffer")]
    pub write_buffer: usize,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            addresses: default_upstream_addresses(),
            reconnect_delay: default_reconnect_delay(),
            max_line_length: default_max_line_length(),
            write_buffer: default_write_buffer(),
        }
    }
}

fn default_upstream_addresses() -> Vec<String> {
    vec!["127.0.0.1:2015".to_string()]
}
fn default_reconnect_delay() -> Duration {
    Duration::from_secs(1)
}
fn default_max_line_length() -> usize {
    DEFAULT_MAX_LINE_LENGTH
}
fn default_write_buffer() -> usize {
    1024
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct HeartbeatConfig {
    #[serde(with = "humantime_serde", default = "default_heartbeat_interval")]
    pub interval: Duration,
    /// Sent to every client on each tick. Empty disables heartbeats.
    #[serde(default)]
    pub payload: String,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: default_heartbeat_interval(),
            payload: String::new(),
        }
    }
}

impl HeartbeatConfig {
    pub fn enabled(&self) -> bool {
        !self.payload.is_empty()
    }
}

fn default_heartbeat_interval() -> Duration {
    Duration::from_secs(25)
}

/// Configuration for the Prometheus metrics exporter.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
        }
    }
}

fn default_metrics_port() -> u16 {
    9272
}

/// The gateway's resolved configuration.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// The HTTP path clients upgrade to a WebSocket on.
    #[serde(default = "default_path")]
    pub path: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_max_clients")]
    pub max_clients: usize,
    /// Capacity of each client's outbound queue.
    #[serde(default = "default_client_buffer")]
    pub client_buffer: usize,
    #[serde(default)]
    pub ingress: IngressConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            path: default_path(),
            log_level: default_log_level(),
            max_clients: default_max_clients(),
            client_buffer: default_client_buffer(),
            ingress: IngressConfig::default(),
            upstream: UpstreamConfig::default(),
            heartbeat: HeartbeatConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    7272
}
fn default_path() -> String {
    "/".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_max_clients() -> usize {
    10000
}
fn default_client_buffer() -> usize {
    1024
}

impl Config {
    /// Creates a new `Config` instance by reading and parsing a TOML file.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at '{path}'"))?;
        Self::from_toml_str(&contents)
            .with_context(|| format!("Invalid configuration in '{path}'"))
    }

    /// Parses and validates configuration from TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents).context("Failed to parse TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration to ensure logical consistency.
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(anyhow!("port cannot be 0"));
        }
        if self.host.trim().is_empty() {
            return Err(anyhow!("host cannot be empty"));
        }
        if !self.path.starts_with('/') {
            return Err(anyhow!("path must start with '/'"));
        }
        if self.max_clients == 0 {
            return Err(anyhow!("max_clients cannot be 0"));
        }
        if self.client_buffer == 0 {
            return Err(anyhow!("client_buffer cannot be 0"));
        }
        if self.ingress.tags_field.trim().is_empty() {
            return Err(anyhow!("ingress.tags_field cannot be empty"));
        }

        if self.upstream.addresses.is_empty() {
            return Err(anyhow!("upstream.addresses must list at least one address"));
        }
        let mut seen = HashSet::new();
        for address in &self.upstream.addresses {
            if address.trim().is_empty() {
                return Err(anyhow!("upstream.addresses cannot contain an empty address"));
            }
            if !seen.insert(address.as_str()) {
                return Err(anyhow!("duplicate upstream address '{}'", address));
            }
        }
        if self.upstream.reconnect_delay.is_zero() {
            return Err(anyhow!("upstream.reconnect_delay must be greater than 0"));
        }
        if self.upstream.max_line_length == 0 {
            return Err(anyhow!("upstream.max_line_length cannot be 0"));
        }
        if self.upstream.write_buffer == 0 {
            return Err(anyhow!("upstream.write_buffer cannot be 0"));
        }

        if self.heartbeat.enabled() && self.heartbeat.interval.is_zero() {
            return Err(anyhow!(
                "heartbeat.interval must be greater than 0 when heartbeat.payload is set"
            ));
        }

        if self.metrics.enabled {
            if self.metrics.port == 0 {
                return Err(anyhow!("metrics.port cannot be 0"));
            }
            if self.metrics.port == self.port {
                return Err(anyhow!(
                    "metrics.port cannot be the same as the main server port"
                ));
            }
        }

        if self.client_buffer < 16 {
            warn!(
                "low client_buffer setting: {}. Clients may be dropped as slow consumers.",
                self.client_buffer
            );
        }

        Ok(())
    }
}
