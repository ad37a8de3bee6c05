// src/core/hub/config.rs

use crate::core::protocol::DEFAULT_MAX_LINE_LENGTH;
use anyhow::{Result, anyhow};
use serde::Deserialize;
use tokio::fs;

#[derive(Debug, Clone, Deserialize)]
pub struct HubConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_max_line_length")]
    pub max_line_length: usize,

    /// Commands buffered per link before a slow link starts skipping.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    2015
}

fn default_max_line_length() -> usize {
    DEFAULT_MAX_LINE_LENGTH
}

fn default_channel_capacity() -> usize {
    4096
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_line_length: default_max_line_length(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl HubConfig {
    pub async fn from_file(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path).await?;
        let config: HubConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_line_length == 0 {
            return Err(anyhow!("max_line_length must be greater than 0"));
        }
        if self.channel_capacity == 0 {
            return Err(anyhow!("channel_capacity must be greater than 0"));
        }
        Ok(())
    }
}
