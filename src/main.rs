// src/main.rs

//! The main entry point for the tagrelay gateway.

use anyhow::Result;
use std::env;
use std::path::Path;
use tagrelay::config::Config;
use tagrelay::server;
use tracing::{error, info};
use tracing_subscriber::{filter::EnvFilter, prelude::*};

const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[tokio::main]
async fn main() -> Result<()> {
    const VERSION: &str = env!("CARGO_PKG_VERSION");

    let args: Vec<String> = env::args().collect();

    if args.contains(&"--version".to_string()) {
        println!("tagrelay version {VERSION}");
        return Ok(());
    }

    if args.len() > 1 && args[1] == "--hub" {
        // --- Hub Mode ---
        if args.len() != 3 {
            eprintln!("Usage: tagrelay --hub /path/to/hub.toml");
            std::process::exit(1);
        }
        let config_path = &args[2];

        let log_level = std::env::var("RUST_LOG")
            .unwrap_or_else(|_| "info,tagrelay::core::hub=debug".to_string());
        tracing_subscriber::fmt()
            .with_env_filter(log_level)
            .compact()
            .with_ansi(true)
            .init();

        info!("Starting tagrelay in hub mode...");
        if let Err(e) = tagrelay::hub::run(config_path).await {
            error!("Hub runtime error: {}", e);
            return Err(e);
        }
        return Ok(());
    }

    // --- Gateway Mode ---
    let explicit_config = args
        .iter()
        .position(|arg| arg == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());
    let config_path = explicit_config.unwrap_or(DEFAULT_CONFIG_PATH);

    // Without an explicit --config, a missing default file means built-in defaults.
    let loaded = if explicit_config.is_none() && !Path::new(config_path).exists() {
        Ok(Config::default())
    } else {
        Config::from_file(config_path)
    };
    let mut config = match loaded {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration from \"{config_path}\": {e:#}");
            std::process::exit(1);
        }
    };

    if let Some(port_index) = args.iter().position(|arg| arg == "--port") {
        if let Some(port_str) = args.get(port_index + 1) {
            match port_str.parse::<u16>() {
                Ok(port) => config.port = port,
                Err(_) => {
                    eprintln!("Invalid port number: {port_str}");
                    std::process::exit(1);
                }
            }
        } else {
            eprintln!("--port flag requires a value");
            std::process::exit(1);
        }
        if let Err(e) = config.validate() {
            eprintln!("Invalid configuration: {e}");
            std::process::exit(1);
        }
    }

    let initial_log_level =
        std::env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.clone());
    tracing_subscriber::registry()
        .with(EnvFilter::new(initial_log_level))
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_ansi(true),
        )
        .init();

    if let Err(e) = server::run(config).await {
        error!("Gateway runtime error: {}", e);
        return Err(e);
    }

    Ok(())
}
