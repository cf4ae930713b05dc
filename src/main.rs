// src/main.rs

//! The main entry point for the ZirconDB server application.

use anyhow::Result;
use std::env;
use tracing::error;
use tracing_subscriber::filter::EnvFilter;
use zircondb::config::Config;
use zircondb::server;

#[tokio::main]
async fn main() -> Result<()> {
    const VERSION: &str = env!("CARGO_PKG_VERSION");

    let args: Vec<String> = env::args().collect();

    if args.contains(&"--version".to_string()) {
        println!("ZirconDB version {VERSION}");
        return Ok(());
    }

    // The configuration path can be provided via --config; otherwise it
    // defaults to "config.toml". A missing file falls back to defaults so a
    // bare `zircondb` still starts a standalone node.
    let config_path = args
        .iter()
        .position(|arg| arg == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str())
        .unwrap_or("config.toml");

    let mut config = if std::path::Path::new(config_path).exists() {
        match Config::from_file(config_path) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("Failed to load configuration from \"{config_path}\": {e}");
                std::process::exit(1);
            }
        }
    } else {
        Config::default()
    };

    // Override port if provided as a command-line argument.
    if let Some(port_index) = args.iter().position(|arg| arg == "--port") {
        let Some(port_str) = args.get(port_index + 1) else {
            eprintln!("--port flag requires a value");
            std::process::exit(1);
        };
        match port_str.parse::<u16>() {
            Ok(port) => config.port = port,
            Err(_) => {
                eprintln!("Invalid port number: {port_str}");
                std::process::exit(1);
            }
        }
    }

    // Initialize logging, preferring RUST_LOG over the configured level.
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.clone());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(log_level))
        .compact()
        .with_ansi(true)
        .init();

    if let Err(e) = server::run(config).await {
        error!("Server runtime error: {}", e);
        return Err(e);
    }

    Ok(())
}
