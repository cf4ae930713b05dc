// src/config.rs

//! Manages server configuration: loading from TOML and resolving the
//! addresses this node announces to the rest of the cluster.

use crate::core::ZirconError;
use crate::core::cluster::ClusterConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;

/// The server configuration, loaded once at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Shared secret for the cluster bus. When set, every gossip datagram is
    /// HMAC-signed and unsigned packets are rejected.
    pub password: Option<String>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_max_clients")]
    pub max_clients: usize,
    #[serde(default)]
    pub cluster: ClusterConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            password: None,
            log_level: default_log_level(),
            max_clients: default_max_clients(),
            cluster: ClusterConfig::default(),
        }
    }
}

impl Config {
    /// Loads and parses the configuration from a TOML file.
    pub fn from_file(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file '{path}'"))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file '{path}'"))?;
        Ok(config)
    }

    /// The client-facing address this node announces to its peers.
    pub fn announce_addr(&self) -> String {
        let ip = self.cluster.announce_ip.clone().unwrap_or_else(|| self.host.clone());
        let port = self.cluster.announce_port.unwrap_or(self.port);
        format!("{ip}:{port}")
    }

    /// The cluster-bus address this node announces to its peers.
    /// Fails when `port + bus_port_offset` leaves the valid port range.
    pub fn announce_bus_addr(&self) -> Result<String, ZirconError> {
        let ip = self.cluster.announce_ip.clone().unwrap_or_else(|| self.host.clone());
        let bus_port = self.bus_port()?;
        Ok(format!("{ip}:{bus_port}"))
    }

    /// The UDP port the cluster bus binds to.
    pub fn bus_port(&self) -> Result<u16, ZirconError> {
        if let Some(port) = self.cluster.announce_bus_port {
            return Ok(port);
        }
        u32::from(self.port)
            .checked_add(u32::from(self.cluster.bus_port_offset))
            .and_then(|p| u16::try_from(p).ok())
            .ok_or_else(|| {
                ZirconError::Internal(format!(
                    "Calculated cluster bus port ({}) exceeds the valid range (max 65535). \
                     Please check 'port' and 'bus_port_offset' settings.",
                    u32::from(self.port) + u32::from(self.cluster.bus_port_offset)
                ))
            })
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    7979
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_max_clients() -> usize {
    10000
}
