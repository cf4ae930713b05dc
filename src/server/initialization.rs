// src/server/initialization.rs

//! Handles the server initialization process: state setup, cluster state
//! loading, and binding the client listener.

use super::context::{InitChannels, ServerContext};
use crate::config::Config;
use crate::core::state::ServerState;
use anyhow::Result;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{Semaphore, broadcast};
use tokio::task::JoinSet;
use tracing::info;

/// Initializes all server components before starting the main loop.
pub async fn setup(config: Config) -> Result<ServerContext> {
    let (shutdown_tx, _) = broadcast::channel(1);

    let server_init = ServerState::initialize(config, shutdown_tx.clone())?;
    let server_state = server_init.state.clone();
    info!("Server state initialized.");

    if let Some(cluster) = server_state.cluster.as_ref() {
        info!("Server starting in CLUSTER mode. Node ID: {}", cluster.my_id);
    } else {
        info!("Server starting in STANDALONE mode.");
    }

    let (host, port, max_clients) = {
        let config = server_state.config.lock().await;
        (config.host.clone(), config.port, config.max_clients)
    };
    let listener = TcpListener::bind((host.as_str(), port)).await?;
    info!("ZirconDB server listening on {}:{}", host, port);
    let connection_permits = Arc::new(Semaphore::new(max_clients));

    Ok(ServerContext {
        state: server_state,
        init_channels: Some(InitChannels {
            cluster_gossip_rx: server_init.cluster_gossip_rx,
            cluster_events_rx: server_init.cluster_events_rx,
            failover_rx: server_init.failover_rx,
        }),
        listener,
        shutdown_tx,
        background_tasks: JoinSet::new(),
        connection_permits,
    })
}
