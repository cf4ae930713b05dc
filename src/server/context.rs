// src/server/context.rs

use crate::core::cluster::events::ClusterEvent;
use crate::core::cluster::failover::FailoverRequest;
use crate::core::cluster::gossip::GossipTaskMessage;
use crate::core::state::ServerState;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{Semaphore, broadcast, mpsc};
use tokio::task::JoinSet;

/// The receiving halves of the background task channels, consumed once by the
/// task spawner.
pub struct InitChannels {
    pub cluster_gossip_rx: mpsc::Receiver<GossipTaskMessage>,
    pub cluster_events_rx: mpsc::Receiver<ClusterEvent>,
    pub failover_rx: mpsc::Receiver<FailoverRequest>,
}

/// Holds all the initialized state required to run the server's main loop.
pub struct ServerContext {
    pub state: Arc<ServerState>,
    pub init_channels: Option<InitChannels>,
    pub listener: TcpListener,
    pub shutdown_tx: broadcast::Sender<()>,
    pub background_tasks: JoinSet<Result<(), anyhow::Error>>,
    pub connection_permits: Arc<Semaphore>,
}
