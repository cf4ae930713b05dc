// src/core/state/core.rs

//! Defines the central `ServerState` struct, holding all shared server-wide state.

use super::stats::StatsState;
use crate::config::Config;
use crate::core::ZirconError;
use crate::core::cluster::events::{CLUSTER_EVENT_CHANNEL_CAPACITY, ClusterEvent};
use crate::core::cluster::failover::FailoverRequest;
use crate::core::cluster::gossip::GossipTaskMessage;
use crate::core::cluster::state::ClusterState;
use crate::core::storage::Store;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::{Mutex, broadcast, mpsc};
use tracing::{error, warn};

/// Contains the initialized state plus the receiving halves of the channels
/// the background tasks consume. Created once during initialization and then
/// taken apart by the task spawner.
pub struct ServerInit {
    /// The fully initialized, shared server state.
    pub state: Arc<ServerState>,
    /// Receives messages for the cluster gossip task (MEET, broadcasts).
    pub cluster_gossip_rx: mpsc::Receiver<GossipTaskMessage>,
    /// Receives failure/vote events produced by gossip for the failover manager.
    pub cluster_events_rx: mpsc::Receiver<ClusterEvent>,
    /// Receives manual failover requests for the failover manager.
    pub failover_rx: mpsc::Receiver<FailoverRequest>,
}

/// The central struct holding all shared, server-wide state.
///
/// It is wrapped in an `Arc` and passed to every task and connection handler:
/// the single source of truth, with no hidden globals, so multiple instances
/// can coexist inside one test process.
#[derive(Debug)]
pub struct ServerState {
    /// The keyspace.
    pub store: Store,
    /// The server's runtime configuration.
    pub config: Arc<Mutex<Config>>,
    /// The state of the cluster, if enabled. `None` in standalone mode.
    pub cluster: Option<Arc<ClusterState>>,
    /// Sender for command handlers to reach the gossip task.
    pub cluster_gossip_tx: mpsc::Sender<GossipTaskMessage>,
    /// Sender the gossip task uses to notify the failover manager.
    pub cluster_events_tx: mpsc::Sender<ClusterEvent>,
    /// Sender for manual failover requests (command layer and external monitors).
    pub failover_tx: mpsc::Sender<FailoverRequest>,
    /// This node's replication progress marker, gossiped to peers and compared
    /// during failover elections. Bumped by every acknowledged write.
    pub replication_offset: AtomicU64,
    /// Set by a master that has lost contact with the cluster quorum.
    /// This is the primary self-fencing mechanism against split-brain.
    pub is_read_only_due_to_quorum_loss: AtomicBool,
    /// The process-wide shutdown signal; every background task subscribes.
    pub shutdown_tx: broadcast::Sender<()>,
    /// Server-wide statistics.
    pub stats: StatsState,
}

impl ServerState {
    /// Initializes the entire server state from the given configuration.
    pub fn initialize(
        config: Config,
        shutdown_tx: broadcast::Sender<()>,
    ) -> Result<ServerInit, ZirconError> {
        let (cluster_gossip_tx, cluster_gossip_rx) = mpsc::channel(128);
        let (cluster_events_tx, cluster_events_rx) =
            mpsc::channel(CLUSTER_EVENT_CHANNEL_CAPACITY);
        let (failover_tx, failover_rx) = mpsc::channel(16);

        let cluster = if config.cluster.enabled {
            let addr = config.announce_addr();
            let bus_addr = config.announce_bus_addr()?;
            let path = config.cluster.config_file.clone();
            let loaded = ClusterState::from_file(&path, addr.clone(), bus_addr.clone());
            let cluster_state = match loaded {
                Ok(state) => state,
                Err(e) => {
                    warn!(
                        "Could not load cluster config file '{}': {}. Starting with a fresh state.",
                        path, e
                    );
                    ClusterState::new(addr, bus_addr, path)?
                }
            };
            Some(Arc::new(cluster_state))
        } else {
            None
        };

        let state = Arc::new(Self {
            store: Store::new(),
            config: Arc::new(Mutex::new(config)),
            cluster,
            cluster_gossip_tx,
            cluster_events_tx,
            failover_tx,
            replication_offset: AtomicU64::new(0),
            is_read_only_due_to_quorum_loss: AtomicBool::new(false),
            shutdown_tx,
            stats: StatsState::new(),
        });

        Ok(ServerInit {
            state,
            cluster_gossip_rx,
            cluster_events_rx,
            failover_rx,
        })
    }

    /// Flips the quorum-loss fence and logs the transition.
    pub fn set_quorum_loss_read_only(&self, enabled: bool, reason: &str) {
        let was = self
            .is_read_only_due_to_quorum_loss
            .swap(enabled, Ordering::Relaxed);
        if was != enabled {
            if enabled {
                error!("Entering read-only mode: {}", reason);
            } else {
                warn!("Leaving read-only mode: {}", reason);
            }
        }
    }
}
