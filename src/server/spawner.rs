// src/server/spawner.rs

//! Spawns the server's long-running background tasks. Every task carries a
//! subscription to the shutdown broadcast channel and terminates cleanly when
//! it fires.

use super::context::ServerContext;
use crate::core::cluster::failover::FailoverManager;
use crate::core::cluster::gossip;
use anyhow::{Result, anyhow};
use tracing::info;

/// Spawns all background tasks into the context's JoinSet.
pub fn spawn_all(ctx: &mut ServerContext) -> Result<()> {
    let init_channels = ctx
        .init_channels
        .take()
        .ok_or_else(|| anyhow!("Background task channels already consumed"))?;

    let cluster_enabled = ctx.state.cluster.is_some();
    if !cluster_enabled {
        info!("Cluster mode disabled; no cluster background tasks to spawn.");
        return Ok(());
    }

    // --- Gossip task (cluster bus) ---
    let gossip_state = ctx.state.clone();
    let shutdown_rx_gossip = ctx.shutdown_tx.subscribe();
    ctx.background_tasks.spawn(async move {
        let bus_port = {
            let config = gossip_state.config.lock().await;
            config.bus_port()?
        };
        gossip::run(
            gossip_state,
            bus_port,
            shutdown_rx_gossip,
            init_channels.cluster_gossip_rx,
        )
        .await;
        Ok(())
    });

    // --- Failover manager ---
    let failover_manager = FailoverManager::new(
        ctx.state.clone(),
        init_channels.cluster_events_rx,
        init_channels.failover_rx,
    );
    let shutdown_rx_failover = ctx.shutdown_tx.subscribe();
    ctx.background_tasks.spawn(async move {
        failover_manager.run(shutdown_rx_failover).await;
        Ok(())
    });

    info!("All background tasks have been spawned.");
    Ok(())
}
