// src/core/commands/cluster/rebalance.rs

use crate::core::cluster::client::ClusterClient;
use crate::core::cluster::migration::SlotMigrator;
use crate::core::cluster::state::{ClusterState, SlotMove};
use crate::core::commands::command_trait::{ExecutionContext, WriteOutcome};
use crate::core::state::ServerState;
use crate::core::{RespValue, ZirconError};
use std::sync::Arc;
use tracing::{info, warn};

/// `CLUSTER REBALANCE` computes a minimal-move plan equalizing per-master slot
/// counts, then kicks off its execution in the background and immediately
/// replies with the planned moves. Moves sourced at this node start local
/// migrations; moves sourced elsewhere are delegated to their source node via
/// `CLUSTER SETSLOT ... MIGRATING`.
pub async fn execute(
    ctx: &mut ExecutionContext,
    cluster: &ClusterState,
) -> Result<(RespValue, WriteOutcome), ZirconError> {
    let tolerance = ctx.state.config.lock().await.cluster.rebalance_tolerance;
    let plan = cluster.plan_rebalance(tolerance);

    if plan.is_empty() {
        info!("Rebalance requested: cluster already balanced within tolerance.");
        return Ok((RespValue::Array(vec![]), WriteOutcome::DidNotWrite));
    }

    let reply: Vec<RespValue> = plan
        .iter()
        .map(|m| {
            RespValue::Array(vec![
                RespValue::Integer(m.slot as i64),
                RespValue::BulkString(m.from.clone().into()),
                RespValue::BulkString(m.to.clone().into()),
            ])
        })
        .collect();

    info!("Rebalance planned: {} slot move(s).", plan.len());
    let task_state = ctx.state.clone();
    tokio::spawn(async move {
        run_rebalance_plan(task_state, plan).await;
    });

    Ok((RespValue::Array(reply), WriteOutcome::DidNotWrite))
}

/// Drives every planned move to its source node.
async fn run_rebalance_plan(state: Arc<ServerState>, plan: Vec<SlotMove>) {
    let Some(cluster) = state.cluster.clone() else {
        return;
    };

    for mv in plan {
        if mv.from == cluster.my_id {
            if let Err(e) = SlotMigrator::start_migration(&state, mv.slot, &mv.to) {
                warn!(
                    "Rebalance: could not start migration of slot {} to {}: {}",
                    mv.slot, mv.to, e
                );
            }
            continue;
        }

        // A move sourced at another node: tell that node to migrate.
        let Some(source_addr) = cluster.nodes.get(&mv.from).map(|n| n.node_info.addr.clone())
        else {
            warn!("Rebalance: source node {} vanished; skipping slot {}.", mv.from, mv.slot);
            continue;
        };
        let Ok(addr) = source_addr.parse() else {
            warn!(
                "Rebalance: bad address '{}' for node {}; skipping slot {}.",
                source_addr, mv.from, mv.slot
            );
            continue;
        };
        match ClusterClient::connect(addr).await {
            Ok(mut client) => {
                if let Err(e) = client
                    .cluster_command(vec![
                        "SETSLOT".into(),
                        mv.slot.to_string().into(),
                        "MIGRATING".into(),
                        mv.to.clone().into(),
                    ])
                    .await
                {
                    warn!(
                        "Rebalance: node {} rejected migration of slot {}: {}",
                        mv.from, mv.slot, e
                    );
                }
            }
            Err(e) => {
                warn!(
                    "Rebalance: could not reach source node {} for slot {}: {}",
                    mv.from, mv.slot, e
                );
            }
        }
    }
}
