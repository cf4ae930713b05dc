// src/core/commands/cluster/stats.rs

use crate::core::cluster::state::{ClusterState, NodeRole};
use crate::core::commands::command_trait::{ExecutionContext, WriteOutcome};
use crate::core::{RespValue, ZirconError};
use std::fmt::Write;

pub async fn execute(
    ctx: &mut ExecutionContext,
    cluster: &ClusterState,
) -> Result<(RespValue, WriteOutcome), ZirconError> {
    let my_key_count = ctx.state.store.key_count().await;
    let stats = cluster.cluster_stats(my_key_count);

    let mut out = String::new();
    let _ = write!(out, "known_nodes:{}\r\n", stats.len());
    let _ = write!(out, "migrations_in_flight:{}\r\n", cluster.migrations.len());
    for node in &stats {
        let role = match node.role {
            NodeRole::Primary => "primary",
            NodeRole::Replica => "replica",
        };
        let keys = node
            .key_count
            .map_or_else(|| "-".to_string(), |count| count.to_string());
        let _ = write!(
            out,
            "node:{} addr={} role={} slots={} keys={}\r\n",
            node.id, node.addr, role, node.slot_count, keys
        );
    }

    Ok((
        RespValue::BulkString(out.into()),
        WriteOutcome::DidNotWrite,
    ))
}
