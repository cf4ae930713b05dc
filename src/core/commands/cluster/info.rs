// src/core/commands/cluster/info.rs

use crate::core::cluster::state::ClusterState;
use crate::core::commands::command_trait::{ExecutionContext, WriteOutcome};
use crate::core::{RespValue, ZirconError};
use std::fmt::Write;
use std::sync::atomic::Ordering;

pub async fn execute(
    _ctx: &mut ExecutionContext,
    cluster: &ClusterState,
) -> Result<(RespValue, WriteOutcome), ZirconError> {
    let health = cluster.check_health();
    let (assigned, ok, pfail, fail) = cluster.slot_counters();
    let known_nodes = cluster.nodes.len();
    let size = cluster
        .nodes
        .iter()
        .filter(|n| n.value().node_info.is_primary() && !n.value().node_info.slots.is_empty())
        .count();
    let my_epoch = cluster.get_my_config().node_info.config_epoch;

    let mut out = String::new();
    let _ = write!(out, "cluster_enabled:1\r\n");
    let _ = write!(out, "cluster_state:{}\r\n", health.status.as_str());
    let _ = write!(out, "cluster_slots_assigned:{assigned}\r\n");
    let _ = write!(out, "cluster_slots_ok:{ok}\r\n");
    let _ = write!(out, "cluster_slots_pfail:{pfail}\r\n");
    let _ = write!(out, "cluster_slots_fail:{fail}\r\n");
    let _ = write!(out, "cluster_known_nodes:{known_nodes}\r\n");
    let _ = write!(out, "cluster_size:{size}\r\n");
    let _ = write!(out, "cluster_current_epoch:{}\r\n", cluster.current_epoch());
    let _ = write!(out, "cluster_my_epoch:{my_epoch}\r\n");
    let _ = write!(
        out,
        "cluster_stats_messages_sent:{}\r\n",
        cluster.messages_sent.load(Ordering::Relaxed)
    );
    let _ = write!(
        out,
        "cluster_stats_messages_received:{}\r\n",
        cluster.messages_received.load(Ordering::Relaxed)
    );

    Ok((
        RespValue::BulkString(out.into()),
        WriteOutcome::DidNotWrite,
    ))
}
