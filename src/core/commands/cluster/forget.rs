// src/core/commands/cluster/forget.rs

use crate::core::cluster::state::ClusterState;
use crate::core::commands::command_trait::WriteOutcome;
use crate::core::{RespValue, ZirconError};
use tracing::info;

pub fn execute(
    cluster: &ClusterState,
    node_id_to_forget: &str,
) -> Result<(RespValue, WriteOutcome), ZirconError> {
    // A node cannot forget itself.
    if node_id_to_forget == cluster.my_id {
        return Err(ZirconError::InvalidState(
            "Cannot forget myself".to_string(),
        ));
    }

    // Refuse while the node still owns slots: dropping it would punch a
    // coverage gap. The operator must reassign or fail over first.
    if let Some(node) = cluster.nodes.get(node_id_to_forget)
        && !node.node_info.slots.is_empty()
    {
        return Err(ZirconError::InvalidState(format!(
            "Node {} still serves {} slot(s); reassign them before FORGET",
            node_id_to_forget,
            node.node_info.slots.len()
        )));
    }

    if cluster.nodes.remove(node_id_to_forget).is_some() {
        info!(
            "Node {} has been removed from the cluster configuration.",
            node_id_to_forget
        );

        // Also drop any PFAIL reports the forgotten node made about others.
        for mut entry in cluster.nodes.iter_mut() {
            entry.value_mut().pfail_reports.remove(node_id_to_forget);
        }

        cluster.save_config()?;

        Ok((
            RespValue::SimpleString("OK".into()),
            WriteOutcome::DidNotWrite, // Config change, not data change
        ))
    } else {
        Err(ZirconError::InvalidState(format!(
            "Node {node_id_to_forget} not found in the cluster"
        )))
    }
}
