// src/core/commands/cluster/nodes.rs

use crate::core::cluster::state::{ClusterState, NodeFlags};
use crate::core::commands::command_trait::WriteOutcome;
use crate::core::{RespValue, ZirconError};

/// Formats one line per known node:
/// `<id> <ip>:<port>@<cport> <flags> <master-id-or-dash> <ping-sent> <pong-recv> <epoch> <link-state> <slot-ranges>`
pub fn execute(cluster: &ClusterState) -> Result<(RespValue, WriteOutcome), ZirconError> {
    let mut output = String::new();

    for entry in cluster.nodes.iter() {
        let runtime_state = entry.value();
        let node = &runtime_state.node_info;

        let flags_str = node
            .get_flags()
            .iter_names()
            .map(|(name, _)| name.to_lowercase())
            .collect::<Vec<_>>()
            .join(",");

        let bus_port = node
            .bus_addr
            .rsplit(':')
            .next()
            .unwrap_or_default();

        let replica_of_str = node.replica_of.as_deref().unwrap_or("-");

        let ping_sent = runtime_state
            .ping_sent
            .map_or(0, |t| t.elapsed().as_millis());
        let pong_recv = runtime_state
            .pong_received
            .map_or(0, |t| t.elapsed().as_millis());

        let link_state = if node.get_flags().contains(NodeFlags::FAIL) {
            "disconnected"
        } else {
            "connected"
        };

        output.push_str(&format!(
            "{} {}@{} {} {} {} {} {} {} {}\n",
            node.id,
            node.addr,
            bus_port,
            flags_str,
            replica_of_str,
            ping_sent,
            pong_recv,
            node.config_epoch,
            link_state,
            format_slot_ranges(&node.slots)
        ));
    }

    Ok((
        RespValue::BulkString(output.into()),
        WriteOutcome::DidNotWrite,
    ))
}

/// Collapses a sorted slot set into space-separated `start-end` ranges.
fn format_slot_ranges(slots: &std::collections::BTreeSet<u16>) -> String {
    let mut ranges = Vec::new();
    let mut iter = slots.iter().copied();
    let Some(mut start) = iter.next() else {
        return String::new();
    };
    let mut end = start;
    for slot in iter {
        if slot == end + 1 {
            end = slot;
        } else {
            ranges.push(format_range(start, end));
            start = slot;
            end = slot;
        }
    }
    ranges.push(format_range(start, end));
    ranges.join(" ")
}

fn format_range(start: u16, end: u16) -> String {
    if start == end {
        format!("{start}")
    } else {
        format!("{start}-{end}")
    }
}
