// src/core/commands/cluster/slots.rs

use crate::core::cluster::slot::NUM_SLOTS;
use crate::core::cluster::state::ClusterState;
use crate::core::commands::command_trait::WriteOutcome;
use crate::core::{RespValue, ZirconError};

/// Returns the slot map as an array of `[start, end, [ip, port, id]]` entries,
/// with contiguous runs of the same owner collapsed into one entry.
pub fn execute(cluster: &ClusterState) -> Result<(RespValue, WriteOutcome), ZirconError> {
    // Snapshot the owner column first so a concurrent commit cannot produce a
    // torn view of the table.
    let owners: Vec<Option<String>> = (0..NUM_SLOTS)
        .map(|slot| cluster.slots_map[slot].read().clone())
        .collect();

    let mut entries = Vec::new();
    let mut run_start = 0usize;
    while run_start < NUM_SLOTS {
        let Some(owner_id) = owners[run_start].clone() else {
            run_start += 1;
            continue;
        };
        let mut run_end = run_start;
        while run_end + 1 < NUM_SLOTS && owners[run_end + 1].as_deref() == Some(&owner_id) {
            run_end += 1;
        }

        if let Some(owner) = cluster.nodes.get(&owner_id) {
            let addr = &owner.node_info.addr;
            let (ip, port) = match addr.rsplit_once(':') {
                Some((ip, port)) => (ip.to_string(), port.parse::<i64>().unwrap_or(0)),
                None => (addr.clone(), 0),
            };
            entries.push(RespValue::Array(vec![
                RespValue::Integer(run_start as i64),
                RespValue::Integer(run_end as i64),
                RespValue::Array(vec![
                    RespValue::BulkString(ip.into()),
                    RespValue::Integer(port),
                    RespValue::BulkString(owner_id.into()),
                ]),
            ]));
        }
        run_start = run_end + 1;
    }

    Ok((RespValue::Array(entries), WriteOutcome::DidNotWrite))
}
