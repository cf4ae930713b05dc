// src/core/commands/cluster/addslots.rs

use crate::core::cluster::slot::SlotRange;
use crate::core::cluster::state::ClusterState;
use crate::core::commands::command_trait::WriteOutcome;
use crate::core::{RespValue, ZirconError};

pub fn execute(
    cluster: &ClusterState,
    slots: &[u16],
) -> Result<(RespValue, WriteOutcome), ZirconError> {
    let ranges: Vec<SlotRange> = slots.iter().map(|&s| SlotRange::new(s, s)).collect();
    // One ADDSLOTS call is one ownership-affecting event: it either claims
    // every listed slot under a single new epoch, or fails without touching
    // the table (a slot served by another node is rejected, not taken over).
    cluster.assign_slots(&ranges, false)?;

    Ok((
        RespValue::SimpleString("OK".into()),
        WriteOutcome::DidNotWrite, // Config change, not data change
    ))
}
