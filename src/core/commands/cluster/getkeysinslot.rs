// src/core/commands/cluster/getkeysinslot.rs

use crate::core::cluster::state::ClusterState;
use crate::core::commands::command_trait::{ExecutionContext, WriteOutcome};
use crate::core::{RespValue, ZirconError};

pub async fn execute(
    ctx: &mut ExecutionContext,
    cluster: &ClusterState,
    slot: u16,
    count: usize,
) -> Result<(RespValue, WriteOutcome), ZirconError> {
    if !cluster.i_own_slot(slot) {
        return Err(ZirconError::InvalidState(format!(
            "Slot {slot} is not served by this instance"
        )));
    }

    let keys = ctx.state.store.keys_in_slot(slot, count).await;
    let resp_keys = keys.into_iter().map(RespValue::BulkString).collect();

    Ok((RespValue::Array(resp_keys), WriteOutcome::DidNotWrite))
}
