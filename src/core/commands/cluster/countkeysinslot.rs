// src/core/commands/cluster/countkeysinslot.rs

use crate::core::commands::command_trait::{ExecutionContext, WriteOutcome};
use crate::core::{RespValue, ZirconError};

pub async fn execute(
    ctx: &mut ExecutionContext,
    slot: u16,
) -> Result<(RespValue, WriteOutcome), ZirconError> {
    let count = ctx.state.store.count_keys_in_slot(slot).await;
    Ok((RespValue::Integer(count as i64), WriteOutcome::DidNotWrite))
}
