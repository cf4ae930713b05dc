// src/core/commands/cluster/setslot.rs

use super::SetSlotSubcommand;
use crate::core::cluster::migration::SlotMigrator;
use crate::core::cluster::state::ClusterState;
use crate::core::commands::command_trait::{ExecutionContext, WriteOutcome};
use crate::core::{RespValue, ZirconError};

pub fn execute(
    ctx: &mut ExecutionContext,
    cluster: &ClusterState,
    slot: u16,
    subcmd: &SetSlotSubcommand,
) -> Result<(RespValue, WriteOutcome), ZirconError> {
    match subcmd {
        SetSlotSubcommand::Migrating(dest_node_id) => {
            SlotMigrator::start_migration(&ctx.state, slot, dest_node_id)?;
        }
        SetSlotSubcommand::Importing(src_node_id) => {
            SlotMigrator::set_importing(&ctx.state, slot, src_node_id)?;
        }
        SetSlotSubcommand::Stable => {
            SlotMigrator::abort(&ctx.state, slot)?;
        }
        SetSlotSubcommand::Node(new_owner_id) => {
            cluster.apply_ownership_change(&[slot], new_owner_id, cluster.next_epoch())?;
        }
    }

    Ok((
        RespValue::SimpleString("OK".into()),
        WriteOutcome::DidNotWrite,
    ))
}
