// src/core/commands/cluster/mod.rs

//! Implements the `CLUSTER` command dispatcher and its subcommands.
//!
//! Parsing turns the subcommand into a tagged variant up front, with arity
//! validated per subcommand; execution is a plain match over the enum.

mod addslots;
mod countkeysinslot;
mod failover;
mod forget;
mod getkeysinslot;
mod health;
mod info;
mod meet;
mod nodes;
mod rebalance;
mod setslot;
mod slots;
mod stats;

use crate::core::cluster::failover::FailoverMode;
use crate::core::cluster::slot::NUM_SLOTS;
use crate::core::cluster::state::ClusterState;
use crate::core::commands::command_trait::{
    ExecutableCommand, ExecutionContext, ParseCommand, WriteOutcome,
};
use crate::core::commands::helpers::extract_string;
use crate::core::protocol::RespFrame;
use crate::core::{RespValue, ZirconError};
use async_trait::async_trait;
use std::sync::Arc;

/// An enum representing all supported `CLUSTER` subcommands.
#[derive(Debug, Clone, Default)]
pub enum ClusterSubcommand {
    #[default]
    Info,
    Nodes,
    Slots,
    MyId,
    Meet {
        ip: String,
        port: Option<u16>,
    },
    AddSlots(Vec<u16>),
    SetSlot {
        slot: u16,
        subcommand: SetSlotSubcommand,
    },
    Failover(FailoverMode),
    Rebalance,
    Health,
    Stats,
    CountKeysInSlot(u16),
    GetKeysInSlot {
        slot: u16,
        count: usize,
    },
    Forget(String),
}

/// The sub-options of the `CLUSTER SETSLOT` command.
#[derive(Debug, Clone)]
pub enum SetSlotSubcommand {
    Migrating(String), // destination node_id
    Importing(String), // source node_id
    Node(String),      // new owner node_id
    Stable,
}

/// The main struct for the `CLUSTER` command.
#[derive(Debug, Clone, Default)]
pub struct ClusterCommand {
    pub subcommand: ClusterSubcommand,
}

fn parse_slot(frame: &RespFrame) -> Result<u16, ZirconError> {
    let slot: u16 = extract_string(frame)?.parse()?;
    if slot as usize >= NUM_SLOTS {
        return Err(ZirconError::InvalidState(format!(
            "Slot {slot} is out of range"
        )));
    }
    Ok(slot)
}

impl ParseCommand for ClusterCommand {
    /// Parses the arguments for the CLUSTER command and its various subcommands.
    fn parse(args: &[RespFrame]) -> Result<Self, ZirconError> {
        if args.is_empty() {
            return Err(ZirconError::WrongArgumentCount("CLUSTER".to_string()));
        }

        let sub_str = extract_string(&args[0])?.to_ascii_lowercase();
        let subcommand = match sub_str.as_str() {
            "info" => ClusterSubcommand::Info,
            "nodes" => ClusterSubcommand::Nodes,
            "slots" => ClusterSubcommand::Slots,
            "myid" => ClusterSubcommand::MyId,
            "health" => ClusterSubcommand::Health,
            "stats" => ClusterSubcommand::Stats,
            "rebalance" => ClusterSubcommand::Rebalance,
            "meet" => {
                if args.len() < 2 || args.len() > 3 {
                    return Err(ZirconError::WrongArgumentCount("CLUSTER MEET".to_string()));
                }
                let ip = extract_string(&args[1])?;
                let port = match args.get(2) {
                    Some(frame) => Some(extract_string(frame)?.parse::<u16>()?),
                    None => None,
                };
                ClusterSubcommand::Meet { ip, port }
            }
            "addslots" => {
                if args.len() < 2 {
                    return Err(ZirconError::WrongArgumentCount(
                        "CLUSTER ADDSLOTS".to_string(),
                    ));
                }
                let slots = args[1..]
                    .iter()
                    .map(parse_slot)
                    .collect::<Result<Vec<_>, _>>()?;
                ClusterSubcommand::AddSlots(slots)
            }
            "setslot" => {
                if args.len() < 3 {
                    return Err(ZirconError::WrongArgumentCount(
                        "CLUSTER SETSLOT".to_string(),
                    ));
                }
                let slot = parse_slot(&args[1])?;
                let option = extract_string(&args[2])?.to_ascii_lowercase();
                let subcommand = match option.as_str() {
                    "migrating" | "importing" | "node" if args.len() != 4 => {
                        return Err(ZirconError::SyntaxError);
                    }
                    "stable" if args.len() != 3 => return Err(ZirconError::SyntaxError),
                    "migrating" => SetSlotSubcommand::Migrating(extract_string(&args[3])?),
                    "importing" => SetSlotSubcommand::Importing(extract_string(&args[3])?),
                    "node" => SetSlotSubcommand::Node(extract_string(&args[3])?),
                    "stable" => SetSlotSubcommand::Stable,
                    _ => return Err(ZirconError::SyntaxError),
                };
                ClusterSubcommand::SetSlot { slot, subcommand }
            }
            "failover" => {
                let mode = match args.get(1) {
                    None => FailoverMode::Graceful,
                    Some(frame) => match extract_string(frame)?.to_ascii_lowercase().as_str() {
                        "force" => FailoverMode::Force,
                        "takeover" => FailoverMode::Takeover,
                        _ => return Err(ZirconError::SyntaxError),
                    },
                };
                if args.len() > 2 {
                    return Err(ZirconError::WrongArgumentCount(
                        "CLUSTER FAILOVER".to_string(),
                    ));
                }
                ClusterSubcommand::Failover(mode)
            }
            "countkeysinslot" => {
                if args.len() != 2 {
                    return Err(ZirconError::WrongArgumentCount(
                        "CLUSTER COUNTKEYSINSLOT".to_string(),
                    ));
                }
                ClusterSubcommand::CountKeysInSlot(parse_slot(&args[1])?)
            }
            "getkeysinslot" => {
                if args.len() != 3 {
                    return Err(ZirconError::WrongArgumentCount(
                        "CLUSTER GETKEYSINSLOT".to_string(),
                    ));
                }
                let slot = parse_slot(&args[1])?;
                let count = extract_string(&args[2])?.parse::<usize>()?;
                ClusterSubcommand::GetKeysInSlot { slot, count }
            }
            "forget" => {
                if args.len() != 2 {
                    return Err(ZirconError::WrongArgumentCount(
                        "CLUSTER FORGET".to_string(),
                    ));
                }
                ClusterSubcommand::Forget(extract_string(&args[1])?)
            }
            _ => return Err(ZirconError::UnknownCommand(format!("CLUSTER {sub_str}"))),
        };
        Ok(ClusterCommand { subcommand })
    }
}

impl ClusterCommand {
    /// Fetches the cluster state, failing when the server runs standalone.
    /// Every subcommand shares this precondition.
    fn cluster(ctx: &ExecutionContext) -> Result<Arc<ClusterState>, ZirconError> {
        ctx.state
            .cluster
            .clone()
            .ok_or_else(|| ZirconError::InvalidState("Cluster mode is not enabled.".into()))
    }
}

#[async_trait]
impl ExecutableCommand for ClusterCommand {
    /// Dispatches the command to the appropriate subcommand's execution logic.
    async fn execute(
        &self,
        ctx: &mut ExecutionContext,
    ) -> Result<(RespValue, WriteOutcome), ZirconError> {
        let cluster = Self::cluster(ctx)?;

        match &self.subcommand {
            ClusterSubcommand::MyId => Ok((
                RespValue::BulkString(cluster.my_id.clone().into()),
                WriteOutcome::DidNotWrite,
            )),
            ClusterSubcommand::Info => info::execute(ctx, &cluster).await,
            ClusterSubcommand::Nodes => nodes::execute(&cluster),
            ClusterSubcommand::Slots => slots::execute(&cluster),
            ClusterSubcommand::Meet { ip, port } => meet::execute(ctx, ip, *port).await,
            ClusterSubcommand::AddSlots(slots) => addslots::execute(&cluster, slots),
            ClusterSubcommand::SetSlot { slot, subcommand } => {
                setslot::execute(ctx, &cluster, *slot, subcommand)
            }
            ClusterSubcommand::Failover(mode) => failover::execute(ctx, *mode).await,
            ClusterSubcommand::Rebalance => rebalance::execute(ctx, &cluster).await,
            ClusterSubcommand::Health => health::execute(&cluster),
            ClusterSubcommand::Stats => stats::execute(ctx, &cluster).await,
            ClusterSubcommand::CountKeysInSlot(slot) => {
                countkeysinslot::execute(ctx, *slot).await
            }
            ClusterSubcommand::GetKeysInSlot { slot, count } => {
                getkeysinslot::execute(ctx, &cluster, *slot, *count).await
            }
            ClusterSubcommand::Forget(node_id) => forget::execute(&cluster, node_id),
        }
    }
}
