// src/core/commands/command_trait.rs

//! Defines the core traits implemented by all executable commands.

use crate::core::protocol::RespFrame;
use crate::core::state::ServerState;
use crate::core::{RespValue, ZirconError};
use async_trait::async_trait;
use bitflags::bitflags;
use std::sync::Arc;

bitflags! {
    /// Flags that describe the properties and behavior of a command, used by
    /// the router for redirection and state checks.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct CommandFlags: u32 {
        /// The command modifies the dataset.
        const WRITE     = 1 << 0;
        /// The command only reads data.
        const READONLY  = 1 << 1;
        /// An administrative command.
        const ADMIN     = 1 << 2;
        /// The command is handled at the router level and mutates session state.
        const SESSION   = 1 << 3;
    }
}

/// The outcome of a write operation, used to advance the replication
/// progress marker that failover elections compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The command did not modify any data.
    DidNotWrite,
    /// The command modified one or more keys.
    Write { keys_modified: u64 },
    /// The command deleted one or more keys.
    Delete { keys_deleted: u64 },
}

/// The context a command executes against: the shared server state plus the
/// identity of the session that issued it.
pub struct ExecutionContext {
    pub state: Arc<ServerState>,
    pub session_id: u64,
}

/// The execution logic of a command. Implemented by each command's struct.
#[async_trait]
pub trait ExecutableCommand {
    async fn execute(
        &self,
        ctx: &mut ExecutionContext,
    ) -> Result<(RespValue, WriteOutcome), ZirconError>;
}

/// Parsing of a command's arguments from a slice of `RespFrame`s.
pub trait ParseCommand: Sized {
    fn parse(args: &[RespFrame]) -> Result<Self, ZirconError>;
}
