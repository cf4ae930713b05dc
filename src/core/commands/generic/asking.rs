// src/core/commands/generic/asking.rs

use crate::core::commands::command_trait::{
    ExecutableCommand, ExecutionContext, ParseCommand, WriteOutcome,
};
use crate::core::protocol::RespFrame;
use crate::core::{RespValue, ZirconError};
use async_trait::async_trait;

/// `ASKING` grants exactly one following command access to a slot this node is
/// importing. The grant itself lives in the session, so the command is applied
/// entirely by the router; reaching `execute` means a routing bug.
#[derive(Debug, Clone, Default)]
pub struct Asking;

impl ParseCommand for Asking {
    fn parse(args: &[RespFrame]) -> Result<Self, ZirconError> {
        if !args.is_empty() {
            return Err(ZirconError::WrongArgumentCount("ASKING".to_string()));
        }
        Ok(Asking)
    }
}

#[async_trait]
impl ExecutableCommand for Asking {
    async fn execute(
        &self,
        _ctx: &mut ExecutionContext,
    ) -> Result<(RespValue, WriteOutcome), ZirconError> {
        Err(ZirconError::Internal(
            "ASKING command should not be executed directly".into(),
        ))
    }
}
