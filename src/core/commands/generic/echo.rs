// src/core/commands/generic/echo.rs

use crate::core::commands::command_trait::{
    ExecutableCommand, ExecutionContext, ParseCommand, WriteOutcome,
};
use crate::core::commands::helpers::{extract_bytes, validate_arg_count};
use crate::core::protocol::RespFrame;
use crate::core::{RespValue, ZirconError};
use async_trait::async_trait;
use bytes::Bytes;

#[derive(Debug, Clone, Default)]
pub struct Echo {
    pub message: Bytes,
}

impl ParseCommand for Echo {
    fn parse(args: &[RespFrame]) -> Result<Self, ZirconError> {
        validate_arg_count(args, 1, "ECHO")?;
        Ok(Echo {
            message: extract_bytes(&args[0])?,
        })
    }
}

#[async_trait]
impl ExecutableCommand for Echo {
    async fn execute(
        &self,
        _ctx: &mut ExecutionContext,
    ) -> Result<(RespValue, WriteOutcome), ZirconError> {
        Ok((
            RespValue::BulkString(self.message.clone()),
            WriteOutcome::DidNotWrite,
        ))
    }
}
