// src/core/commands/generic/dbsize.rs

use crate::core::commands::command_trait::{
    ExecutableCommand, ExecutionContext, ParseCommand, WriteOutcome,
};
use crate::core::commands::helpers::validate_arg_count;
use crate::core::protocol::RespFrame;
use crate::core::{RespValue, ZirconError};
use async_trait::async_trait;

#[derive(Debug, Clone, Default)]
pub struct DbSize;

impl ParseCommand for DbSize {
    fn parse(args: &[RespFrame]) -> Result<Self, ZirconError> {
        validate_arg_count(args, 0, "DBSIZE")?;
        Ok(DbSize)
    }
}

#[async_trait]
impl ExecutableCommand for DbSize {
    async fn execute(
        &self,
        ctx: &mut ExecutionContext,
    ) -> Result<(RespValue, WriteOutcome), ZirconError> {
        let count = ctx.state.store.key_count().await;
        Ok((RespValue::Integer(count as i64), WriteOutcome::DidNotWrite))
    }
}
