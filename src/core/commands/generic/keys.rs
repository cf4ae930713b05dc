// src/core/commands/generic/keys.rs

use crate::core::commands::command_trait::{
    ExecutableCommand, ExecutionContext, ParseCommand, WriteOutcome,
};
use crate::core::commands::helpers::{extract_string, validate_arg_count};
use crate::core::protocol::RespFrame;
use crate::core::{RespValue, ZirconError};
use async_trait::async_trait;

#[derive(Debug, Clone, Default)]
pub struct Keys {
    pub pattern: String,
}

impl ParseCommand for Keys {
    fn parse(args: &[RespFrame]) -> Result<Self, ZirconError> {
        validate_arg_count(args, 1, "KEYS")?;
        Ok(Keys {
            pattern: extract_string(&args[0])?,
        })
    }
}

#[async_trait]
impl ExecutableCommand for Keys {
    async fn execute(
        &self,
        ctx: &mut ExecutionContext,
    ) -> Result<(RespValue, WriteOutcome), ZirconError> {
        let keys = ctx.state.store.keys_matching(&self.pattern).await;
        let resp = keys.into_iter().map(RespValue::BulkString).collect();
        Ok((RespValue::Array(resp), WriteOutcome::DidNotWrite))
    }
}
