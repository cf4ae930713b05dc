// src/core/commands/generic/exists.rs

use crate::core::commands::command_trait::{
    ExecutableCommand, ExecutionContext, ParseCommand, WriteOutcome,
};
use crate::core::commands::helpers::extract_bytes;
use crate::core::protocol::RespFrame;
use crate::core::{RespValue, ZirconError};
use async_trait::async_trait;
use bytes::Bytes;

#[derive(Debug, Clone, Default)]
pub struct Exists {
    pub keys: Vec<Bytes>,
}

impl ParseCommand for Exists {
    fn parse(args: &[RespFrame]) -> Result<Self, ZirconError> {
        if args.is_empty() {
            return Err(ZirconError::WrongArgumentCount("EXISTS".to_string()));
        }
        let keys = args.iter().map(extract_bytes).collect::<Result<_, _>>()?;
        Ok(Exists { keys })
    }
}

#[async_trait]
impl ExecutableCommand for Exists {
    async fn execute(
        &self,
        ctx: &mut ExecutionContext,
    ) -> Result<(RespValue, WriteOutcome), ZirconError> {
        let mut count = 0i64;
        for key in &self.keys {
            if ctx.state.store.exists(key).await {
                count += 1;
            }
        }
        Ok((RespValue::Integer(count), WriteOutcome::DidNotWrite))
    }
}
