// src/core/commands/generic/del.rs

use crate::core::commands::command_trait::{
    ExecutableCommand, ExecutionContext, ParseCommand, WriteOutcome,
};
use crate::core::commands::helpers::extract_bytes;
use crate::core::protocol::RespFrame;
use crate::core::{RespValue, ZirconError};
use async_trait::async_trait;
use bytes::Bytes;

#[derive(Debug, Clone, Default)]
pub struct Del {
    pub keys: Vec<Bytes>,
}

impl ParseCommand for Del {
    fn parse(args: &[RespFrame]) -> Result<Self, ZirconError> {
        if args.is_empty() {
            return Err(ZirconError::WrongArgumentCount("DEL".to_string()));
        }
        let keys = args.iter().map(extract_bytes).collect::<Result<_, _>>()?;
        Ok(Del { keys })
    }
}

#[async_trait]
impl ExecutableCommand for Del {
    async fn execute(
        &self,
        ctx: &mut ExecutionContext,
    ) -> Result<(RespValue, WriteOutcome), ZirconError> {
        let deleted = ctx.state.store.delete(&self.keys).await;
        let outcome = if deleted > 0 {
            WriteOutcome::Delete {
                keys_deleted: deleted as u64,
            }
        } else {
            WriteOutcome::DidNotWrite
        };
        Ok((RespValue::Integer(deleted as i64), outcome))
    }
}
