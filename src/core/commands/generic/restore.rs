// src/core/commands/generic/restore.rs

use crate::core::commands::command_trait::{
    ExecutableCommand, ExecutionContext, ParseCommand, WriteOutcome,
};
use crate::core::commands::helpers::{extract_bytes, extract_string};
use crate::core::protocol::RespFrame;
use crate::core::{RespValue, ZirconError};
use async_trait::async_trait;
use bytes::Bytes;

/// `RESTORE key ttl_ms payload [REPLACE]` applies a serialized value received
/// from another node. This is the destination-side primitive of `MIGRATE`:
/// with REPLACE the apply is idempotent by key, so the sender may safely
/// retry after an ambiguous failure.
#[derive(Debug, Clone, Default)]
pub struct Restore {
    pub key: Bytes,
    pub ttl_ms: u64,
    pub payload: Bytes,
    pub replace: bool,
}

impl ParseCommand for Restore {
    fn parse(args: &[RespFrame]) -> Result<Self, ZirconError> {
        if args.len() < 3 || args.len() > 4 {
            return Err(ZirconError::WrongArgumentCount("RESTORE".to_string()));
        }
        let mut cmd = Restore {
            key: extract_bytes(&args[0])?,
            ttl_ms: extract_string(&args[1])?.parse()?,
            payload: extract_bytes(&args[2])?,
            replace: false,
        };
        if let Some(flag) = args.get(3) {
            if extract_string(flag)?.eq_ignore_ascii_case("replace") {
                cmd.replace = true;
            } else {
                return Err(ZirconError::SyntaxError);
            }
        }
        Ok(cmd)
    }
}

#[async_trait]
impl ExecutableCommand for Restore {
    async fn execute(
        &self,
        ctx: &mut ExecutionContext,
    ) -> Result<(RespValue, WriteOutcome), ZirconError> {
        ctx.state
            .store
            .restore(
                self.key.clone(),
                self.payload.clone(),
                self.ttl_ms,
                self.replace,
            )
            .await?;
        Ok((
            RespValue::SimpleString("OK".into()),
            WriteOutcome::Write { keys_modified: 1 },
        ))
    }
}
