// src/core/commands/string/set.rs

use crate::core::commands::command_trait::{
    ExecutableCommand, ExecutionContext, ParseCommand, WriteOutcome,
};
use crate::core::commands::helpers::{extract_bytes, extract_string};
use crate::core::protocol::RespFrame;
use crate::core::{RespValue, ZirconError};
use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;

#[derive(Debug, Clone, Default)]
pub struct Set {
    pub key: Bytes,
    pub value: Bytes,
    pub ttl: Option<Duration>,
}

impl ParseCommand for Set {
    fn parse(args: &[RespFrame]) -> Result<Self, ZirconError> {
        if args.len() < 2 {
            return Err(ZirconError::WrongArgumentCount("SET".to_string()));
        }
        let mut cmd = Set {
            key: extract_bytes(&args[0])?,
            value: extract_bytes(&args[1])?,
            ttl: None,
        };

        let mut i = 2;
        while i < args.len() {
            let option = extract_string(&args[i])?.to_ascii_lowercase();
            match option.as_str() {
                "ex" => {
                    let secs: u64 = extract_string(
                        args.get(i + 1).ok_or(ZirconError::SyntaxError)?,
                    )?
                    .parse()?;
                    cmd.ttl = Some(Duration::from_secs(secs));
                    i += 2;
                }
                "px" => {
                    let ms: u64 = extract_string(
                        args.get(i + 1).ok_or(ZirconError::SyntaxError)?,
                    )?
                    .parse()?;
                    cmd.ttl = Some(Duration::from_millis(ms));
                    i += 2;
                }
                _ => return Err(ZirconError::SyntaxError),
            }
        }
        Ok(cmd)
    }
}

#[async_trait]
impl ExecutableCommand for Set {
    async fn execute(
        &self,
        ctx: &mut ExecutionContext,
    ) -> Result<(RespValue, WriteOutcome), ZirconError> {
        ctx.state
            .store
            .set(self.key.clone(), self.value.clone(), self.ttl)
            .await;
        Ok((
            RespValue::SimpleString("OK".into()),
            WriteOutcome::Write { keys_modified: 1 },
        ))
    }
}
