// src/core/commands/generic/ping.rs

use crate::core::commands::command_trait::{
    ExecutableCommand, ExecutionContext, ParseCommand, WriteOutcome,
};
use crate::core::commands::helpers::extract_bytes;
use crate::core::protocol::RespFrame;
use crate::core::{RespValue, ZirconError};
use async_trait::async_trait;
use bytes::Bytes;

#[derive(Debug, Clone, Default)]
pub struct Ping {
    pub message: Option<Bytes>,
}

impl ParseCommand for Ping {
    fn parse(args: &[RespFrame]) -> Result<Self, ZirconError> {
        match args {
            [] => Ok(Ping { message: None }),
            [msg] => Ok(Ping {
                message: Some(extract_bytes(msg)?),
            }),
            _ => Err(ZirconError::WrongArgumentCount("PING".to_string())),
        }
    }
}

#[async_trait]
impl ExecutableCommand for Ping {
    async fn execute(
        &self,
        _ctx: &mut ExecutionContext,
    ) -> Result<(RespValue, WriteOutcome), ZirconError> {
        let resp = match &self.message {
            Some(msg) => RespValue::BulkString(msg.clone()),
            None => RespValue::SimpleString("PONG".into()),
        };
        Ok((resp, WriteOutcome::DidNotWrite))
    }
}
