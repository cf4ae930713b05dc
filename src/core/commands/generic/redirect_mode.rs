// src/core/commands/generic/redirect_mode.rs

//! `READONLY` and `READWRITE` toggle whether this connection accepts read
//! traffic on a replica instead of being redirected to the slot's master.
//! Like `ASKING`, both mutate only session state and are applied by the router.

use crate::core::commands::command_trait::{
    ExecutableCommand, ExecutionContext, ParseCommand, WriteOutcome,
};
use crate::core::protocol::RespFrame;
use crate::core::{RespValue, ZirconError};
use async_trait::async_trait;

#[derive(Debug, Clone, Default)]
pub struct ReadOnly;

impl ParseCommand for ReadOnly {
    fn parse(args: &[RespFrame]) -> Result<Self, ZirconError> {
        if !args.is_empty() {
            return Err(ZirconError::WrongArgumentCount("READONLY".to_string()));
        }
        Ok(ReadOnly)
    }
}

#[async_trait]
impl ExecutableCommand for ReadOnly {
    async fn execute(
        &self,
        _ctx: &mut ExecutionContext,
    ) -> Result<(RespValue, WriteOutcome), ZirconError> {
        Err(ZirconError::Internal(
            "READONLY command should not be executed directly".into(),
        ))
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReadWrite;

impl ParseCommand for ReadWrite {
    fn parse(args: &[RespFrame]) -> Result<Self, ZirconError> {
        if !args.is_empty() {
            return Err(ZirconError::WrongArgumentCount("READWRITE".to_string()));
        }
        Ok(ReadWrite)
    }
}

#[async_trait]
impl ExecutableCommand for ReadWrite {
    async fn execute(
        &self,
        _ctx: &mut ExecutionContext,
    ) -> Result<(RespValue, WriteOutcome), ZirconError> {
        Err(ZirconError::Internal(
            "READWRITE command should not be executed directly".into(),
        ))
    }
}
