// src/core/commands/generic/shutdown.rs

use crate::core::commands::command_trait::{
    ExecutableCommand, ExecutionContext, ParseCommand, WriteOutcome,
};
use crate::core::commands::helpers::extract_string;
use crate::core::protocol::RespFrame;
use crate::core::{RespValue, ZirconError};
use async_trait::async_trait;
use tracing::info;

#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    pub nosave: bool,
}

impl ParseCommand for Shutdown {
    fn parse(args: &[RespFrame]) -> Result<Self, ZirconError> {
        match args {
            [] => Ok(Shutdown { nosave: false }),
            [flag] if extract_string(flag)?.eq_ignore_ascii_case("nosave") => {
                Ok(Shutdown { nosave: true })
            }
            _ => Err(ZirconError::SyntaxError),
        }
    }
}

#[async_trait]
impl ExecutableCommand for Shutdown {
    async fn execute(
        &self,
        ctx: &mut ExecutionContext,
    ) -> Result<(RespValue, WriteOutcome), ZirconError> {
        if !self.nosave
            && let Some(cluster) = ctx.state.cluster.as_ref()
            && let Err(e) = cluster.save_config()
        {
            return Err(ZirconError::Internal(format!(
                "Failed to save cluster config before shutdown: {e}"
            )));
        }

        info!("SHUTDOWN requested by client; signaling all tasks.");
        let _ = ctx.state.shutdown_tx.send(());
        Ok((
            RespValue::SimpleString("OK".into()),
            WriteOutcome::DidNotWrite,
        ))
    }
}
