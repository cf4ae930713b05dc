// src/core/commands/cluster/failover.rs

use crate::core::cluster::failover::{FailoverMode, FailoverRequest};
use crate::core::commands::command_trait::{ExecutionContext, WriteOutcome};
use crate::core::{RespValue, ZirconError};
use tokio::sync::oneshot;
use tracing::info;

/// `CLUSTER FAILOVER [FORCE|TAKEOVER]`, issued on a replica.
///
/// The request goes through the failover manager's queue, the same entry
/// point an external monitoring process uses, so both are subject to the
/// identical quorum gating. Only TAKEOVER skips the quorum wait, and only
/// because the operator explicitly asked for it.
pub async fn execute(
    ctx: &mut ExecutionContext,
    mode: FailoverMode,
) -> Result<(RespValue, WriteOutcome), ZirconError> {
    let (reply_tx, reply_rx) = oneshot::channel();
    ctx.state
        .failover_tx
        .send(FailoverRequest {
            mode,
            reply: reply_tx,
        })
        .await
        .map_err(|_| ZirconError::Internal("Failover manager is not running".into()))?;

    let epoch = reply_rx
        .await
        .map_err(|_| ZirconError::Internal("Failover manager dropped the request".into()))??;

    info!("Manual failover ({:?}) committed at epoch {}.", mode, epoch);
    Ok((
        RespValue::SimpleString("OK".into()),
        WriteOutcome::DidNotWrite,
    ))
}
