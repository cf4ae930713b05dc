// src/core/commands/cluster/health.rs

use crate::core::cluster::state::ClusterState;
use crate::core::commands::command_trait::WriteOutcome;
use crate::core::{RespValue, ZirconError};
use std::fmt::Write;

pub fn execute(cluster: &ClusterState) -> Result<(RespValue, WriteOutcome), ZirconError> {
    let report = cluster.check_health();

    let mut out = String::new();
    let _ = write!(out, "status:{}\r\n", report.status.as_str());
    let _ = write!(out, "covered_slots:{}\r\n", report.covered_slots);
    let _ = write!(out, "online_primaries:{}\r\n", report.online_primaries);
    let _ = write!(out, "online_replicas:{}\r\n", report.online_replicas);
    let _ = write!(out, "failed_nodes:{}\r\n", report.failed_nodes);
    for issue in &report.issues {
        let _ = write!(out, "issue:{issue}\r\n");
    }

    Ok((
        RespValue::BulkString(out.into()),
        WriteOutcome::DidNotWrite,
    ))
}
