// src/core/handler/command_router.rs

//! The central component for routing parsed commands to their handlers.
//!
//! The `Router` receives a parsed `Command` from the `ConnectionHandler` and
//! subjects it to a pipeline of checks before execution: session-level
//! commands are applied directly, cluster redirection is resolved against a
//! consistent snapshot of the slot table, and writes are fenced when this
//! master has lost its quorum.

use super::cluster_redirect;
use crate::connection::SessionState;
use crate::core::commands::{CommandFlags, ExecutionContext, WriteOutcome};
use crate::core::state::ServerState;
use crate::core::{Command, RespValue, ZirconError};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tracing::debug;

/// Routes one command through validation and execution for a session.
pub struct Router<'a> {
    state: Arc<ServerState>,
    session_id: u64,
    session: &'a mut SessionState,
}

impl<'a> Router<'a> {
    pub fn new(state: Arc<ServerState>, session_id: u64, session: &'a mut SessionState) -> Self {
        Self {
            state,
            session_id,
            session,
        }
    }

    pub async fn route(&mut self, command: Command) -> Result<RespValue, ZirconError> {
        self.state.stats.increment_total_commands();
        let flags = command.get_flags();

        // Session-level commands mutate connection state and never execute.
        // ASKING arms exactly one following command.
        match &command {
            Command::Asking(_) => {
                self.session.is_asking = true;
                return Ok(RespValue::SimpleString("OK".into()));
            }
            Command::ReadOnly(_) => {
                self.session.readonly_replica = true;
                return Ok(RespValue::SimpleString("OK".into()));
            }
            Command::ReadWrite(_) => {
                self.session.readonly_replica = false;
                return Ok(RespValue::SimpleString("OK".into()));
            }
            _ => {}
        }

        let keys = command.get_keys();
        cluster_redirect::check_redirection(&self.state, &keys, self.session, flags).await?;
        if self.session.is_asking {
            self.session.is_asking = false; // ASKING is a one-shot grant.
        }

        // A master fenced by quorum loss refuses writes rather than risking a
        // split brain; reads remain available.
        if flags.contains(CommandFlags::WRITE)
            && self
                .state
                .is_read_only_due_to_quorum_loss
                .load(Ordering::Relaxed)
        {
            return Err(ZirconError::ReadOnly(
                "Writes are disabled: this master cannot see a quorum of the cluster".into(),
            ));
        }

        debug!(
            "Session {}: executing command '{}'",
            self.session_id,
            command.name()
        );

        let mut ctx = ExecutionContext {
            state: self.state.clone(),
            session_id: self.session_id,
        };
        let (value, outcome) = command.execute(&mut ctx).await?;

        // Every acknowledged write advances the replication progress marker
        // that failover elections compare.
        if outcome != WriteOutcome::DidNotWrite {
            self.state.replication_offset.fetch_add(1, Ordering::Relaxed);
        }

        Ok(value)
    }
}
