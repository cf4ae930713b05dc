// src/core/cluster/migration.rs

//! Orchestrates live slot migrations: the two-phase handshake, the per-key
//! transfer loop, finalization, and abort.
//!
//! The source stays authoritative for every not-yet-transferred key until the
//! explicit finalize step, so a crash mid-migration never leaves a slot
//! ownerless: on restart the slot is simply still owned (and still marked
//! migrating) by the source. Per-key transfer is at-least-once; the
//! destination applies keys idempotently (`RESTORE ... REPLACE`), so
//! re-sending after an ambiguous failure is harmless.

use crate::core::ZirconError;
use crate::core::cluster::client::ClusterClient;
use crate::core::cluster::state::{MigrationPhase, MigrationState};
use crate::core::state::ServerState;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Base backoff between retries of a failed key transfer; grows linearly with
/// the attempt number.
const RETRY_BACKOFF: Duration = Duration::from_millis(100);

/// How many times finalize retries the epoch-gated commit after losing a race
/// with a concurrent ownership change.
const FINALIZE_ATTEMPTS: u32 = 3;

/// Static entry points for driving slot migrations on this node.
pub struct SlotMigrator;

impl SlotMigrator {
    /// Starts migrating `slot` from this node to `dest_id`.
    ///
    /// Validates that this node owns the slot and that the destination is a
    /// known, distinct primary, records the `Migrating` phase locally, and
    /// spawns the background transfer task. The task first drives the
    /// destination into `Importing`; no key moves until both sides agree.
    pub fn start_migration(
        state: &Arc<ServerState>,
        slot: u16,
        dest_id: &str,
    ) -> Result<(), ZirconError> {
        let cluster = state
            .cluster
            .as_ref()
            .ok_or_else(|| ZirconError::InvalidState("Cluster mode is not enabled.".into()))?;

        if !cluster.i_own_slot(slot) {
            return Err(ZirconError::InvalidState(
                "Cannot MIGRATE a slot I don't own".to_string(),
            ));
        }
        if dest_id == cluster.my_id {
            return Err(ZirconError::InvalidState(
                "Cannot migrate a slot to myself".to_string(),
            ));
        }
        if cluster.migrations.contains_key(&slot) {
            return Err(ZirconError::InvalidState(format!(
                "Slot {slot} already has a migration in progress"
            )));
        }
        let dest_is_primary = cluster
            .nodes
            .get(dest_id)
            .map(|n| n.node_info.is_primary())
            .ok_or_else(|| ZirconError::InvalidState(format!("Node {dest_id} not found")))?;
        if !dest_is_primary {
            return Err(ZirconError::InvalidState(format!(
                "Destination node {dest_id} is not a primary"
            )));
        }

        if let Some(mut myself) = cluster.nodes.get_mut(&cluster.my_id) {
            myself
                .node_info
                .migrating_slots
                .insert(slot, dest_id.to_string());
        }
        cluster.migrations.insert(
            slot,
            MigrationState {
                slot,
                source: cluster.my_id.clone(),
                dest: dest_id.to_string(),
                phase: MigrationPhase::Migrating,
                keys_remaining: 0,
                started_at: Instant::now(),
            },
        );

        let task_state = state.clone();
        let dest_id = dest_id.to_string();
        let shutdown_rx = state.shutdown_tx.subscribe();
        tokio::spawn(async move {
            Self::run_transfer(task_state, slot, dest_id, shutdown_rx).await;
        });

        Ok(())
    }

    /// Marks `slot` as importing from `source_id` on this node.
    /// This is the destination half of the two-phase handshake.
    pub fn set_importing(
        state: &Arc<ServerState>,
        slot: u16,
        source_id: &str,
    ) -> Result<(), ZirconError> {
        let cluster = state
            .cluster
            .as_ref()
            .ok_or_else(|| ZirconError::InvalidState("Cluster mode is not enabled.".into()))?;

        if cluster.i_own_slot(slot) {
            return Err(ZirconError::InvalidState(
                "Cannot IMPORT a slot I already own".to_string(),
            ));
        }
        if !cluster.nodes.contains_key(source_id) {
            return Err(ZirconError::InvalidState(format!(
                "Node {source_id} not found"
            )));
        }

        if let Some(mut myself) = cluster.nodes.get_mut(&cluster.my_id) {
            myself
                .node_info
                .importing_slots
                .insert(slot, source_id.to_string());
        }
        cluster.migrations.insert(
            slot,
            MigrationState {
                slot,
                source: source_id.to_string(),
                dest: cluster.my_id.clone(),
                phase: MigrationPhase::Importing,
                keys_remaining: 0,
                started_at: Instant::now(),
            },
        );
        Ok(())
    }

    /// Aborts any in-flight migration of `slot` on this node
    /// (`CLUSTER SETSLOT <slot> STABLE`): migration bookkeeping is cleared and
    /// ownership stays exactly where it was. The transfer task notices the
    /// removed entry and stops.
    pub fn abort(state: &Arc<ServerState>, slot: u16) -> Result<(), ZirconError> {
        let cluster = state
            .cluster
            .as_ref()
            .ok_or_else(|| ZirconError::InvalidState("Cluster mode is not enabled.".into()))?;

        if let Some(mut myself) = cluster.nodes.get_mut(&cluster.my_id) {
            myself.node_info.migrating_slots.remove(&slot);
            myself.node_info.importing_slots.remove(&slot);
        }
        if cluster.migrations.remove(&slot).is_some() {
            info!("Migration of slot {} reverted to stable.", slot);
        }
        Ok(())
    }

    /// The background transfer task for one slot.
    async fn run_transfer(
        state: Arc<ServerState>,
        slot: u16,
        dest_id: String,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        match Self::transfer_loop(&state, slot, &dest_id, &mut shutdown_rx).await {
            Ok(true) => info!("Migration of slot {} to {} finalized.", slot, dest_id),
            Ok(false) => debug!("Migration of slot {} stopped before finalize.", slot),
            Err(e) => {
                // A failed transfer must never leave partial ownership behind:
                // revert to source-stable and surface the error in the logs.
                warn!(
                    "Migration of slot {} to {} aborted: {}. Reverting to stable.",
                    slot, dest_id, e
                );
                let _ = Self::abort(&state, slot);
            }
        }
    }

    /// Moves every key of the slot to the destination and finalizes the
    /// ownership flip. Returns `Ok(false)` when the migration was cancelled
    /// (abort or shutdown) before completion.
    async fn transfer_loop(
        state: &Arc<ServerState>,
        slot: u16,
        dest_id: &str,
        shutdown_rx: &mut broadcast::Receiver<()>,
    ) -> Result<bool, ZirconError> {
        let cluster = state
            .cluster
            .as_ref()
            .ok_or_else(|| ZirconError::InvalidState("Cluster mode is not enabled.".into()))?;

        let (batch_size, retry_budget) = {
            let config = state.config.lock().await;
            (
                config.cluster.migration_batch_size,
                config.cluster.migration_retry_budget,
            )
        };

        // Resolve the destination address outside any lock; all network I/O
        // below happens lock-free, with state mutations applied afterwards.
        let dest_addr: SocketAddr = cluster
            .nodes
            .get(dest_id)
            .map(|n| n.node_info.addr.clone())
            .ok_or_else(|| ZirconError::InvalidState(format!("Node {dest_id} not found")))?
            .parse()
            .map_err(|e| ZirconError::MigrationError(format!("Bad destination address: {e}")))?;

        let mut client = ClusterClient::connect(dest_addr)
            .await
            .map_err(|e| ZirconError::MigrationError(format!("Connect to destination: {e}")))?;

        // Both sides must agree before any key moves.
        client
            .setslot_importing(slot, &cluster.my_id)
            .await
            .map_err(|e| ZirconError::MigrationError(format!("Destination handshake: {e}")))?;

        loop {
            if shutdown_rx.try_recv().is_ok() {
                return Ok(false);
            }
            // An abort removes the migration entry out from under us.
            if !cluster.migrations.contains_key(&slot) {
                return Ok(false);
            }

            let keys = state.store.keys_in_slot(slot, batch_size).await;
            if keys.is_empty() {
                break;
            }

            for key in keys {
                Self::transfer_key(state, &mut client, &key, retry_budget).await?;
            }

            let remaining = state.store.count_keys_in_slot(slot).await as u64;
            if let Some(mut entry) = cluster.migrations.get_mut(&slot) {
                entry.keys_remaining = remaining;
            }
            debug!("Slot {} migration: ~{} keys remaining.", slot, remaining);
        }

        Self::finalize(state, slot, dest_id, &mut client).await?;
        Ok(true)
    }

    /// Transfers one key with bounded retry and linear backoff. The key is
    /// deleted from the source only after the destination acknowledged it.
    async fn transfer_key(
        state: &Arc<ServerState>,
        client: &mut ClusterClient,
        key: &bytes::Bytes,
        retry_budget: u32,
    ) -> Result<(), ZirconError> {
        // The key may have expired or been deleted since enumeration.
        let Some((payload, ttl_ms)) = state.store.dump(key).await else {
            return Ok(());
        };

        let mut attempt = 0u32;
        loop {
            match client.restore_key(key.clone(), payload.clone(), ttl_ms).await {
                Ok(()) => {
                    state.store.delete(std::slice::from_ref(key)).await;
                    return Ok(());
                }
                Err(e) => {
                    attempt += 1;
                    if attempt >= retry_budget {
                        return Err(ZirconError::MigrationError(format!(
                            "key transfer exhausted {retry_budget} attempts: {e}"
                        )));
                    }
                    warn!(
                        "Key transfer attempt {}/{} failed: {}. Retrying.",
                        attempt, retry_budget, e
                    );
                    tokio::time::sleep(RETRY_BACKOFF * attempt).await;
                }
            }
        }
    }

    /// Flips ownership to the destination under a fresh epoch and tells the
    /// destination directly; the rest of the cluster converges via gossip.
    async fn finalize(
        state: &Arc<ServerState>,
        slot: u16,
        dest_id: &str,
        client: &mut ClusterClient,
    ) -> Result<(), ZirconError> {
        let cluster = state
            .cluster
            .as_ref()
            .ok_or_else(|| ZirconError::InvalidState("Cluster mode is not enabled.".into()))?;

        if let Some(mut entry) = cluster.migrations.get_mut(&slot) {
            entry.phase = MigrationPhase::Done;
            entry.keys_remaining = 0;
        }

        // Losing an epoch race to an unrelated commit just means proposing
        // again with a fresher epoch; the slot itself is still ours to hand off.
        let mut last_err = None;
        for _ in 0..FINALIZE_ATTEMPTS {
            let epoch = cluster.next_epoch();
            match cluster.apply_ownership_change(&[slot], dest_id, epoch) {
                Ok(()) => {
                    last_err = None;
                    break;
                }
                Err(e @ ZirconError::StaleEpoch { .. }) => {
                    last_err = Some(e);
                    continue;
                }
                Err(e) => return Err(e),
            }
        }
        if let Some(e) = last_err {
            return Err(e);
        }

        if let Err(e) = client.setslot_node(slot, dest_id).await {
            // Not fatal: the destination learns the committed ownership
            // through gossip even if this direct notification is lost.
            warn!(
                "Failed to notify destination of finalized slot {}: {}. \
                 Gossip will eventually sync.",
                slot, e
            );
        }
        Ok(())
    }
}
