// src/core/handler/cluster_redirect.rs

//! Pipeline step for handling cluster redirections (MOVED/ASK).

use crate::connection::SessionState;
use crate::core::ZirconError;
use crate::core::cluster::slot;
use crate::core::commands::CommandFlags;
use crate::core::state::ServerState;
use bytes::Bytes;
use std::sync::Arc;

/// What this node knows about the routing of one slot, read in a single
/// snapshot so the decision below cannot mix an old owner with a new
/// migration flag.
struct SlotView {
    owner_id: Option<String>,
    importing_from: Option<String>,
    migrating_to: Option<String>,
    my_master: Option<String>,
}

fn snapshot_slot(state: &Arc<ServerState>, slot: u16) -> Option<SlotView> {
    let cluster = state.cluster.as_ref()?;
    let myself = cluster.get_my_config();
    Some(SlotView {
        owner_id: cluster.slot_owner_id(slot),
        importing_from: myself.node_info.importing_slots.get(&slot).cloned(),
        migrating_to: myself.node_info.migrating_slots.get(&slot).cloned(),
        my_master: myself.node_info.replica_of.clone(),
    })
}

fn addr_of(state: &Arc<ServerState>, node_id: &str) -> Result<String, ZirconError> {
    let cluster = state
        .cluster
        .as_ref()
        .expect("redirection check requires cluster mode");
    cluster
        .nodes
        .get(node_id)
        .map(|n| n.node_info.addr.clone())
        .ok_or_else(|| ZirconError::ClusterDown(format!("Node {node_id} not found")))
}

/// Checks if a command targeting specific keys should be redirected to
/// another node.
pub async fn check_redirection(
    state: &Arc<ServerState>,
    keys: &[Bytes],
    session: &SessionState,
    flags: CommandFlags,
) -> Result<(), ZirconError> {
    let Some(cluster) = &state.cluster else {
        return Ok(());
    };
    if keys.is_empty() {
        return Ok(());
    }

    let first_slot = slot::get_slot(&keys[0]);
    if keys.len() > 1 && !keys.iter().all(|k| slot::get_slot(k) == first_slot) {
        return Err(ZirconError::CrossSlot);
    }

    let view = snapshot_slot(state, first_slot)
        .ok_or_else(|| ZirconError::ClusterDown("Cluster state unavailable".to_string()))?;

    // Importing side: only an ASK-flagged request may touch the slot early.
    if let Some(source_id) = &view.importing_from
        && !session.is_asking
    {
        return Err(ZirconError::Moved {
            slot: first_slot,
            addr: addr_of(state, source_id)?,
        });
    }

    // Migrating side: keys already moved answer with a one-shot ASK redirect
    // to the destination; not-yet-moved keys are still served here.
    if let Some(dest_id) = &view.migrating_to
        && !state.store.exists(&keys[0]).await
    {
        return Err(ZirconError::Ask {
            slot: first_slot,
            addr: addr_of(state, dest_id)?,
        });
    }

    // An ASK-flagged request has passed the import gate; nothing more to check.
    if session.is_asking {
        return Ok(());
    }

    match view.owner_id.as_deref() {
        Some(owner_id) if owner_id == cluster.my_id => Ok(()),
        Some(owner_id) => {
            // A replica may serve reads for its own master's slots when the
            // client opted in with READONLY.
            if session.readonly_replica
                && flags.contains(CommandFlags::READONLY)
                && view.my_master.as_deref() == Some(owner_id)
            {
                return Ok(());
            }
            Err(ZirconError::Moved {
                slot: first_slot,
                addr: addr_of(state, owner_id)?,
            })
        }
        None => Err(ZirconError::ClusterDown(format!(
            "Hash slot {first_slot} is not served by any node"
        ))),
    }
}
