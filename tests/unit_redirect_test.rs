use bytes::Bytes;
use std::collections::{BTreeMap, BTreeSet};
use tokio::sync::broadcast;
use zircondb::config::Config;
use zircondb::connection::SessionState;
use zircondb::core::ZirconError;
use zircondb::core::cluster::slot::get_slot;
use zircondb::core::cluster::state::{ClusterNode, NodeFlags, NodeRuntimeState};
use zircondb::core::commands::CommandFlags;
use zircondb::core::handler::cluster_redirect::check_redirection;
use zircondb::core::state::{ServerInit, ServerState};
use std::sync::Arc;

fn clustered_state(dir: &tempfile::TempDir) -> Arc<ServerState> {
    let mut config = Config::default();
    config.cluster.enabled = true;
    config.cluster.config_file = dir.path().join("nodes.conf").to_string_lossy().into_owned();
    let (shutdown_tx, _) = broadcast::channel(1);
    let ServerInit { state, .. } = ServerState::initialize(config, shutdown_tx).unwrap();
    state
}

fn add_node(state: &ServerState, id: &str, addr: &str, primary: bool) {
    let flags = if primary {
        NodeFlags::PRIMARY
    } else {
        NodeFlags::REPLICA
    };
    let node = ClusterNode {
        id: id.to_string(),
        addr: addr.to_string(),
        bus_addr: format!("{addr}0"),
        flags_raw: flags.bits(),
        replica_of: None,
        slots: BTreeSet::new(),
        config_epoch: 0,
        replication_offset: 0,
        migrating_slots: BTreeMap::new(),
        importing_slots: BTreeMap::new(),
    };
    state
        .cluster
        .as_ref()
        .unwrap()
        .nodes
        .insert(id.to_string(), NodeRuntimeState::new(node));
}

fn own_slot_of(state: &ServerState, key: &Bytes) -> u16 {
    let cluster = state.cluster.as_ref().unwrap();
    let slot = get_slot(key);
    let my_id = cluster.my_id.clone();
    cluster
        .apply_ownership_change(&[slot], &my_id, cluster.next_epoch())
        .unwrap();
    slot
}

#[tokio::test]
async fn test_owned_slot_is_served_locally() {
    let dir = tempfile::tempdir().unwrap();
    let state = clustered_state(&dir);
    let key = Bytes::from_static(b"local-key");
    own_slot_of(&state, &key);

    let session = SessionState::default();
    let result =
        check_redirection(&state, &[key], &session, CommandFlags::READONLY).await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_foreign_slot_returns_moved() {
    let dir = tempfile::tempdir().unwrap();
    let state = clustered_state(&dir);
    add_node(&state, "node-b", "10.0.0.2:7979", true);
    let key = Bytes::from_static(b"foreign-key");
    let slot = get_slot(&key);
    let cluster = state.cluster.as_ref().unwrap();
    cluster
        .apply_ownership_change(&[slot], "node-b", cluster.next_epoch())
        .unwrap();

    let session = SessionState::default();
    let err = check_redirection(&state, &[key], &session, CommandFlags::WRITE)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        ZirconError::Moved {
            slot,
            addr: "10.0.0.2:7979".to_string()
        }
    );
}

#[tokio::test]
async fn test_unassigned_slot_returns_clusterdown() {
    let dir = tempfile::tempdir().unwrap();
    let state = clustered_state(&dir);

    let session = SessionState::default();
    let err = check_redirection(
        &state,
        &[Bytes::from_static(b"orphan-key")],
        &session,
        CommandFlags::READONLY,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ZirconError::ClusterDown(_)));
}

#[tokio::test]
async fn test_cross_slot_keys_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let state = clustered_state(&dir);
    // Different hash tags force different slots.
    let a = Bytes::from_static(b"{tag-a}:k");
    let b = Bytes::from_static(b"{tag-b}:k");
    assert_ne!(get_slot(&a), get_slot(&b));

    let session = SessionState::default();
    let err = check_redirection(&state, &[a, b], &session, CommandFlags::WRITE)
        .await
        .unwrap_err();
    assert_eq!(err, ZirconError::CrossSlot);
}

#[tokio::test]
async fn test_migrating_slot_asks_for_moved_keys_only() {
    let dir = tempfile::tempdir().unwrap();
    let state = clustered_state(&dir);
    add_node(&state, "node-dest", "10.0.0.3:7979", true);

    let key = Bytes::from_static(b"migrating-key");
    let slot = own_slot_of(&state, &key);
    let cluster = state.cluster.as_ref().unwrap();
    {
        let mut myself = cluster.nodes.get_mut(&cluster.my_id).unwrap();
        myself
            .node_info
            .migrating_slots
            .insert(slot, "node-dest".to_string());
    }

    // The key is still present locally: the source keeps serving it.
    state.store.set(key.clone(), Bytes::from_static(b"v"), None).await;
    let session = SessionState::default();
    assert!(
        check_redirection(&state, &[key.clone()], &session, CommandFlags::READONLY)
            .await
            .is_ok()
    );

    // Once the key has moved away, the source answers with an ASK redirect.
    state.store.delete(&[key.clone()]).await;
    let err = check_redirection(&state, &[key], &session, CommandFlags::READONLY)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        ZirconError::Ask {
            slot,
            addr: "10.0.0.3:7979".to_string()
        }
    );
}

#[tokio::test]
async fn test_importing_slot_requires_asking() {
    let dir = tempfile::tempdir().unwrap();
    let state = clustered_state(&dir);
    add_node(&state, "node-src", "10.0.0.4:7979", true);

    let key = Bytes::from_static(b"importing-key");
    let slot = get_slot(&key);
    let cluster = state.cluster.as_ref().unwrap();
    cluster
        .apply_ownership_change(&[slot], "node-src", cluster.next_epoch())
        .unwrap();
    {
        let mut myself = cluster.nodes.get_mut(&cluster.my_id).unwrap();
        myself
            .node_info
            .importing_slots
            .insert(slot, "node-src".to_string());
    }

    // Without ASKING the client is pointed back at the authoritative source.
    let session = SessionState::default();
    let err = check_redirection(&state, &[key.clone()], &session, CommandFlags::WRITE)
        .await
        .unwrap_err();
    assert!(matches!(err, ZirconError::Moved { .. }));

    // Exactly one command of grace after ASKING.
    let asking_session = SessionState {
        is_asking: true,
        ..Default::default()
    };
    assert!(
        check_redirection(&state, &[key], &asking_session, CommandFlags::WRITE)
            .await
            .is_ok()
    );
}

#[tokio::test]
async fn test_finalized_migration_answers_moved_not_ask() {
    let dir = tempfile::tempdir().unwrap();
    let state = clustered_state(&dir);
    add_node(&state, "node-dest", "10.0.0.3:7979", true);

    let key = Bytes::from_static(b"finalized-key");
    let slot = own_slot_of(&state, &key);
    let cluster = state.cluster.as_ref().unwrap();
    {
        let mut myself = cluster.nodes.get_mut(&cluster.my_id).unwrap();
        myself
            .node_info
            .migrating_slots
            .insert(slot, "node-dest".to_string());
    }

    // Finalize: the ownership flip clears the migration bookkeeping, so every
    // request afterwards gets a permanent MOVED, never ASK.
    cluster
        .apply_ownership_change(&[slot], "node-dest", cluster.next_epoch())
        .unwrap();
    assert!(cluster.migrations.get(&slot).is_none());

    let session = SessionState::default();
    let err = check_redirection(&state, &[key], &session, CommandFlags::READONLY)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        ZirconError::Moved {
            slot,
            addr: "10.0.0.3:7979".to_string()
        }
    );
}

#[tokio::test]
async fn test_readonly_session_reads_from_replica_of_owner() {
    let dir = tempfile::tempdir().unwrap();
    let state = clustered_state(&dir);
    add_node(&state, "node-master", "10.0.0.5:7979", true);

    let key = Bytes::from_static(b"replica-read-key");
    let slot = get_slot(&key);
    let cluster = state.cluster.as_ref().unwrap();
    cluster
        .apply_ownership_change(&[slot], "node-master", cluster.next_epoch())
        .unwrap();
    {
        let mut myself = cluster.nodes.get_mut(&cluster.my_id).unwrap();
        myself
            .node_info
            .set_flags(NodeFlags::MYSELF | NodeFlags::REPLICA);
        myself.node_info.replica_of = Some("node-master".to_string());
    }

    let session = SessionState {
        readonly_replica: true,
        ..Default::default()
    };
    // Reads are served locally once the client opted in.
    assert!(
        check_redirection(&state, &[key.clone()], &session, CommandFlags::READONLY)
            .await
            .is_ok()
    );
    // Writes still go to the master.
    let err = check_redirection(&state, &[key], &session, CommandFlags::WRITE)
        .await
        .unwrap_err();
    assert!(matches!(err, ZirconError::Moved { .. }));
}
