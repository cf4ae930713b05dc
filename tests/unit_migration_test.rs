use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use zircondb::config::Config;
use zircondb::core::ZirconError;
use zircondb::core::cluster::migration::SlotMigrator;
use zircondb::core::cluster::state::{
    ClusterNode, MigrationPhase, MigrationState, NodeFlags, NodeRuntimeState,
};
use zircondb::core::state::{ServerInit, ServerState};

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

fn own_slot(state: &ServerState, slot: u16) {
    let cluster = state.cluster.as_ref().unwrap();
    let my_id = cluster.my_id.clone();
    cluster
        .apply_ownership_change(&[slot], &my_id, cluster.next_epoch())
        .unwrap();
}

#[tokio::test]
async fn test_start_migration_rejects_unowned_slot() {
    let dir = tempfile::tempdir().unwrap();
    let state = clustered_state(&dir);
    add_node(&state, "node-dest", "10.0.0.2:7979", true);

    let err = SlotMigrator::start_migration(&state, 500, "node-dest").unwrap_err();
    assert!(matches!(err, ZirconError::InvalidState(_)));
}

#[tokio::test]
async fn test_start_migration_rejects_unknown_or_replica_destination() {
    let dir = tempfile::tempdir().unwrap();
    let state = clustered_state(&dir);
    own_slot(&state, 500);

    assert!(SlotMigrator::start_migration(&state, 500, "missing").is_err());

    add_node(&state, "node-replica", "10.0.0.2:7979", false);
    assert!(SlotMigrator::start_migration(&state, 500, "node-replica").is_err());

    let my_id = state.cluster.as_ref().unwrap().my_id.clone();
    assert!(SlotMigrator::start_migration(&state, 500, &my_id).is_err());
}

#[tokio::test]
async fn test_set_importing_records_phase() {
    let dir = tempfile::tempdir().unwrap();
    let state = clustered_state(&dir);
    add_node(&state, "node-src", "10.0.0.2:7979", true);

    SlotMigrator::set_importing(&state, 300, "node-src").unwrap();

    let cluster = state.cluster.as_ref().unwrap();
    let entry = cluster.migrations.get(&300).unwrap();
    assert_eq!(entry.phase, MigrationPhase::Importing);
    assert_eq!(entry.source, "node-src");
    let myself = cluster.get_my_config();
    assert_eq!(
        myself.node_info.importing_slots.get(&300).map(String::as_str),
        Some("node-src")
    );
}

#[tokio::test]
async fn test_set_importing_rejects_owned_slot_and_unknown_source() {
    let dir = tempfile::tempdir().unwrap();
    let state = clustered_state(&dir);
    own_slot(&state, 300);

    assert!(SlotMigrator::set_importing(&state, 300, "node-src").is_err());
    assert!(SlotMigrator::set_importing(&state, 301, "missing").is_err());
}

#[tokio::test]
async fn test_abort_clears_all_migration_bookkeeping() {
    let dir = tempfile::tempdir().unwrap();
    let state = clustered_state(&dir);
    add_node(&state, "node-src", "10.0.0.2:7979", true);
    SlotMigrator::set_importing(&state, 300, "node-src").unwrap();

    SlotMigrator::abort(&state, 300).unwrap();

    let cluster = state.cluster.as_ref().unwrap();
    assert!(cluster.migrations.get(&300).is_none());
    let myself = cluster.get_my_config();
    assert!(myself.node_info.importing_slots.is_empty());
    assert!(myself.node_info.migrating_slots.is_empty());
    // Ownership is exactly what it was before: unassigned.
    assert_eq!(cluster.slot_owner_id(300), None);
}

#[tokio::test]
async fn test_failed_transfer_reverts_to_stable() {
    let dir = tempfile::tempdir().unwrap();
    let state = clustered_state(&dir);
    // Port 1 refuses connections, so the transfer task fails its handshake
    // and must revert the migration instead of leaving partial state behind.
    add_node(&state, "node-dest", "127.0.0.1:1", true);
    own_slot(&state, 500);

    SlotMigrator::start_migration(&state, 500, "node-dest").unwrap();
    let cluster = state.cluster.as_ref().unwrap();

    // Give the background task time to fail and clean up.
    let mut reverted = false;
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        if cluster.migrations.get(&500).is_none() {
            reverted = true;
            break;
        }
    }
    assert!(reverted, "migration was not reverted after transfer failure");
    assert!(cluster.get_my_config().node_info.migrating_slots.is_empty());
    // The source is still the authoritative owner.
    assert!(cluster.i_own_slot(500));
}

#[tokio::test]
async fn test_duplicate_migration_for_slot_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let state = clustered_state(&dir);
    add_node(&state, "node-dest", "10.0.0.2:7979", true);
    own_slot(&state, 301);

    // A slot with migration bookkeeping already in place cannot be migrated
    // a second time until it is finalized or reverted.
    let cluster = state.cluster.as_ref().unwrap();
    cluster.migrations.insert(
        301,
        MigrationState {
            slot: 301,
            source: cluster.my_id.clone(),
            dest: "node-dest".to_string(),
            phase: MigrationPhase::Migrating,
            keys_remaining: 0,
            started_at: std::time::Instant::now(),
        },
    );
    let err = SlotMigrator::start_migration(&state, 301, "node-dest").unwrap_err();
    assert!(matches!(err, ZirconError::InvalidState(_)));
}
