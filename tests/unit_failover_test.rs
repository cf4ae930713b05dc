use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;
use tokio::sync::{broadcast, oneshot};
use zircondb::config::Config;
use zircondb::core::ZirconError;
use zircondb::core::cluster::events::ClusterEvent;
use zircondb::core::cluster::failover::{FailoverManager, FailoverMode, FailoverRequest};
use zircondb::core::cluster::state::{ClusterNode, NodeFlags, NodeRuntimeState};
use zircondb::core::state::{ServerInit, ServerState};

fn clustered_init(dir: &tempfile::TempDir) -> ServerInit {
    let mut config = Config::default();
    config.cluster.enabled = true;
    config.cluster.config_file = dir.path().join("nodes.conf").to_string_lossy().into_owned();
    let (shutdown_tx, _) = broadcast::channel(1);
    ServerState::initialize(config, shutdown_tx).unwrap()
}

fn make_master(id: &str, slots: impl IntoIterator<Item = u16>, offset: u64) -> ClusterNode {
    ClusterNode {
        id: id.to_string(),
        addr: "10.0.0.1:7000".to_string(),
        bus_addr: "10.0.0.1:17000".to_string(),
        flags_raw: NodeFlags::PRIMARY.bits(),
        replica_of: None,
        slots: slots.into_iter().collect::<BTreeSet<u16>>(),
        config_epoch: 0,
        replication_offset: offset,
        migrating_slots: BTreeMap::new(),
        importing_slots: BTreeMap::new(),
    }
}

/// Sets up the classic scenario: a failed master owning slots 0..10, two
/// healthy masters, and this node as a replica of the failed master.
fn setup_failed_master(state: &ServerState, master_offset: u64) {
    let cluster = state.cluster.as_ref().unwrap();

    let mut failed = make_master("master-a", 0..10, master_offset);
    failed.set_flags(NodeFlags::PRIMARY | NodeFlags::FAIL);
    cluster
        .nodes
        .insert(failed.id.clone(), NodeRuntimeState::new(failed.clone()));
    for slot in &failed.slots {
        // Install the failed master as the recorded owner directly; going
        // through apply_ownership_change would consume an epoch.
        *cluster.slots_map[*slot as usize].write() = Some(failed.id.clone());
    }

    cluster.nodes.insert(
        "master-b".to_string(),
        NodeRuntimeState::new(make_master("master-b", 100..110, 0)),
    );
    cluster.nodes.insert(
        "master-c".to_string(),
        NodeRuntimeState::new(make_master("master-c", 200..210, 0)),
    );

    let mut myself = cluster.nodes.get_mut(&cluster.my_id).unwrap();
    myself
        .node_info
        .set_flags(NodeFlags::MYSELF | NodeFlags::REPLICA);
    myself.node_info.replica_of = Some("master-a".to_string());
}

async fn request_failover(
    state: &ServerState,
    mode: FailoverMode,
) -> oneshot::Receiver<Result<u64, ZirconError>> {
    let (reply_tx, reply_rx) = oneshot::channel();
    state
        .failover_tx
        .send(FailoverRequest {
            mode,
            reply: reply_tx,
        })
        .await
        .unwrap();
    reply_rx
}

#[tokio::test]
async fn test_takeover_promotes_immediately_without_quorum() {
    let dir = tempfile::tempdir().unwrap();
    let ServerInit {
        state,
        cluster_gossip_rx: _gossip_rx,
        cluster_events_rx,
        failover_rx,
    } = clustered_init(&dir);
    setup_failed_master(&state, 0);

    let manager = FailoverManager::new(state.clone(), cluster_events_rx, failover_rx);
    tokio::spawn(manager.run(state.shutdown_tx.subscribe()));

    let reply = request_failover(&state, FailoverMode::Takeover).await;
    let epoch = reply.await.unwrap().unwrap();
    assert_eq!(epoch, 1);

    let cluster = state.cluster.as_ref().unwrap();
    let myself = cluster.get_my_config();
    assert!(myself.node_info.is_primary());
    assert_eq!(myself.node_info.replica_of, None);
    for slot in 0..10 {
        assert!(cluster.i_own_slot(slot));
    }
    // The whole failover is one committed event: the epoch moved exactly once.
    assert_eq!(cluster.current_epoch(), 1);

    let old_master = cluster.nodes.get("master-a").unwrap();
    assert!(!old_master.node_info.is_primary());
    assert_eq!(
        old_master.node_info.replica_of.as_deref(),
        Some(cluster.my_id.as_str())
    );
}

#[tokio::test]
async fn test_graceful_failover_commits_once_quorum_acks() {
    let dir = tempfile::tempdir().unwrap();
    let ServerInit {
        state,
        cluster_gossip_rx: _gossip_rx,
        cluster_events_rx,
        failover_rx,
    } = clustered_init(&dir);
    setup_failed_master(&state, 0);

    let manager = FailoverManager::new(state.clone(), cluster_events_rx, failover_rx);
    tokio::spawn(manager.run(state.shutdown_tx.subscribe()));

    let reply = request_failover(&state, FailoverMode::Graceful).await;

    // Two healthy masters are known, so the quorum is two acks. Feed them in
    // as if they had arrived over the gossip bus for the proposed epoch.
    tokio::time::sleep(Duration::from_millis(150)).await;
    for voter in ["master-b", "master-c"] {
        state
            .cluster_events_tx
            .send(ClusterEvent::VoteReceived {
                from: voter.to_string(),
                epoch: 1,
            })
            .await
            .unwrap();
    }

    let epoch = reply.await.unwrap().unwrap();
    assert_eq!(epoch, 1);

    let cluster = state.cluster.as_ref().unwrap();
    assert!(cluster.get_my_config().node_info.is_primary());
    assert!(cluster.i_own_slot(5));
}

#[tokio::test]
async fn test_failover_without_quorum_fails_and_takeover_still_works() {
    let dir = tempfile::tempdir().unwrap();
    let ServerInit {
        state,
        cluster_gossip_rx: _gossip_rx,
        cluster_events_rx,
        failover_rx,
    } = clustered_init(&dir);
    setup_failed_master(&state, 0);

    let manager = FailoverManager::new(state.clone(), cluster_events_rx, failover_rx);
    tokio::spawn(manager.run(state.shutdown_tx.subscribe()));

    // Only one of the two required acks arrives: the election must fail with
    // a quorum error and leave ownership untouched.
    let reply = request_failover(&state, FailoverMode::Graceful).await;
    tokio::time::sleep(Duration::from_millis(150)).await;
    state
        .cluster_events_tx
        .send(ClusterEvent::VoteReceived {
            from: "master-b".to_string(),
            epoch: 1,
        })
        .await
        .unwrap();

    let err = reply.await.unwrap().unwrap_err();
    assert!(matches!(err, ZirconError::QuorumNotReached(_)));

    let cluster = state.cluster.as_ref().unwrap();
    assert!(!cluster.get_my_config().node_info.is_primary());
    assert_eq!(cluster.slot_owner_id(5).as_deref(), Some("master-a"));

    // The same request with TAKEOVER succeeds immediately.
    let reply = request_failover(&state, FailoverMode::Takeover).await;
    assert!(reply.await.unwrap().is_ok());
    assert!(cluster.i_own_slot(5));
}

#[tokio::test]
async fn test_graceful_failover_rejects_stale_replica() {
    let dir = tempfile::tempdir().unwrap();
    let ServerInit {
        state,
        cluster_gossip_rx: _gossip_rx,
        cluster_events_rx,
        failover_rx,
    } = clustered_init(&dir);
    // The failed master's last known offset is ahead of ours.
    setup_failed_master(&state, 42);

    let manager = FailoverManager::new(state.clone(), cluster_events_rx, failover_rx);
    tokio::spawn(manager.run(state.shutdown_tx.subscribe()));

    let reply = request_failover(&state, FailoverMode::Graceful).await;
    let err = reply.await.unwrap().unwrap_err();
    assert!(matches!(err, ZirconError::InvalidState(_)));
}

#[tokio::test]
async fn test_force_failover_skips_caught_up_check_but_needs_quorum() {
    let dir = tempfile::tempdir().unwrap();
    let ServerInit {
        state,
        cluster_gossip_rx: _gossip_rx,
        cluster_events_rx,
        failover_rx,
    } = clustered_init(&dir);
    setup_failed_master(&state, 42);

    let manager = FailoverManager::new(state.clone(), cluster_events_rx, failover_rx);
    tokio::spawn(manager.run(state.shutdown_tx.subscribe()));

    // FORCE proceeds past the stale-replica check straight to the election.
    let reply = request_failover(&state, FailoverMode::Force).await;
    tokio::time::sleep(Duration::from_millis(150)).await;
    for voter in ["master-b", "master-c"] {
        state
            .cluster_events_tx
            .send(ClusterEvent::VoteReceived {
                from: voter.to_string(),
                epoch: 1,
            })
            .await
            .unwrap();
    }

    assert!(reply.await.unwrap().is_ok());
}

#[tokio::test]
async fn test_failover_on_a_master_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let ServerInit {
        state,
        cluster_gossip_rx: _gossip_rx,
        cluster_events_rx,
        failover_rx,
    } = clustered_init(&dir);

    let manager = FailoverManager::new(state.clone(), cluster_events_rx, failover_rx);
    tokio::spawn(manager.run(state.shutdown_tx.subscribe()));

    // This node is a fresh primary with no master: nothing to fail over from.
    let reply = request_failover(&state, FailoverMode::Graceful).await;
    let err = reply.await.unwrap().unwrap_err();
    assert!(matches!(err, ZirconError::InvalidState(_)));
}
