use std::collections::{BTreeMap, BTreeSet, HashMap};
use zircondb::core::cluster::state::{ClusterNode, ClusterState, NodeFlags, NodeRuntimeState};

fn new_state(dir: &tempfile::TempDir) -> ClusterState {
    ClusterState::new(
        "127.0.0.1:7979".to_string(),
        "127.0.0.1:17979".to_string(),
        dir.path().join("nodes.conf").to_string_lossy().into_owned(),
    )
    .unwrap()
}

fn add_master(state: &ClusterState, id: &str, slots: impl IntoIterator<Item = u16>) {
    let node = ClusterNode {
        id: id.to_string(),
        addr: "10.0.0.1:7000".to_string(),
        bus_addr: "10.0.0.1:17000".to_string(),
        flags_raw: NodeFlags::PRIMARY.bits(),
        replica_of: None,
        slots: slots.into_iter().collect::<BTreeSet<u16>>(),
        config_epoch: 0,
        replication_offset: 0,
        migrating_slots: BTreeMap::new(),
        importing_slots: BTreeMap::new(),
    };
    state
        .nodes
        .insert(node.id.clone(), NodeRuntimeState::new(node));
}

fn give_self_slots(state: &ClusterState, slots: impl IntoIterator<Item = u16>) {
    let mut myself = state.nodes.get_mut(&state.my_id).unwrap();
    myself.node_info.slots.extend(slots);
}

/// Applies a plan to the starting loads and returns the resulting counts.
fn loads_after_plan(
    state: &ClusterState,
    plan: &[zircondb::core::cluster::state::SlotMove],
) -> HashMap<String, usize> {
    let mut loads: HashMap<String, usize> = state
        .nodes
        .iter()
        .filter(|n| n.value().node_info.is_primary())
        .map(|n| (n.key().clone(), n.value().node_info.slots.len()))
        .collect();
    for mv in plan {
        *loads.get_mut(&mv.from).expect("source must be a known master") -= 1;
        *loads.get_mut(&mv.to).expect("target must be a known master") += 1;
    }
    loads
}

#[test]
fn test_balanced_cluster_produces_empty_plan() {
    let dir = tempfile::tempdir().unwrap();
    let state = new_state(&dir);
    give_self_slots(&state, 0..4);
    add_master(&state, "node-b", 4..8);
    add_master(&state, "node-c", 8..12);

    assert!(state.plan_rebalance(1).is_empty());
}

#[test]
fn test_plan_converges_within_tolerance() {
    let dir = tempfile::tempdir().unwrap();
    let state = new_state(&dir);
    give_self_slots(&state, 0..10);
    add_master(&state, "node-b", 10..12);
    add_master(&state, "node-c", std::iter::empty());

    let plan = state.plan_rebalance(1);
    assert!(!plan.is_empty());

    let loads = loads_after_plan(&state, &plan);
    let max = loads.values().max().unwrap();
    let min = loads.values().min().unwrap();
    assert!(max - min <= 1, "loads after plan: {loads:?}");
}

#[test]
fn test_plan_moves_preserve_total_slot_count() {
    let dir = tempfile::tempdir().unwrap();
    let state = new_state(&dir);
    give_self_slots(&state, 0..100);
    add_master(&state, "node-b", std::iter::empty());

    let plan = state.plan_rebalance(0);
    // Every move names both a source and a destination, so applying the plan
    // can never change the number of assigned slots.
    let loads = loads_after_plan(&state, &plan);
    let total: usize = loads.values().sum();
    assert_eq!(total, 100);
}

#[test]
fn test_plan_excludes_failed_masters() {
    let dir = tempfile::tempdir().unwrap();
    let state = new_state(&dir);
    give_self_slots(&state, 0..12);
    add_master(&state, "node-b", std::iter::empty());
    add_master(&state, "node-dead", std::iter::empty());
    {
        let mut dead = state.nodes.get_mut("node-dead").unwrap();
        dead.node_info
            .set_flags(NodeFlags::PRIMARY | NodeFlags::FAIL);
    }

    let plan = state.plan_rebalance(1);
    assert!(!plan.is_empty());
    assert!(plan.iter().all(|mv| mv.to != "node-dead"));
}

#[test]
fn test_plan_is_deterministic() {
    let dir = tempfile::tempdir().unwrap();
    let state = new_state(&dir);
    give_self_slots(&state, 0..9);
    add_master(&state, "node-b", 9..12);
    add_master(&state, "node-c", std::iter::empty());

    assert_eq!(state.plan_rebalance(1), state.plan_rebalance(1));
}

#[test]
fn test_single_master_never_plans_moves() {
    let dir = tempfile::tempdir().unwrap();
    let state = new_state(&dir);
    give_self_slots(&state, 0..100);

    assert!(state.plan_rebalance(0).is_empty());
}
