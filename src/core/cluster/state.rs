// src/core/cluster/state.rs

//! Manages the shared state of the cluster: the node registry, the slot
//! ownership table, the migration table, and the configuration epoch.
//!
//! Every ownership mutation funnels through [`ClusterState::apply_ownership_change`],
//! which enforces the strictly-increasing epoch rule. Everything else reads
//! the slot table through per-slot reader/writer locks, keeping the request
//! routing hot path lock-light.

use super::slot::{NUM_SLOTS, SlotRange};
use crate::core::ZirconError;
use bitflags::bitflags;
use dashmap::DashMap;
use dashmap::mapref::one::Ref;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// The role of a node in the cluster.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    bincode::Encode,
    bincode::Decode,
)]
pub enum NodeRole {
    Primary,
    Replica,
}

bitflags! {
    /// Flags representing the state and role of a cluster node.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
    pub struct NodeFlags: u16 {
        const MYSELF         = 1 << 0;  // The node is this server instance.
        const PRIMARY        = 1 << 1;  // The node is a primary (master).
        const REPLICA        = 1 << 2;  // The node is a replica.
        const PFAIL          = 1 << 3;  // Possible failure (unconfirmed, own observation).
        const FAIL           = 1 << 4;  // Confirmed failure (quorum of reporters).
        const HANDSHAKE      = 1 << 5;  // Node is in handshake, not yet part of the cluster.
        const NOADDR         = 1 << 6;  // Node address is unknown.
    }
}

/// Represents the configuration and static state of a node, gossiped and persisted.
#[derive(Debug, Clone, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct ClusterNode {
    pub id: String,
    pub addr: String,
    pub bus_addr: String,
    pub flags_raw: u16,
    pub replica_of: Option<String>,
    pub slots: BTreeSet<u16>,
    pub config_epoch: u64,
    #[serde(default)]
    pub replication_offset: u64,
    /// Slots this node is migrating away. Key: slot, Value: destination node_id.
    #[serde(default)]
    pub migrating_slots: BTreeMap<u16, String>,
    /// Slots this node is importing. Key: slot, Value: source node_id.
    #[serde(default)]
    pub importing_slots: BTreeMap<u16, String>,
}

impl ClusterNode {
    pub fn get_flags(&self) -> NodeFlags {
        NodeFlags::from_bits_truncate(self.flags_raw)
    }

    pub fn set_flags(&mut self, flags: NodeFlags) {
        self.flags_raw = flags.bits();
    }

    pub fn is_primary(&self) -> bool {
        self.get_flags().contains(NodeFlags::PRIMARY)
    }
}

/// The runtime state of a node, which is not persisted or gossiped.
#[derive(Debug, Clone)]
pub struct NodeRuntimeState {
    pub node_info: ClusterNode,
    pub ping_sent: Option<Instant>,
    pub pong_received: Option<Instant>,
    /// Which nodes have reported this node as PFAIL. Key: reporter_id.
    /// This is the suspicion ledger: a node only graduates to FAIL once a
    /// majority of online masters appears here.
    pub pfail_reports: HashMap<String, Instant>,
}

impl NodeRuntimeState {
    pub fn new(node_info: ClusterNode) -> Self {
        Self {
            node_info,
            ping_sent: None,
            pong_received: None,
            pfail_reports: HashMap::new(),
        }
    }
}

/// The phase of a per-slot migration. Phases only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationPhase {
    /// This node is the source and is pushing keys out.
    Migrating,
    /// This node is the destination and accepts ASK-flagged requests.
    Importing,
    /// Transfer finished; ownership flip is committed or imminent.
    Done,
}

/// Tracks one in-flight slot migration on this node.
#[derive(Debug, Clone)]
pub struct MigrationState {
    pub slot: u16,
    pub source: String,
    pub dest: String,
    pub phase: MigrationPhase,
    /// Best-effort estimate, refreshed at every transfer batch.
    pub keys_remaining: u64,
    pub started_at: Instant,
}

/// A single planned slot movement produced by the rebalance planner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotMove {
    pub slot: u16,
    pub from: String,
    pub to: String,
}

/// The overall verdict of a cluster health check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    /// Full coverage, every owner reachable.
    Ok,
    /// Full coverage, but some node is suspected or confirmed down.
    Degraded,
    /// Coverage gap, ownership overlap, or no online primaries.
    Fail,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Ok => "ok",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Fail => "fail",
        }
    }
}

/// The detailed result of `check_health`. Faults are reported, never repaired.
#[derive(Debug, Clone)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub issues: Vec<String>,
    pub covered_slots: usize,
    pub online_primaries: usize,
    pub online_replicas: usize,
    pub failed_nodes: usize,
}

/// Per-node entry of a `CLUSTER STATS` report.
#[derive(Debug, Clone)]
pub struct NodeStats {
    pub id: String,
    pub addr: String,
    pub role: NodeRole,
    pub slot_count: usize,
    /// Only known precisely for this node; peers report through gossip digests.
    pub key_count: Option<usize>,
}

/// A helper struct for serializing the essential cluster state to a file.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedClusterState {
    my_id: String,
    current_epoch: u64,
    nodes: Vec<ClusterNode>,
}

/// `ClusterState` is the main container for all cluster-related information on
/// this node. Exactly one instance exists per process, owned by `ServerState`.
#[derive(Debug)]
pub struct ClusterState {
    /// The unique 40-character hexadecimal run ID of this node.
    pub my_id: String,
    /// The current configuration epoch of the cluster, used to order
    /// ownership-affecting events. Strictly increasing.
    pub current_epoch: AtomicU64,
    /// Serializes ownership commits so the epoch check-and-set is atomic.
    commit_lock: Mutex<()>,
    /// A map of all known nodes in the cluster, keyed by their unique run ID.
    pub nodes: DashMap<String, NodeRuntimeState>,
    /// A mapping of each of the 16384 hash slots to the ID of the owning node.
    pub slots_map: [RwLock<Option<String>>; NUM_SLOTS],
    /// In-flight migrations on this node, keyed by slot.
    pub migrations: DashMap<u16, MigrationState>,
    /// The file path for the persisted cluster configuration (`nodes.conf`).
    pub config_file_path: String,
    // --- Failover vote bookkeeping ---
    pub last_vote_epoch: AtomicU64,
    pub failover_auth_count: AtomicU64,
    pub failover_auth_epoch: AtomicU64,
    pub failover_auth_time: AtomicU64,
    // --- Bus message counters, surfaced by CLUSTER INFO ---
    pub messages_sent: AtomicU64,
    pub messages_received: AtomicU64,
}

impl ClusterState {
    /// Creates a new, fresh `ClusterState` for a node starting for the first time.
    pub fn new(
        addr: String,
        bus_addr: String,
        config_file_path: String,
    ) -> Result<Self, ZirconError> {
        let mut id_bytes = [0u8; 20];
        getrandom::fill(&mut id_bytes).map_err(|e| ZirconError::Internal(e.to_string()))?;
        let my_id = hex::encode(id_bytes);
        let slots_map = std::array::from_fn(|_| RwLock::new(None));
        let nodes = DashMap::new();

        let myself = ClusterNode {
            id: my_id.clone(),
            addr,
            bus_addr,
            flags_raw: (NodeFlags::MYSELF | NodeFlags::PRIMARY).bits(),
            replica_of: None,
            slots: BTreeSet::new(),
            config_epoch: 0,
            replication_offset: 0,
            migrating_slots: BTreeMap::new(),
            importing_slots: BTreeMap::new(),
        };
        let mut runtime = NodeRuntimeState::new(myself);
        runtime.pong_received = Some(Instant::now());
        nodes.insert(my_id.clone(), runtime);

        Ok(Self {
            my_id,
            current_epoch: AtomicU64::new(0),
            commit_lock: Mutex::new(()),
            nodes,
            slots_map,
            migrations: DashMap::new(),
            config_file_path,
            last_vote_epoch: AtomicU64::new(0),
            failover_auth_count: AtomicU64::new(0),
            failover_auth_epoch: AtomicU64::new(0),
            failover_auth_time: AtomicU64::new(0),
            messages_sent: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
        })
    }

    /// Loads the cluster state from a `nodes.conf` file written by a previous run.
    pub fn from_file(path: &str, addr: String, bus_addr: String) -> Result<Self, ZirconError> {
        let content = std::fs::read_to_string(path)?;
        let persisted: PersistedClusterState = serde_json::from_str(&content)?;

        let slots_map: [RwLock<Option<String>>; NUM_SLOTS] =
            std::array::from_fn(|_| RwLock::new(None));
        let nodes = DashMap::new();

        for mut node_info in persisted.nodes {
            let mut pong_received = None;
            if node_info.get_flags().contains(NodeFlags::MYSELF) {
                // The announce address may have changed across restarts.
                node_info.addr = addr.clone();
                node_info.bus_addr = bus_addr.clone();
                pong_received = Some(Instant::now());
            }

            for &slot in &node_info.slots {
                *slots_map[slot as usize].write() = Some(node_info.id.clone());
            }

            let mut runtime = NodeRuntimeState::new(node_info);
            runtime.pong_received = pong_received;
            nodes.insert(runtime.node_info.id.clone(), runtime);
        }

        Ok(Self {
            my_id: persisted.my_id,
            current_epoch: AtomicU64::new(persisted.current_epoch),
            commit_lock: Mutex::new(()),
            nodes,
            slots_map,
            migrations: DashMap::new(),
            config_file_path: path.to_string(),
            last_vote_epoch: AtomicU64::new(0),
            failover_auth_count: AtomicU64::new(0),
            failover_auth_epoch: AtomicU64::new(persisted.current_epoch),
            failover_auth_time: AtomicU64::new(0),
            messages_sent: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
        })
    }

    /// Saves the current cluster configuration to the `nodes.conf` file atomically.
    pub fn save_config(&self) -> Result<(), ZirconError> {
        let nodes_vec: Vec<ClusterNode> = self
            .nodes
            .iter()
            .map(|e| e.value().node_info.clone())
            .collect();

        let persisted = PersistedClusterState {
            my_id: self.my_id.clone(),
            current_epoch: self.current_epoch.load(Ordering::Relaxed),
            nodes: nodes_vec,
        };

        let content = serde_json::to_string_pretty(&persisted)?;
        let temp_path = format!("{}.tmp-{}", self.config_file_path, rand::random::<u32>());
        std::fs::write(&temp_path, content)?;
        std::fs::rename(temp_path, &self.config_file_path)?;
        Ok(())
    }

    /// Returns a reference to this node's own `NodeRuntimeState`.
    pub fn get_my_config(&self) -> Ref<'_, String, NodeRuntimeState> {
        self.nodes
            .get(&self.my_id)
            .expect("Invariant violation: own node config should always exist in the cluster map")
    }

    pub fn current_epoch(&self) -> u64 {
        self.current_epoch.load(Ordering::Relaxed)
    }

    /// Returns the next epoch a proposer should use for an ownership change.
    pub fn next_epoch(&self) -> u64 {
        let current = self.current_epoch.load(Ordering::Relaxed);
        let my_epoch = self.get_my_config().node_info.config_epoch;
        current.max(my_epoch) + 1
    }

    // --- Ownership mutation ---

    /// The sole mutator of the slot ownership table.
    ///
    /// Commits `new_owner` as the owner of `slots` under `epoch`. The commit is
    /// rejected with `StaleEpoch` when `epoch <= current_epoch`, which is what
    /// turns two racing proposals into exactly one winner and one error.
    /// Clears any migration bookkeeping for the affected slots and persists
    /// the new configuration.
    pub fn apply_ownership_change(
        &self,
        slots: &[u16],
        new_owner: &str,
        epoch: u64,
    ) -> Result<(), ZirconError> {
        for &slot in slots {
            if slot as usize >= NUM_SLOTS {
                return Err(ZirconError::InvalidState(format!(
                    "Slot {slot} is out of range"
                )));
            }
        }
        if !self.nodes.contains_key(new_owner) {
            return Err(ZirconError::InvalidState(format!(
                "Node {new_owner} not found"
            )));
        }

        let _commit = self.commit_lock.lock();

        let current = self.current_epoch.load(Ordering::Relaxed);
        if epoch <= current {
            return Err(ZirconError::StaleEpoch {
                proposed: epoch,
                current,
            });
        }

        for &slot in slots {
            // Drop migration bookkeeping everywhere; the flip supersedes it.
            self.migrations.remove(&slot);
            for mut node in self.nodes.iter_mut() {
                node.node_info.migrating_slots.remove(&slot);
                node.node_info.importing_slots.remove(&slot);
            }

            let previous = { self.slots_map[slot as usize].read().clone() };
            if let Some(old_id) = previous
                && old_id != new_owner
                && let Some(mut old_owner) = self.nodes.get_mut(&old_id)
            {
                old_owner.node_info.slots.remove(&slot);
            }

            if let Some(mut owner) = self.nodes.get_mut(new_owner) {
                owner.node_info.slots.insert(slot);
            }
            *self.slots_map[slot as usize].write() = Some(new_owner.to_string());
        }

        if let Some(mut owner) = self.nodes.get_mut(new_owner) {
            owner.node_info.config_epoch = epoch;
        }
        self.current_epoch.store(epoch, Ordering::Relaxed);

        if let Err(e) = self.save_config() {
            warn!("Failed to persist cluster config after ownership change: {e}");
        }

        info!(
            "Ownership of {} slot(s) committed to {} at epoch {}",
            slots.len(),
            new_owner,
            epoch
        );
        Ok(())
    }

    /// Marks this node as the owner of the given slot ranges.
    ///
    /// Fails when any slot is already owned by a different node, unless
    /// `takeover` is set. The assignment is a single ownership-affecting
    /// event: it consumes exactly one new epoch.
    pub fn assign_slots(&self, ranges: &[SlotRange], takeover: bool) -> Result<(), ZirconError> {
        let mut slots = Vec::new();
        for range in ranges {
            if range.start > range.end || range.end as usize >= NUM_SLOTS {
                return Err(ZirconError::InvalidState(format!(
                    "Invalid slot range {}-{}",
                    range.start, range.end
                )));
            }
            for slot in range.iter() {
                if !takeover
                    && let Some(owner) = self.slots_map[slot as usize].read().as_deref()
                    && owner != self.my_id
                {
                    return Err(ZirconError::InvalidState(format!(
                        "Slot {slot} is already served by node {owner}"
                    )));
                }
                slots.push(slot);
            }
        }
        self.apply_ownership_change(&slots, &self.my_id.clone(), self.next_epoch())
    }

    // --- Slot table reads (the hot path) ---

    /// Checks if this node is the owner of a given slot.
    pub fn i_own_slot(&self, slot: u16) -> bool {
        self.slots_map[slot as usize]
            .read()
            .as_ref()
            .is_some_and(|id| *id == self.my_id)
    }

    /// Returns the ID of the node that owns a given slot, if any.
    pub fn slot_owner_id(&self, slot: u16) -> Option<String> {
        self.slots_map[slot as usize].read().clone()
    }

    /// Returns the node record responsible for a given slot.
    pub fn get_node_for_slot(&self, slot: u16) -> Option<Ref<'_, String, NodeRuntimeState>> {
        let owner_id = self.slots_map[slot as usize].read();
        let owner_id_str = owner_id.as_deref()?;
        self.nodes.get(owner_id_str)
    }

    // --- Failure detection bookkeeping ---

    /// Records a PFAIL report from one node about another.
    pub fn mark_node_as_pfail(&self, node_id: &str, reporter_id: &str) {
        if let Some(mut runtime) = self.nodes.get_mut(node_id) {
            if !runtime
                .node_info
                .get_flags()
                .intersects(NodeFlags::MYSELF | NodeFlags::HANDSHAKE | NodeFlags::NOADDR)
            {
                runtime
                    .pfail_reports
                    .insert(reporter_id.to_string(), Instant::now());
                info!("PFAIL report for {} from {}", node_id, reporter_id);
            }
        }
    }

    /// Marks a node as failed, usually based on a FAIL report from another node.
    pub fn mark_node_as_fail(&self, node_id: &str, reporter_id: &str) {
        if let Some(mut runtime) = self.nodes.get_mut(node_id) {
            let flags = runtime.node_info.get_flags();
            if flags.contains(NodeFlags::FAIL) || flags.contains(NodeFlags::MYSELF) {
                return;
            }
            info!(
                "Received FAIL report for node {} from {}. Marking as FAIL.",
                node_id, reporter_id
            );
            let mut new_flags = flags;
            new_flags.remove(NodeFlags::PFAIL);
            new_flags.insert(NodeFlags::FAIL);
            runtime.node_info.set_flags(new_flags);
        }
    }

    /// Cleans up PFAIL reports older than twice the node timeout.
    pub fn clean_pfail_reports(&self, node_timeout: Duration) {
        let horizon = node_timeout * 2;
        for mut entry in self.nodes.iter_mut() {
            entry
                .value_mut()
                .pfail_reports
                .retain(|_, &mut report_time| report_time.elapsed() < horizon);
        }
    }

    /// Promotes a node from PFAIL to FAIL if a strict majority of online
    /// masters has reported it. A single observer can never cross this line;
    /// that asymmetry-tolerance is what keeps one partitioned node from
    /// declaring the rest of the cluster dead.
    pub fn promote_pfail_to_fail(&self, node_id: &str) -> bool {
        let needed = (self.count_online_masters() / 2) + 1;
        if let Some(mut node) = self.nodes.get_mut(node_id) {
            if node.pfail_reports.len() >= needed {
                if node.node_info.get_flags().contains(NodeFlags::FAIL) {
                    return false;
                }
                info!(
                    "Marking node {} as FAIL ({} reporters, {} needed)",
                    node_id,
                    node.pfail_reports.len(),
                    needed
                );
                let mut flags = node.node_info.get_flags();
                flags.remove(NodeFlags::PFAIL);
                flags.insert(NodeFlags::FAIL);
                node.node_info.set_flags(flags);
                drop(node);
                let _ = self.save_config();
                return true;
            }
        }
        false
    }

    /// Updates this node's role to PRIMARY after winning an election.
    pub fn update_my_role_to_master(&self, new_epoch: u64) {
        if let Some(mut myself) = self.nodes.get_mut(&self.my_id) {
            let mut flags = myself.node_info.get_flags();
            flags.remove(NodeFlags::REPLICA);
            flags.insert(NodeFlags::PRIMARY);
            myself.node_info.set_flags(flags);
            myself.node_info.replica_of = None;
            myself.node_info.config_epoch = new_epoch;
            info!(
                "Node {} promoted to PRIMARY for epoch {}",
                self.my_id, new_epoch
            );
        }
    }

    /// Demotes a node record to replica of the given master. Used after a
    /// failover commit so the old owner rejoins as a replica when it returns.
    pub fn demote_node_to_replica(&self, node_id: &str, new_master_id: &str) {
        if let Some(mut node) = self.nodes.get_mut(node_id) {
            let mut flags = node.node_info.get_flags();
            flags.remove(NodeFlags::PRIMARY);
            flags.insert(NodeFlags::REPLICA);
            node.node_info.set_flags(flags);
            node.node_info.replica_of = Some(new_master_id.to_string());
            node.node_info.slots.clear();
        }
    }

    /// Counts the number of masters currently considered to be online.
    pub fn count_online_masters(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| {
                let flags = n.value().node_info.get_flags();
                flags.contains(NodeFlags::PRIMARY)
                    && !flags.intersects(NodeFlags::FAIL | NodeFlags::PFAIL)
            })
            .count()
    }

    /// Returns the replicas of the given master, as currently known.
    pub fn replicas_of(&self, master_id: &str) -> Vec<ClusterNode> {
        self.nodes
            .iter()
            .filter(|n| n.value().node_info.replica_of.as_deref() == Some(master_id))
            .map(|n| n.value().node_info.clone())
            .collect()
    }

    // --- Anti-entropy merge ---

    /// Merges information about another node received via gossip into our own
    /// state. Per-node records are last-writer-wins, compared by config epoch.
    pub fn merge_node_info(&self, received: ClusterNode) {
        if received.id == self.my_id {
            return;
        }

        if let Some(mut existing) = self.nodes.get_mut(&received.id) {
            let node = &mut existing.node_info;
            if node.config_epoch > received.config_epoch {
                return;
            }
            // Keep our own PFAIL observation; it is local, not gossiped state.
            let pfail_flag = node.get_flags() & NodeFlags::PFAIL;
            node.set_flags(received.get_flags() | pfail_flag);
            node.addr = received.addr.clone();
            node.bus_addr = received.bus_addr.clone();
            node.slots = received.slots.clone();
            node.replica_of = received.replica_of.clone();
            node.config_epoch = received.config_epoch;
            node.replication_offset = received.replication_offset;
            node.migrating_slots = received.migrating_slots.clone();
            node.importing_slots = received.importing_slots.clone();
        } else {
            info!("Discovered new node {} via gossip", received.id);
            self.nodes
                .insert(received.id.clone(), NodeRuntimeState::new(received.clone()));
        }

        // Order matters: the conflict check compares the received claims
        // against the slots we still hold, so it must run before those claims
        // are folded into the slot table.
        self.resolve_ownership_conflict(&received);
        self.adopt_slot_claims(&received);
    }

    /// Updates the slot table for slots the received node claims with a newer
    /// epoch than the currently recorded owner's.
    fn adopt_slot_claims(&self, received: &ClusterNode) {
        for &slot in &received.slots {
            let current_owner = { self.slots_map[slot as usize].read().clone() };
            let should_adopt = match current_owner.as_deref() {
                None => true,
                Some(owner_id) if owner_id == received.id => false,
                Some(owner_id) => self
                    .nodes
                    .get(owner_id)
                    .is_none_or(|o| o.node_info.config_epoch < received.config_epoch),
            };
            if should_adopt {
                if let Some(owner_id) = current_owner
                    && let Some(mut old_owner) = self.nodes.get_mut(&owner_id)
                {
                    old_owner.node_info.slots.remove(&slot);
                }
                *self.slots_map[slot as usize].write() = Some(received.id.clone());
                let observed = self.current_epoch.load(Ordering::Relaxed);
                if received.config_epoch > observed {
                    self.current_epoch
                        .store(received.config_epoch, Ordering::Relaxed);
                }
            }
        }
    }

    /// Handles the case where this primary learns of another primary with a
    /// higher epoch claiming slots we serve: we step down to replica of the
    /// winner rather than splitting the brain.
    fn resolve_ownership_conflict(&self, received: &ClusterNode) {
        if !received.is_primary() {
            return;
        }
        let (i_am_primary, my_epoch, overlap) = {
            let me = self.get_my_config();
            let overlap = me
                .node_info
                .slots
                .iter()
                .any(|s| received.slots.contains(s));
            (
                me.node_info.is_primary(),
                me.node_info.config_epoch,
                overlap,
            )
        };
        if !i_am_primary || received.config_epoch <= my_epoch || !overlap {
            return;
        }

        info!(
            "CONFLICT: node {} claims our slots with higher epoch {} (ours is {}). \
             Stepping down to replica.",
            received.id, received.config_epoch, my_epoch
        );

        if let Some(mut myself) = self.nodes.get_mut(&self.my_id) {
            let mut flags = myself.node_info.get_flags();
            flags.remove(NodeFlags::PRIMARY);
            flags.insert(NodeFlags::REPLICA);
            myself.node_info.set_flags(flags);
            myself.node_info.replica_of = Some(received.id.clone());
            myself.node_info.slots.clear();
        }
        let _ = self.save_config();
    }

    // --- Rebalance planner ---

    /// Computes a minimal-move plan that equalizes per-master slot counts to
    /// within `tolerance`. Greedy: repeatedly reassign one slot from the
    /// most-loaded to the least-loaded master. The plan never removes a slot
    /// without simultaneously naming its new owner, so executing it can never
    /// drop coverage.
    pub fn plan_rebalance(&self, tolerance: usize) -> Vec<SlotMove> {
        let mut loads: BTreeMap<String, Vec<u16>> = BTreeMap::new();
        for entry in self.nodes.iter() {
            let node = &entry.value().node_info;
            if node.is_primary() && !node.get_flags().intersects(NodeFlags::FAIL) {
                loads.insert(node.id.clone(), node.slots.iter().copied().collect());
            }
        }
        if loads.len() < 2 {
            return Vec::new();
        }

        let mut plan = Vec::new();
        loop {
            let (max_id, max_len) = loads
                .iter()
                .max_by_key(|(id, slots)| (slots.len(), std::cmp::Reverse(id.as_str())))
                .map(|(id, slots)| (id.clone(), slots.len()))
                .expect("loads is non-empty");
            let (min_id, min_len) = loads
                .iter()
                .min_by_key(|(id, slots)| (slots.len(), id.as_str()))
                .map(|(id, slots)| (id.clone(), slots.len()))
                .expect("loads is non-empty");

            if max_len.saturating_sub(min_len) <= tolerance {
                break;
            }

            let slot = loads
                .get_mut(&max_id)
                .and_then(|slots| slots.pop())
                .expect("most-loaded master has at least one slot");
            loads
                .get_mut(&min_id)
                .expect("least-loaded master exists")
                .push(slot);
            plan.push(SlotMove {
                slot,
                from: max_id,
                to: min_id,
            });
        }
        plan
    }

    // --- Health & stats ---

    /// Verifies full slot coverage, single ownership per slot, and owner
    /// reachability. Gaps and overlaps are surfaced as issues, never repaired:
    /// auto-repair could silently mask data loss.
    pub fn check_health(&self) -> HealthReport {
        let mut covered = 0usize;
        let mut gap_example = None;
        for slot in 0..NUM_SLOTS {
            if self.slots_map[slot].read().is_some() {
                covered += 1;
            } else if gap_example.is_none() {
                gap_example = Some(slot);
            }
        }

        // Cross-check the per-node claimed sets against each other: two nodes
        // claiming the same slot is an overlap fault even though the flat
        // table can only record one of them.
        let mut claims: HashMap<u16, usize> = HashMap::new();
        for entry in self.nodes.iter() {
            for &slot in &entry.value().node_info.slots {
                *claims.entry(slot).or_default() += 1;
            }
        }
        let overlapping: Vec<u16> = claims
            .iter()
            .filter(|&(_, &count)| count > 1)
            .map(|(&slot, _)| slot)
            .collect();

        let mut online_primaries = 0;
        let mut online_replicas = 0;
        let mut failed_nodes = 0;
        let mut suspected_nodes = 0;
        for entry in self.nodes.iter() {
            let flags = entry.value().node_info.get_flags();
            if flags.contains(NodeFlags::FAIL) {
                failed_nodes += 1;
            } else if flags.contains(NodeFlags::PFAIL) {
                suspected_nodes += 1;
            } else if flags.contains(NodeFlags::PRIMARY) {
                online_primaries += 1;
            } else if flags.contains(NodeFlags::REPLICA) {
                online_replicas += 1;
            }
        }

        let mut issues = Vec::new();
        let mut status = HealthStatus::Ok;

        if failed_nodes > 0 || suspected_nodes > 0 {
            status = HealthStatus::Degraded;
            if failed_nodes > 0 {
                issues.push(format!("{failed_nodes} node(s) confirmed down"));
            }
            if suspected_nodes > 0 {
                issues.push(format!("{suspected_nodes} node(s) suspected down"));
            }
        }
        if covered < NUM_SLOTS {
            status = HealthStatus::Fail;
            issues.push(format!(
                "{} slot(s) not covered (first gap: {})",
                NUM_SLOTS - covered,
                gap_example.unwrap_or_default()
            ));
        }
        if !overlapping.is_empty() {
            status = HealthStatus::Fail;
            issues.push(format!(
                "{} slot(s) claimed by more than one node (e.g. slot {})",
                overlapping.len(),
                overlapping[0]
            ));
        }
        if online_primaries == 0 {
            status = HealthStatus::Fail;
            issues.push("no online primaries".to_string());
        }

        HealthReport {
            status,
            issues,
            covered_slots: covered,
            online_primaries,
            online_replicas,
            failed_nodes,
        }
    }

    /// Per-node slot counts, with this node's key count filled in by the caller.
    pub fn cluster_stats(&self, my_key_count: usize) -> Vec<NodeStats> {
        let mut stats: Vec<NodeStats> = self
            .nodes
            .iter()
            .map(|entry| {
                let node = &entry.value().node_info;
                NodeStats {
                    id: node.id.clone(),
                    addr: node.addr.clone(),
                    role: if node.is_primary() {
                        NodeRole::Primary
                    } else {
                        NodeRole::Replica
                    },
                    slot_count: node.slots.len(),
                    key_count: (node.id == self.my_id).then_some(my_key_count),
                }
            })
            .collect();
        stats.sort_by(|a, b| a.id.cmp(&b.id));
        stats
    }

    /// Slot counters for `CLUSTER INFO`: (assigned, ok, pfail, fail).
    pub fn slot_counters(&self) -> (usize, usize, usize, usize) {
        let mut assigned = 0;
        let mut ok = 0;
        let mut pfail = 0;
        let mut fail = 0;
        for slot in 0..NUM_SLOTS {
            let owner_id = { self.slots_map[slot].read().clone() };
            let Some(owner_id) = owner_id else { continue };
            assigned += 1;
            match self.nodes.get(&owner_id) {
                Some(owner) => {
                    let flags = owner.node_info.get_flags();
                    if flags.contains(NodeFlags::FAIL) {
                        fail += 1;
                    } else if flags.contains(NodeFlags::PFAIL) {
                        pfail += 1;
                    } else {
                        ok += 1;
                    }
                }
                None => fail += 1,
            }
        }
        (assigned, ok, pfail, fail)
    }
}
