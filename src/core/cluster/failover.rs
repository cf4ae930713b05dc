// src/core/cluster/failover.rs

//! Implements quorum-gated failover of a failed primary to one of its replicas.
//!
//! The `FailoverManager` runs as a dedicated task. It is driven by two inputs:
//! confirmed-failure events from the gossip layer, and explicit requests from
//! the `CLUSTER FAILOVER` command. An external monitoring process goes through
//! the same request channel as the command and is subject to the identical
//! quorum gating; there is no privileged bypass.
//!
//! Election: among the failed master's replicas, the candidate with the most
//! advanced replication offset wins, ties broken by lowest node ID. The winner
//! proposes `current_epoch + 1` and collects votes from the known masters over
//! the gossip bus. Ownership flips only after a strict majority acknowledges;
//! until then the failed master's slots stay where they are, degraded but
//! unambiguous. `TAKEOVER` is the operator's explicit escape hatch that skips
//! the vote entirely, accepting split-brain risk.

use crate::core::ZirconError;
use crate::core::cluster::events::ClusterEvent;
use crate::core::cluster::gossip::{GossipMessage, GossipTaskMessage, now_ms};
use crate::core::cluster::signing::SignedGossipMessage;
use crate::core::cluster::state::{ClusterState, NodeFlags};
use crate::core::state::ServerState;
use rand::Rng;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{info, warn};

/// The base delay before a replica starts an automatic election. A random
/// jitter is added so replicas of the same master do not all campaign at once.
const FAILOVER_BASE_DELAY_MS: u64 = 500;

/// How long an election waits for master acknowledgements before giving up
/// with a quorum error.
const ELECTION_TIMEOUT: Duration = Duration::from_secs(5);

/// How a failover was requested, mirroring `CLUSTER FAILOVER [FORCE|TAKEOVER]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailoverMode {
    /// Default: require the replica to be caught up, then wait for quorum.
    Graceful,
    /// Skip the caught-up check, but still wait for quorum.
    Force,
    /// Skip the quorum wait entirely. Operator accepts split-brain risk.
    Takeover,
}

/// A manual failover request, answered with the committed epoch on success.
#[derive(Debug)]
pub struct FailoverRequest {
    pub mode: FailoverMode,
    pub reply: oneshot::Sender<Result<u64, ZirconError>>,
}

/// The long-running failover coordination task.
pub struct FailoverManager {
    state: Arc<ServerState>,
    events_rx: mpsc::Receiver<ClusterEvent>,
    requests_rx: mpsc::Receiver<FailoverRequest>,
}

impl FailoverManager {
    pub fn new(
        state: Arc<ServerState>,
        events_rx: mpsc::Receiver<ClusterEvent>,
        requests_rx: mpsc::Receiver<FailoverRequest>,
    ) -> Self {
        Self {
            state,
            events_rx,
            requests_rx,
        }
    }

    pub async fn run(mut self, mut shutdown_rx: broadcast::Receiver<()>) {
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Failover manager shutting down.");
                    return;
                }
                Some(event) = self.events_rx.recv() => {
                    if let ClusterEvent::PrimaryFailed { node_id } = event {
                        self.handle_primary_failure(&node_id).await;
                    }
                    // A vote arriving outside an election is stale; ignore it.
                }
                Some(request) = self.requests_rx.recv() => {
                    let result = self.handle_manual_failover(request.mode).await;
                    let _ = request.reply.send(result);
                }
            }
        }
    }

    /// Reacts to a gossip-confirmed primary failure. Only the best-placed
    /// replica of the failed master campaigns; the others stand down and rely
    /// on learning the result through gossip.
    async fn handle_primary_failure(&mut self, failed_id: &str) {
        let Some(cluster) = self.state.cluster.clone() else {
            return;
        };

        let my_master = cluster.get_my_config().node_info.replica_of.clone();
        if my_master.as_deref() != Some(failed_id) {
            return;
        }

        let my_offset = self.state.replication_offset.load(Ordering::Relaxed);
        if let Some(better) = best_candidate_other_than(&cluster, failed_id, &cluster.my_id, my_offset)
        {
            info!(
                "Standing down from election for {}: node {} is a better candidate.",
                failed_id, better
            );
            return;
        }

        // Desynchronize competing candidates and give the master a last chance
        // to come back before campaigning.
        let jitter = rand::thread_rng().gen_range(0..=FAILOVER_BASE_DELAY_MS);
        tokio::time::sleep(Duration::from_millis(FAILOVER_BASE_DELAY_MS + jitter)).await;

        if let Some(master) = cluster.nodes.get(failed_id)
            && !master
                .node_info
                .get_flags()
                .intersects(NodeFlags::FAIL | NodeFlags::PFAIL)
        {
            info!("Master {} is back online. Aborting election.", failed_id);
            return;
        }

        match self.run_election(failed_id).await {
            Ok(epoch) => info!(
                "Automatic failover of {} committed at epoch {}.",
                failed_id, epoch
            ),
            Err(e) => warn!("Automatic failover of {} failed: {}", failed_id, e),
        }
    }

    /// Handles `CLUSTER FAILOVER [FORCE|TAKEOVER]`, issued on a replica.
    async fn handle_manual_failover(&mut self, mode: FailoverMode) -> Result<u64, ZirconError> {
        let Some(cluster) = self.state.cluster.clone() else {
            return Err(ZirconError::InvalidState(
                "Cluster mode is not enabled.".into(),
            ));
        };

        let master_id = cluster
            .get_my_config()
            .node_info
            .replica_of
            .clone()
            .ok_or_else(|| {
                ZirconError::InvalidState(
                    "FAILOVER can only be issued on a replica of a known master".into(),
                )
            })?;

        if mode == FailoverMode::Graceful {
            let my_offset = self.state.replication_offset.load(Ordering::Relaxed);
            let master_offset = cluster
                .nodes
                .get(&master_id)
                .map(|m| m.node_info.replication_offset)
                .unwrap_or(0);
            if my_offset < master_offset {
                return Err(ZirconError::InvalidState(format!(
                    "Replica is behind its master ({my_offset} < {master_offset}); \
                     use FAILOVER FORCE to override"
                )));
            }
        }

        if mode == FailoverMode::Takeover {
            let epoch = cluster.next_epoch();
            info!(
                "TAKEOVER requested: promoting without quorum at epoch {}.",
                epoch
            );
            return self.promote(&cluster, &master_id, epoch);
        }

        self.run_election(&master_id).await
    }

    /// Runs one quorum-gated election against the masters of the cluster.
    async fn run_election(&mut self, old_master_id: &str) -> Result<u64, ZirconError> {
        let cluster = self
            .state
            .cluster
            .clone()
            .ok_or_else(|| ZirconError::InvalidState("Cluster mode is not enabled.".into()))?;

        let epoch = cluster.next_epoch();
        let my_offset = self.state.replication_offset.load(Ordering::Relaxed);
        cluster.failover_auth_epoch.store(epoch, Ordering::Relaxed);
        cluster.failover_auth_count.store(0, Ordering::Relaxed);
        cluster.failover_auth_time.store(now_ms(), Ordering::Relaxed);

        let needed = (cluster.count_online_masters() / 2) + 1;
        info!(
            "Starting election for epoch {} (offset {}, {} ack(s) needed).",
            epoch, my_offset, needed
        );

        let request = GossipMessage::FailoverAuthRequest {
            sender_id: cluster.my_id.clone(),
            config_epoch: epoch,
            replication_offset: my_offset,
            timestamp_ms: now_ms(),
        };
        self.state
            .cluster_gossip_tx
            .send(GossipTaskMessage::Broadcast(request))
            .await
            .map_err(|_| ZirconError::Internal("Gossip task is not running".into()))?;

        // Collect votes off the event channel until quorum or timeout.
        let deadline = Instant::now() + ELECTION_TIMEOUT;
        let mut votes = 0usize;
        while votes < needed {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match tokio::time::timeout(remaining, self.events_rx.recv()).await {
                Ok(Some(ClusterEvent::VoteReceived { from, epoch: e })) if e == epoch => {
                    votes += 1;
                    cluster.failover_auth_count.store(votes as u64, Ordering::Relaxed);
                    info!("Received vote from {}. Total votes: {}/{}", from, votes, needed);
                }
                Ok(Some(_)) => {} // unrelated event while electing
                Ok(None) => break,
                Err(_) => break, // timeout
            }
        }

        if votes < needed {
            return Err(ZirconError::QuorumNotReached(format!(
                "election for epoch {epoch} got {votes}/{needed} acks; \
                 ownership left unchanged"
            )));
        }

        info!("Won the election with {} votes. Promoting to master.", votes);
        self.promote(&cluster, old_master_id, epoch)
    }

    /// Commits the failover: flips ownership of every slot of the old master
    /// to this node under the election epoch, updates roles, and lets gossip
    /// disseminate the new configuration.
    fn promote(
        &self,
        cluster: &Arc<ClusterState>,
        old_master_id: &str,
        epoch: u64,
    ) -> Result<u64, ZirconError> {
        let slots: Vec<u16> = cluster
            .nodes
            .get(old_master_id)
            .map(|m| m.node_info.slots.iter().copied().collect())
            .unwrap_or_default();

        if !slots.is_empty() {
            cluster.apply_ownership_change(&slots, &cluster.my_id.clone(), epoch)?;
        }
        cluster.update_my_role_to_master(epoch);
        cluster.demote_node_to_replica(old_master_id, &cluster.my_id.clone());
        if let Err(e) = cluster.save_config() {
            warn!("Failed to persist cluster config after promotion: {e}");
        }
        Ok(epoch)
    }
}

/// Returns a replica of `master_id` (other than `my_id`) that outranks the
/// given offset: a strictly higher replication offset, or an equal offset with
/// a lower node ID. `None` means we are the rightful candidate.
fn best_candidate_other_than(
    cluster: &Arc<ClusterState>,
    master_id: &str,
    my_id: &str,
    my_offset: u64,
) -> Option<String> {
    cluster
        .replicas_of(master_id)
        .into_iter()
        .filter(|node| node.id != my_id && !node.get_flags().contains(NodeFlags::FAIL))
        .find(|node| {
            node.replication_offset > my_offset
                || (node.replication_offset == my_offset && node.id.as_str() < my_id)
        })
        .map(|node| node.id)
}

/// Handles a vote request from a campaigning replica. Runs on the masters.
///
/// A master votes at most once per epoch, and refuses candidates whose
/// replication offset is behind the failed master's last known offset.
pub async fn handle_auth_request(
    state: &Arc<ServerState>,
    socket: &Arc<UdpSocket>,
    candidate_id: String,
    candidate_epoch: u64,
    candidate_offset: u64,
) {
    let Some(cluster) = state.cluster.as_ref() else {
        return;
    };
    if !cluster.get_my_config().node_info.is_primary() {
        return;
    }

    let last_vote_epoch = cluster.last_vote_epoch.load(Ordering::Relaxed);
    if candidate_epoch <= last_vote_epoch {
        warn!(
            "Rejecting stale vote request from {} for epoch {} (last vote was for epoch {})",
            candidate_id, candidate_epoch, last_vote_epoch
        );
        return;
    }

    let candidate_bus_addr = {
        let Some(candidate) = cluster.nodes.get(&candidate_id) else {
            warn!("Vote request from unknown node {}; ignoring.", candidate_id);
            return;
        };
        if let Some(failed_master_id) = &candidate.node_info.replica_of
            && let Some(failed_master) = cluster.nodes.get(failed_master_id)
        {
            let master_offset = failed_master.node_info.replication_offset;
            if candidate_offset < master_offset {
                warn!(
                    "Rejecting vote for {}: candidate offset ({}) is older than last known \
                     master offset ({}).",
                    candidate_id, candidate_offset, master_offset
                );
                return;
            }
        }
        candidate.node_info.bus_addr.clone()
    };

    cluster
        .last_vote_epoch
        .store(candidate_epoch, Ordering::Relaxed);
    info!("Voting for node {} in epoch {}", candidate_id, candidate_epoch);

    let password = state.config.lock().await.password.clone();
    let ack = GossipMessage::FailoverAuthAck {
        sender_id: cluster.my_id.clone(),
        config_epoch: candidate_epoch,
        timestamp_ms: now_ms(),
    };
    let Ok(signed) = SignedGossipMessage::new(ack, &password) else {
        warn!("Failed to sign failover ack");
        return;
    };
    let Ok(encoded) = bincode::encode_to_vec(&signed, bincode::config::standard()) else {
        warn!("Failed to encode failover ack");
        return;
    };
    let Ok(target) = candidate_bus_addr.parse::<SocketAddr>() else {
        warn!("Bad candidate bus address '{}'", candidate_bus_addr);
        return;
    };
    let _ = socket.send_to(&encoded, &target).await;
}
