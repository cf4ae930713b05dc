// src/core/cluster/gossip.rs

//! Implements the cluster gossip protocol for node discovery, state
//! propagation, and failure detection.
//!
//! Each round pings a bounded random subset of peers with a digest of known
//! node records; receivers merge the digest (last-writer-wins by epoch) and
//! answer with their own. A peer that stops answering is first suspected
//! locally (PFAIL) and only confirmed down (FAIL) once a majority of masters
//! shares the suspicion. Confirmed failures of primaries are handed to the
//! failover manager over the cluster event channel.

use crate::core::cluster::events::ClusterEvent;
use crate::core::cluster::failover;
use crate::core::cluster::signing::SignedGossipMessage;
use crate::core::cluster::state::{ClusterNode, NodeFlags, NodeRuntimeState};
use crate::core::state::ServerState;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::net::UdpSocket;
use tokio::sync::{broadcast, mpsc};
use tokio::time;
use tracing::{debug, error, info, warn};

// Constants for the gossip protocol.
const GOSSIP_INTERVAL: Duration = Duration::from_secs(1);
const PROBE_INTERVAL: Duration = Duration::from_millis(100);
const GOSSIP_MAX_NODES_IN_PACKET: usize = 10;
const UDP_BUFFER_SIZE: usize = 65535;

/// The types of messages exchanged over the cluster bus.
#[derive(Serialize, Deserialize, bincode::Encode, bincode::Decode, Debug, Clone)]
pub enum GossipMessage {
    Meet {
        timestamp_ms: u64,
    },
    Ping {
        sender_id: String,
        gossip_nodes: Vec<ClusterNode>,
        timestamp_ms: u64,
    },
    Pong {
        sender_id: String,
        gossip_nodes: Vec<ClusterNode>,
        timestamp_ms: u64,
    },
    FailReport {
        sender_id: String,
        failed_node_id: String,
        timestamp_ms: u64,
    },
    FailoverAuthRequest {
        sender_id: String,
        config_epoch: u64,
        replication_offset: u64,
        timestamp_ms: u64,
    },
    FailoverAuthAck {
        sender_id: String,
        config_epoch: u64,
        timestamp_ms: u64,
    },
}

impl GossipMessage {
    /// Returns the timestamp of the gossip message.
    pub fn timestamp(&self) -> u64 {
        match self {
            GossipMessage::Meet { timestamp_ms }
            | GossipMessage::Ping { timestamp_ms, .. }
            | GossipMessage::Pong { timestamp_ms, .. }
            | GossipMessage::FailReport { timestamp_ms, .. }
            | GossipMessage::FailoverAuthRequest { timestamp_ms, .. }
            | GossipMessage::FailoverAuthAck { timestamp_ms, .. } => *timestamp_ms,
        }
    }
}

/// Messages sent from command handlers to the gossip task.
#[derive(Debug)]
pub enum GossipTaskMessage {
    /// Broadcast a message to all known, reachable nodes.
    Broadcast(GossipMessage),
    /// Send a message to a specific target (used for `CLUSTER MEET`).
    DirectSend {
        message: GossipMessage,
        target: SocketAddr,
    },
}

/// Helper to get the current system time in milliseconds since the UNIX epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// The main entry point for the gossip background task.
pub async fn run(
    state: Arc<ServerState>,
    bus_port: u16,
    mut shutdown_rx: broadcast::Receiver<()>,
    mut gossip_task_rx: mpsc::Receiver<GossipTaskMessage>,
) {
    let addr = format!("0.0.0.0:{bus_port}");
    let socket = match UdpSocket::bind(&addr).await {
        Ok(s) => Arc::new(s),
        Err(e) => {
            error!("Failed to bind cluster bus on UDP port {}: {}", bus_port, e);
            return;
        }
    };
    info!("Cluster bus listening on UDP port {}.", bus_port);

    // Dedicated task for receiving datagrams from other nodes.
    let receiver_state = state.clone();
    let receiver_socket = socket.clone();
    let mut receiver_shutdown = shutdown_rx.resubscribe();
    tokio::spawn(async move {
        let mut buf = [0; UDP_BUFFER_SIZE];
        loop {
            tokio::select! {
                _ = receiver_shutdown.recv() => {
                    debug!("Gossip receiver shutting down.");
                    return;
                }
                result = receiver_socket.recv_from(&mut buf) => {
                    match result {
                        Ok((len, src)) => {
                            receive_datagram(&receiver_state, &receiver_socket, &buf[..len], src)
                                .await;
                        }
                        Err(e) => error!("Error receiving from cluster bus: {}", e),
                    }
                }
            }
        }
    });

    let mut gossip_tick = time::interval(GOSSIP_INTERVAL);
    let mut probe_tick = time::interval(PROBE_INTERVAL);

    // Main loop for the gossip worker.
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                info!("Gossip worker shutting down.");
                return;
            }
            _ = gossip_tick.tick() => {
                send_pings(&state, &socket).await;
            }
            _ = probe_tick.tick() => {
                check_for_failed_nodes(&state, &socket).await;
                check_quorum_and_self_fence(&state).await;
            }
            Some(task_message) = gossip_task_rx.recv() => {
                match task_message {
                    GossipTaskMessage::Broadcast(message) => {
                        broadcast_message(&state, &socket, message).await;
                    }
                    GossipTaskMessage::DirectSend { message, target } => {
                        send_to_target(&state, &socket, message, target).await;
                    }
                }
            }
        }
    }
}

/// Decodes, verifies, and dispatches a single received datagram.
async fn receive_datagram(
    state: &Arc<ServerState>,
    socket: &Arc<UdpSocket>,
    datagram: &[u8],
    src: SocketAddr,
) {
    let (password, node_timeout) = {
        let config = state.config.lock().await;
        (config.password.clone(), config.cluster.node_timeout)
    };

    let signed = match bincode::decode_from_slice::<SignedGossipMessage, _>(
        datagram,
        bincode::config::standard(),
    ) {
        Ok((signed, _)) => signed,
        Err(e) => {
            warn!("Failed to deserialize gossip message from {}: {}", src, e);
            return;
        }
    };

    match signed.verify(&password) {
        Ok(true) => {
            if let Some(cluster) = state.cluster.as_ref() {
                cluster.messages_received.fetch_add(1, Ordering::Relaxed);
            }
            handle_gossip_message(state, signed.message, socket, src, node_timeout).await;
        }
        Ok(false) => {
            warn!(
                "Received gossip message with invalid signature from {}. Ignoring.",
                src
            );
        }
        Err(e) => {
            warn!("Error verifying gossip message signature from {}: {}", src, e);
        }
    }
}

/// Encodes, signs, and sends a message to a single target address.
async fn send_to_target(
    state: &Arc<ServerState>,
    socket: &Arc<UdpSocket>,
    message: GossipMessage,
    target: SocketAddr,
) {
    let password = state.config.lock().await.password.clone();
    let Ok(signed) = SignedGossipMessage::new(message, &password) else {
        error!("Failed to sign gossip message");
        return;
    };
    let Ok(encoded) = bincode::encode_to_vec(&signed, bincode::config::standard()) else {
        error!("Failed to serialize gossip message");
        return;
    };
    if let Err(e) = socket.send_to(&encoded, &target).await {
        // Transient send failures are logged and absorbed; the failure
        // detector is the only path allowed to escalate an unreachable peer.
        warn!("Failed to send gossip message to {}: {}", target, e);
    } else if let Some(cluster) = state.cluster.as_ref() {
        cluster.messages_sent.fetch_add(1, Ordering::Relaxed);
    }
}

/// Broadcasts a gossip message to all other known, reachable nodes.
async fn broadcast_message(state: &Arc<ServerState>, socket: &Arc<UdpSocket>, msg: GossipMessage) {
    let Some(cluster) = state.cluster.as_ref() else {
        return;
    };
    let targets: Vec<String> = cluster
        .nodes
        .iter()
        .filter(|entry| {
            !entry
                .value()
                .node_info
                .get_flags()
                .intersects(NodeFlags::MYSELF | NodeFlags::FAIL | NodeFlags::HANDSHAKE)
        })
        .map(|entry| entry.value().node_info.bus_addr.clone())
        .collect();

    for bus_addr in targets {
        match bus_addr.parse::<SocketAddr>() {
            Ok(target) => send_to_target(state, socket, msg.clone(), target).await,
            Err(e) => warn!("Could not parse bus address '{}': {}", bus_addr, e),
        }
    }
}

/// Selects the peers to ping this round: a random half of the known nodes
/// (at least one), so per-round traffic stays bounded while every peer is
/// still probed with high frequency in expectation.
fn choose_nodes_to_ping(state: &Arc<ServerState>) -> Vec<NodeRuntimeState> {
    let Some(cluster) = state.cluster.as_ref() else {
        return vec![];
    };
    let nodes: Vec<_> = cluster
        .nodes
        .iter()
        .filter(|node| {
            node.key() != &cluster.my_id
                && !node
                    .value()
                    .node_info
                    .get_flags()
                    .contains(NodeFlags::HANDSHAKE)
        })
        .map(|node| node.value().clone())
        .collect();

    if nodes.is_empty() {
        return vec![];
    }

    let mut rng = rand::thread_rng();
    let sample_size = (nodes.len() / 2).max(1);
    nodes
        .choose_multiple(&mut rng, sample_size)
        .cloned()
        .collect()
}

async fn send_pings(state: &Arc<ServerState>, socket: &Arc<UdpSocket>) {
    let Some(cluster) = state.cluster.as_ref() else {
        return;
    };

    // Refresh our own replication progress marker before gossiping it out;
    // failover elections compare these to pick the most caught-up replica.
    let my_offset = state.replication_offset.load(Ordering::Relaxed);
    if let Some(mut myself) = cluster.nodes.get_mut(&cluster.my_id) {
        myself.value_mut().node_info.replication_offset = my_offset;
    }

    for runtime_state in choose_nodes_to_ping(state) {
        let ping = GossipMessage::Ping {
            sender_id: cluster.my_id.clone(),
            gossip_nodes: select_nodes_for_gossip(state),
            timestamp_ms: now_ms(),
        };
        let Ok(target) = runtime_state.node_info.bus_addr.parse::<SocketAddr>() else {
            warn!(
                "Skipping ping to {}: bad bus address '{}'",
                runtime_state.node_info.id, runtime_state.node_info.bus_addr
            );
            continue;
        };
        send_to_target(state, socket, ping, target).await;
        debug!("Sent PING to {}", runtime_state.node_info.bus_addr);
        if let Some(mut entry) = cluster.nodes.get_mut(&runtime_state.node_info.id) {
            entry.ping_sent = Some(Instant::now());
        }
    }
}

/// Walks the node table looking for peers that stopped answering.
/// A silent peer is marked PFAIL from our own observation; it is promoted to
/// FAIL only once a majority of online masters has independently reported it,
/// at which point the failure is broadcast and (for primaries) handed to the
/// failover manager.
async fn check_for_failed_nodes(state: &Arc<ServerState>, socket: &Arc<UdpSocket>) {
    let Some(cluster) = state.cluster.as_ref() else {
        return;
    };
    let node_timeout = {
        let config = state.config.lock().await;
        Duration::from_millis(config.cluster.node_timeout)
    };

    cluster.clean_pfail_reports(node_timeout);

    let node_ids: Vec<String> = cluster.nodes.iter().map(|e| e.key().clone()).collect();
    for node_id in node_ids {
        let flags = {
            let Some(mut entry) = cluster.nodes.get_mut(&node_id) else {
                continue;
            };
            let runtime_state = entry.value_mut();
            let flags = runtime_state.node_info.get_flags();
            if flags.intersects(NodeFlags::MYSELF | NodeFlags::HANDSHAKE | NodeFlags::FAIL) {
                continue;
            }

            if let Some(pong_time) = runtime_state.pong_received
                && pong_time.elapsed() > node_timeout
                && !flags.contains(NodeFlags::PFAIL)
            {
                info!("Marking node {} as PFAIL (no PONG received)", node_id);
                let mut new_flags = flags;
                new_flags.insert(NodeFlags::PFAIL);
                runtime_state.node_info.set_flags(new_flags);
                // Record our own suspicion alongside the gossiped ones.
                runtime_state
                    .pfail_reports
                    .insert(cluster.my_id.clone(), Instant::now());
            }
            runtime_state.node_info.get_flags()
        };

        if flags.contains(NodeFlags::PFAIL) && cluster.promote_pfail_to_fail(&node_id) {
            info!("Broadcasting FAIL report for node {}", node_id);
            let report = GossipMessage::FailReport {
                sender_id: cluster.my_id.clone(),
                failed_node_id: node_id.clone(),
                timestamp_ms: now_ms(),
            };
            broadcast_message(state, socket, report).await;
            notify_if_primary_failed(state, &node_id);
        }
    }
}

/// Emits a `PrimaryFailed` event when a confirmed-down node is a primary.
fn notify_if_primary_failed(state: &Arc<ServerState>, node_id: &str) {
    let Some(cluster) = state.cluster.as_ref() else {
        return;
    };
    let is_primary = cluster
        .nodes
        .get(node_id)
        .is_some_and(|n| n.node_info.is_primary());
    if !is_primary {
        return;
    }
    let event = ClusterEvent::PrimaryFailed {
        node_id: node_id.to_string(),
    };
    if let Err(e) = state.cluster_events_tx.try_send(event) {
        warn!(
            "Cluster event channel full; dropping PrimaryFailed for {}: {}",
            node_id, e
        );
    }
}

/// Periodically checks if this master node can still see a quorum of other
/// masters. If not, it puts itself into a read-only state to prevent
/// split-brain writes on the minority side of a partition.
async fn check_quorum_and_self_fence(state: &Arc<ServerState>) {
    let Some(cluster) = state.cluster.as_ref() else {
        return;
    };

    if !cluster.get_my_config().node_info.is_primary() {
        if state
            .is_read_only_due_to_quorum_loss
            .load(Ordering::Relaxed)
        {
            state.set_quorum_loss_read_only(false, "Node is now a replica.");
        }
        return;
    }

    let quorum = state.config.lock().await.cluster.failover_quorum;
    let online_masters = cluster.count_online_masters();
    let currently_fenced = state
        .is_read_only_due_to_quorum_loss
        .load(Ordering::Relaxed);

    if online_masters < quorum && !currently_fenced {
        let reason = format!(
            "Lost contact with cluster majority. Can only see {online_masters}/{quorum} masters."
        );
        state.set_quorum_loss_read_only(true, &reason);
    } else if online_masters >= quorum && currently_fenced {
        let reason = format!(
            "Re-established contact with cluster majority. Can see {online_masters}/{quorum} masters."
        );
        state.set_quorum_loss_read_only(false, &reason);
    }
}

async fn handle_gossip_message(
    state: &Arc<ServerState>,
    msg: GossipMessage,
    socket: &Arc<UdpSocket>,
    src_addr: SocketAddr,
    node_timeout: u64,
) {
    let Some(cluster) = state.cluster.as_ref() else {
        return;
    };

    // Drop messages whose timestamp is too far from our clock in either
    // direction; replaying old signed packets must not perturb the state.
    let time_window = Duration::from_millis(node_timeout * 2).as_millis();
    let now = now_ms();
    let msg_ts = msg.timestamp();
    if now.saturating_sub(msg_ts) as u128 > time_window
        || msg_ts.saturating_sub(now) as u128 > time_window
    {
        warn!(
            "Dropping stale gossip message from {}: message ts={}, now={}",
            src_addr, msg_ts, now
        );
        return;
    }

    debug!("Handling verified gossip message from {}", src_addr);

    match msg {
        GossipMessage::Meet { .. } => {
            // Answer a handshake with a full Ping so the new node learns our
            // identity and digest, then folds into the normal rounds.
            let ping = GossipMessage::Ping {
                sender_id: cluster.my_id.clone(),
                gossip_nodes: select_nodes_for_gossip(state),
                timestamp_ms: now_ms(),
            };
            send_to_target(state, socket, ping, src_addr).await;
        }
        GossipMessage::Ping {
            sender_id,
            gossip_nodes,
            ..
        } => {
            let known_sender = cluster.nodes.contains_key(&sender_id);
            merge_digest(cluster, &sender_id, gossip_nodes);
            if known_sender {
                let reply_addr = cluster
                    .nodes
                    .get(&sender_id)
                    .and_then(|n| n.node_info.bus_addr.parse::<SocketAddr>().ok())
                    .unwrap_or(src_addr);
                let pong = GossipMessage::Pong {
                    sender_id: cluster.my_id.clone(),
                    gossip_nodes: select_nodes_for_gossip(state),
                    timestamp_ms: now_ms(),
                };
                send_to_target(state, socket, pong, reply_addr).await;
            } else {
                // An unknown pinger: respond with MEET semantics so both sides
                // converge on each other's records.
                warn!(
                    "Received PING from unknown node ID {}. Responding with MEET logic.",
                    sender_id
                );
                let ping = GossipMessage::Ping {
                    sender_id: cluster.my_id.clone(),
                    gossip_nodes: select_nodes_for_gossip(state),
                    timestamp_ms: now_ms(),
                };
                send_to_target(state, socket, ping, src_addr).await;
            }
        }
        GossipMessage::Pong {
            sender_id,
            gossip_nodes,
            ..
        } => {
            if let Some(mut sender) = cluster.nodes.get_mut(&sender_id) {
                sender.pong_received = Some(Instant::now());
                sender.pfail_reports.clear();
                let flags = sender.node_info.get_flags();
                if flags.intersects(NodeFlags::PFAIL | NodeFlags::FAIL) {
                    info!("Node {} is back online. Clearing failure flags.", sender_id);
                    let mut new_flags = flags;
                    new_flags.remove(NodeFlags::PFAIL | NodeFlags::FAIL);
                    sender.node_info.set_flags(new_flags);
                }
            }
            merge_digest(cluster, &sender_id, gossip_nodes);
        }
        GossipMessage::FailReport {
            sender_id,
            failed_node_id,
            ..
        } => {
            cluster.mark_node_as_fail(&failed_node_id, &sender_id);
            notify_if_primary_failed(state, &failed_node_id);
        }
        GossipMessage::FailoverAuthRequest {
            sender_id,
            config_epoch,
            replication_offset,
            ..
        } => {
            failover::handle_auth_request(state, socket, sender_id, config_epoch, replication_offset)
                .await;
        }
        GossipMessage::FailoverAuthAck {
            sender_id,
            config_epoch,
            ..
        } => {
            let event = ClusterEvent::VoteReceived {
                from: sender_id,
                epoch: config_epoch,
            };
            if let Err(e) = state.cluster_events_tx.try_send(event) {
                warn!("Cluster event channel full; dropping failover vote: {}", e);
            }
        }
    }
}

/// Folds a received membership digest into local state. Besides the
/// last-writer-wins record merge, a sender gossiping a node as suspected or
/// failed counts as that sender's PFAIL report; this is how one node learns
/// that a quorum of masters shares its suspicion.
fn merge_digest(
    cluster: &Arc<crate::core::cluster::state::ClusterState>,
    sender_id: &str,
    gossip_nodes: Vec<ClusterNode>,
) {
    for received in gossip_nodes {
        let suspected = received
            .get_flags()
            .intersects(NodeFlags::PFAIL | NodeFlags::FAIL);
        let node_id = received.id.clone();
        cluster.merge_node_info(received);
        if suspected && node_id != sender_id {
            cluster.mark_node_as_pfail(&node_id, sender_id);
        }
    }
}

/// Picks a bounded random sample of node records to include in a packet.
fn select_nodes_for_gossip(state: &Arc<ServerState>) -> Vec<ClusterNode> {
    let Some(cluster) = state.cluster.as_ref() else {
        return vec![];
    };
    let mut nodes_to_gossip: Vec<ClusterNode> = cluster
        .nodes
        .iter()
        .map(|entry| entry.value().node_info.clone())
        .collect();

    let mut rng = rand::thread_rng();
    nodes_to_gossip.shuffle(&mut rng);
    nodes_to_gossip.truncate(GOSSIP_MAX_NODES_IN_PACKET);
    nodes_to_gossip
}
