// src/core/cluster/events.rs

//! Internal event types used for cross-component signaling inside the cluster
//! layer. The gossip task produces these over a bounded channel; the failover
//! manager consumes them. No component ever reaches into another's locks.

/// Events emitted by the gossip task.
#[derive(Debug, Clone)]
pub enum ClusterEvent {
    /// A primary node crossed the quorum-of-suspicion line and is now
    /// confirmed down. Carries the failed node's run ID.
    PrimaryFailed { node_id: String },
    /// A master acknowledged our failover election for the given epoch.
    VoteReceived { from: String, epoch: u64 },
}

/// The capacity of the cluster event channel. Events beyond this are dropped
/// with a warning; gossip will re-detect a still-failed node on a later round.
pub const CLUSTER_EVENT_CHANNEL_CAPACITY: usize = 128;
