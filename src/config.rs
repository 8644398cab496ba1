//! Compile-time tuning knobs for a mesh node.
//!
//! Collected into one record instead of scattered `#define`s, the way the
//! original firmware's `config.h` groups them, but loaded at construction
//! time rather than baked in at compile time so one process can host nodes
//! with different mesh-ids or allow-lists (useful for tests and simulators).

use crate::ids::NodeId;

/// Upper bound on an accepted frame length, in bytes.
pub const MAX_PACKET_SIZE: usize = 256;

/// Message-type wire tags, see [`crate::packet::PacketType`].
pub const MESSAGE_TYPE_DATA: u8 = 1;
pub const MESSAGE_TYPE_ACK: u8 = 2;
pub const MESSAGE_TYPE_HELLO: u8 = 3;
pub const MESSAGE_TYPE_ALT: u8 = 4;

/// Fixed capacities and tunables for a [`crate::node::MeshNode`].
///
/// Field names and defaults match the `#define`s in `spec.md` §6.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MeshConfig {
    /// 16-bit mesh tag; traffic carrying a different value is discarded.
    pub mesh_id: u16,
    /// Send-jitter lower bound, milliseconds.
    pub initial_wait_lower: u64,
    /// Send-jitter upper bound (exclusive), milliseconds.
    pub initial_wait_upper: u64,
    /// Post-receive perturbation lower bound, milliseconds.
    pub backoff_lower: u64,
    /// Post-receive perturbation upper bound (exclusive), milliseconds.
    pub backoff_upper: u64,
    /// Time to wait for a hop-by-hop ACK before retrying, milliseconds.
    pub ack_timeout: u64,
    /// Maximum retransmissions of a DATA packet awaiting ACK.
    pub max_retries: u8,
    /// Capacity of the pending-ACK table.
    pub max_pending_acks: usize,
    /// Capacity of the transmit queue.
    pub max_queue_size: usize,
    /// Capacity of the neighbor table.
    pub max_neighbors: usize,
    /// Interval between automatic HELLO beacons, milliseconds.
    pub hello_interval_millis: u64,
    /// Silence after which a neighbor is dropped, milliseconds.
    pub neighbor_expiration_time: u64,
    /// Top-K candidates considered for next-hop selection.
    pub routing_max_candidates: usize,
    /// Capacity of the duplicate-message-id ring.
    pub max_duplicate_history: usize,
    /// Capacity of the ACK-replay ring.
    pub ack_replay_window: usize,
    /// TTL for an ACK-replay entry, milliseconds.
    pub ack_replay_ttl_ms: u64,
    /// Cap on alternate-route re-enqueues per message-id.
    pub route_max_alternates: u8,
    /// Capacity of the route-retry ring.
    pub route_history_size: usize,
    /// Cap on ALT transmissions per message-id.
    pub alt_max_per_message: u8,
    /// Capacity of the ALT-suppression ring.
    pub alt_history_size: usize,
    /// Listen-before-talk observation window, milliseconds. Informational:
    /// on real hardware this is how long one [`crate::node::MeshNode::tick`]
    /// call may legitimately block inside `process_irq` polling; it is not
    /// consulted against the injected [`crate::clock::Clock`], which a test
    /// harness does not advance on its own.
    pub listen_window_ms: u64,
    /// Driver polls per LBT observation window.
    pub listen_window_polls: u32,
    /// Maximum consecutive LBT observation windows before sending anyway.
    pub max_window_retries: u8,
    /// TTL stamped on a freshly submitted DATA packet.
    pub initial_ttl: u8,
    /// Optional neighbor whitelist; empty disables filtering.
    pub allowed_neighbors: Vec<NodeId>,
}

impl MeshConfig {
    /// Whether filtering by [`Self::allowed_neighbors`] is active.
    pub fn filters_neighbors(&self) -> bool {
        !self.allowed_neighbors.is_empty()
    }

    /// True if `id` passes the allow-list (always true when the list is empty).
    pub fn is_allowed(&self, id: NodeId) -> bool {
        !self.filters_neighbors() || self.allowed_neighbors.contains(&id)
    }
}

impl Default for MeshConfig {
    fn default() -> Self {
        MeshConfig {
            mesh_id: 0x1234,
            initial_wait_lower: 3_000,
            initial_wait_upper: 7_000,
            backoff_lower: 500,
            backoff_upper: 1_000,
            ack_timeout: 15_000,
            max_retries: 3,
            max_pending_acks: 10,
            max_queue_size: 10,
            max_neighbors: 10,
            hello_interval_millis: 60_000,
            neighbor_expiration_time: 120_000,
            routing_max_candidates: 3,
            max_duplicate_history: 30,
            ack_replay_window: 10,
            ack_replay_ttl_ms: 15_000,
            route_max_alternates: 5,
            route_history_size: 10,
            alt_max_per_message: 1,
            alt_history_size: 30,
            listen_window_ms: 500,
            listen_window_polls: 50,
            max_window_retries: 5,
            initial_ttl: 6,
            allowed_neighbors: Vec::new(),
        }
    }
}
