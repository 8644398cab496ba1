//! Neighbor table: tracks heard neighbors with RSSI and freshness, and picks
//! next hops for forwarding.

use rand::RngCore;

use crate::config::MeshConfig;
use crate::ids::NodeId;

/// One heard neighbor. `id == NodeId::UNSET` marks an empty slot.
#[derive(Debug, Clone, Copy, Default)]
struct Slot {
    id: NodeId,
    rssi: i16,
    last_heard: u64,
}

/// Fixed-capacity, unordered table of heard neighbors.
#[derive(Debug)]
pub struct NeighborTable {
    slots: Vec<Slot>,
}

impl NeighborTable {
    pub fn new(capacity: usize) -> Self {
        NeighborTable {
            slots: vec![Slot::default(); capacity],
        }
    }

    /// Insert or refresh a neighbor's RSSI and last-heard time. Drops the
    /// update (log-only) if the table is full and `id` is not already present.
    pub fn add_or_update(&mut self, id: NodeId, rssi: i16, now: u64) {
        if id.is_unset() {
            return;
        }
        if let Some(slot) = self.slots.iter_mut().find(|s| s.id == id) {
            slot.rssi = rssi;
            slot.last_heard = now;
            return;
        }
        if let Some(slot) = self.slots.iter_mut().find(|s| s.id.is_unset()) {
            slot.id = id;
            slot.rssi = rssi;
            slot.last_heard = now;
            return;
        }
        log::warn!("neighbor table full, dropping update for {id}");
    }

    /// Evict any neighbor silent for longer than `expiration_ms`.
    pub fn cleanup(&mut self, now: u64, expiration_ms: u64) {
        for slot in self.slots.iter_mut() {
            if !slot.id.is_unset() && now.wrapping_sub(slot.last_heard) > expiration_ms {
                log::info!("dropping neighbor {} for inactivity", slot.id);
                *slot = Slot::default();
            }
        }
    }

    /// Explicitly evict a neighbor, e.g. after repeated ACK-timeout failures.
    pub fn remove(&mut self, id: NodeId) {
        if let Some(slot) = self.slots.iter_mut().find(|s| s.id == id) {
            log::info!("removing neighbor {id}");
            *slot = Slot::default();
        }
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.slots.iter().any(|s| s.id == id)
    }

    fn score(rssi: i16, last_heard: u64, now: u64) -> f32 {
        let secs_ago = now.wrapping_sub(last_heard) as f32 / 1000.0;
        rssi as f32 - secs_ago
    }

    /// Select a next hop toward `dest`, excluding `local`, `exclude`, and
    /// anything filtered by `config`'s allow-list. Direct delivery short
    /// circuits: if `dest` itself is a known neighbor, it is returned
    /// verbatim. Otherwise the top-K candidates by score are gathered and
    /// one is chosen uniformly at random to spread load.
    pub fn get_next_hop(
        &self,
        local: NodeId,
        dest: NodeId,
        exclude: NodeId,
        config: &MeshConfig,
        now: u64,
        rng: &mut impl RngCore,
    ) -> NodeId {
        if self.contains(dest) {
            return dest;
        }

        let mut candidates: Vec<(NodeId, f32)> = self
            .slots
            .iter()
            .filter(|s| !s.id.is_unset())
            .filter(|s| s.id != local && s.id != exclude)
            .filter(|s| config.is_allowed(s.id))
            .map(|s| (s.id, Self::score(s.rssi, s.last_heard, now)))
            .collect();

        if candidates.is_empty() {
            return NodeId::INVALID;
        }

        candidates.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(core::cmp::Ordering::Equal));
        let top_k = config.routing_max_candidates.min(candidates.len());
        let chosen = (rng.next_u32() as usize) % top_k;
        candidates[chosen].0
    }
}
