//! Pending-ACK table: outbound DATA awaiting its next-hop's acknowledgement,
//! with retry bookkeeping.

use crate::history::DuplicateHistory;
use crate::ids::MessageId;
use crate::packet::DataPacket;

#[derive(Debug, Clone, Copy)]
struct Slot {
    packet: DataPacket,
    /// Zero means the slot is free.
    timestamp: u64,
    retry_count: u8,
}

/// Retry decision produced by [`PendingAckTable::poll_retries`] for one slot.
/// Slots still within `ack_timeout` produce nothing and are simply skipped.
pub enum RetryOutcome {
    /// Timed out but retries remain: re-send the same packet.
    Retry(DataPacket),
    /// Retries exhausted: the slot was freed, reroute around `next_hop`.
    Exhausted(DataPacket),
}

#[derive(Debug)]
pub struct PendingAckTable {
    slots: Vec<Option<Slot>>,
}

impl PendingAckTable {
    pub fn new(capacity: usize) -> Self {
        PendingAckTable {
            slots: vec![None; capacity],
        }
    }

    /// Track `packet` as awaiting ACK. Idempotent: re-adding the same
    /// message-id just refreshes its timestamp. Logs and discards on
    /// overflow — the spec allows the packet to still be sent untracked.
    pub fn add(&mut self, packet: DataPacket, now: u64) {
        if let Some(slot) = self
            .slots
            .iter_mut()
            .flatten()
            .find(|s| s.packet.message_id == packet.message_id)
        {
            slot.timestamp = now;
            return;
        }
        if let Some(free) = self.slots.iter_mut().find(|s| s.is_none()) {
            *free = Some(Slot {
                packet,
                timestamp: now,
                retry_count: 0,
            });
            return;
        }
        log::warn!(
            "pending-ack table full, {} will be sent untracked",
            packet.message_id
        );
    }

    /// Clear the slot matching `id` (an ACK arrived), returning the
    /// original packet, and commit `id` to `duplicates` so a forwarder
    /// that is also the originator does not re-process it.
    pub fn ack(&mut self, id: MessageId, duplicates: &mut DuplicateHistory) -> Option<DataPacket> {
        let slot = self
            .slots
            .iter_mut()
            .find(|s| matches!(s, Some(inner) if inner.packet.message_id == id))?;
        let packet = slot.take().map(|inner| inner.packet);
        duplicates.record(id);
        packet
    }

    pub fn contains(&self, id: MessageId) -> bool {
        self.slots
            .iter()
            .flatten()
            .any(|s| s.packet.message_id == id)
    }

    /// Remove the tracked DATA for `id`, if any, without touching history.
    /// Used when an ALT hint makes the original attempt moot.
    pub fn take(&mut self, id: MessageId) -> Option<DataPacket> {
        let slot = self
            .slots
            .iter_mut()
            .find(|s| matches!(s, Some(inner) if inner.packet.message_id == id))?;
        slot.take().map(|inner| inner.packet)
    }

    /// Drive retry/timeout bookkeeping for every tracked slot.
    pub fn poll_retries(
        &mut self,
        now: u64,
        ack_timeout: u64,
        max_retries: u8,
    ) -> Vec<RetryOutcome> {
        let mut outcomes = Vec::new();
        for slot in self.slots.iter_mut() {
            let Some(inner) = slot else { continue };
            if now.wrapping_sub(inner.timestamp) < ack_timeout {
                continue;
            }
            if inner.retry_count < max_retries {
                inner.retry_count += 1;
                inner.timestamp = now;
                outcomes.push(RetryOutcome::Retry(inner.packet));
            } else {
                let packet = inner.packet;
                *slot = None;
                outcomes.push(RetryOutcome::Exhausted(packet));
            }
        }
        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::NodeId;

    fn packet(message_id: u32) -> DataPacket {
        DataPacket {
            mesh_id: 1,
            message_id: MessageId(message_id),
            origin: NodeId(1),
            destination: NodeId(2),
            next_hop: NodeId(3),
            extra: 0,
            ttl: 6,
            payload: 0,
        }
    }

    #[test]
    fn add_then_ack_clears_slot_and_commits_duplicate_history() {
        let mut table = PendingAckTable::new(2);
        let mut duplicates = DuplicateHistory::new(4);
        table.add(packet(1), 0);
        assert!(table.contains(MessageId(1)));
        let acked = table.ack(MessageId(1), &mut duplicates);
        assert!(acked.is_some());
        assert!(!table.contains(MessageId(1)));
        assert!(duplicates.contains(MessageId(1)));
    }

    #[test]
    fn re_adding_same_message_id_is_idempotent() {
        let mut table = PendingAckTable::new(2);
        table.add(packet(1), 0);
        table.add(packet(1), 500);
        let outcomes = table.poll_retries(500, 1_000, 3);
        assert!(outcomes.is_empty());
    }

    #[test]
    fn retries_until_exhausted() {
        let mut table = PendingAckTable::new(2);
        table.add(packet(1), 0);
        for expected_retry in 1..=3u8 {
            let outcomes = table.poll_retries(15_000 * expected_retry as u64, 15_000, 3);
            assert!(matches!(outcomes.as_slice(), [RetryOutcome::Retry(_)]));
        }
        let outcomes = table.poll_retries(15_000 * 4, 15_000, 3);
        assert!(matches!(outcomes.as_slice(), [RetryOutcome::Exhausted(_)]));
        assert!(!table.contains(MessageId(1)));
    }
}
