//! ACK-replay window: remembers which message-ids this node has recently
//! ACKed, so a retransmitted DATA whose ACK was lost gets a fresh ACK
//! instead of an ALT. Presence is bounded by both ring capacity and a TTL.

use crate::ids::MessageId;

#[derive(Debug, Clone, Copy)]
struct Entry {
    id: MessageId,
    sent_at: u64,
}

#[derive(Debug)]
pub struct AckReplayHistory {
    ring: Vec<Option<Entry>>,
    write_index: usize,
    ttl_ms: u64,
}

impl AckReplayHistory {
    pub fn new(capacity: usize, ttl_ms: u64) -> Self {
        AckReplayHistory {
            ring: vec![None; capacity],
            write_index: 0,
            ttl_ms,
        }
    }

    /// Remember that an ACK for `id` was just sent at `now`.
    pub fn record(&mut self, id: MessageId, now: u64) {
        let len = self.ring.len();
        self.ring[self.write_index] = Some(Entry { id, sent_at: now });
        self.write_index = (self.write_index + 1) % len;
    }

    /// True if an ACK for `id` was sent within [`Self::ttl_ms`] of `now`.
    pub fn contains(&self, id: MessageId, now: u64) -> bool {
        self.ring.iter().flatten().any(|entry| {
            entry.id == id && now.wrapping_sub(entry.sent_at) <= self.ttl_ms
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recently_acked_within_ttl() {
        let mut history = AckReplayHistory::new(4, 15_000);
        history.record(MessageId(1), 1_000);
        assert!(history.contains(MessageId(1), 10_000));
    }

    #[test]
    fn entry_expires_after_ttl() {
        let mut history = AckReplayHistory::new(4, 15_000);
        history.record(MessageId(1), 1_000);
        assert!(!history.contains(MessageId(1), 20_000));
    }

    #[test]
    fn ring_wraps_and_evicts_oldest() {
        let mut history = AckReplayHistory::new(2, 60_000);
        history.record(MessageId(1), 0);
        history.record(MessageId(2), 0);
        history.record(MessageId(3), 0);
        assert!(!history.contains(MessageId(1), 0));
        assert!(history.contains(MessageId(3), 0));
    }
}
