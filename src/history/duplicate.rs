//! Duplicate-suppression ring: presence means "this node has fully
//! processed this message-id" (ACKed and forwarded, or consumed it).
//! ACKs and HELLOs are never tracked here.

use crate::ids::MessageId;

#[derive(Debug)]
pub struct DuplicateHistory {
    ring: Vec<Option<MessageId>>,
    write_index: usize,
}

impl DuplicateHistory {
    pub fn new(capacity: usize) -> Self {
        DuplicateHistory {
            ring: vec![None; capacity],
            write_index: 0,
        }
    }

    /// Record `id` as seen, overwriting the oldest slot once full.
    pub fn record(&mut self, id: MessageId) {
        if self.contains(id) {
            return;
        }
        let len = self.ring.len();
        self.ring[self.write_index] = Some(id);
        self.write_index = (self.write_index + 1) % len;
    }

    /// True if `id` has been recorded within ring capacity, regardless of
    /// how many times it was seen.
    pub fn contains(&self, id: MessageId) -> bool {
        self.ring.iter().any(|slot| *slot == Some(id))
    }
}
