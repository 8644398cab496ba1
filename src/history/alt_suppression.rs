//! ALT-suppression history: ALT packets cost airtime, so cap how many can be
//! sent per message-id (the default limit is 1).

use crate::ids::MessageId;

#[derive(Debug, Clone, Copy)]
struct Entry {
    id: MessageId,
    count: u8,
}

#[derive(Debug)]
pub struct AltSuppressionHistory {
    ring: Vec<Option<Entry>>,
    write_index: usize,
    max_per_message: u8,
}

impl AltSuppressionHistory {
    pub fn new(capacity: usize, max_per_message: u8) -> Self {
        AltSuppressionHistory {
            ring: vec![None; capacity],
            write_index: 0,
            max_per_message,
        }
    }

    /// Returns whether sending another ALT for `id` is permitted, bumping
    /// its counter as a side effect when it is.
    pub fn try_use(&mut self, id: MessageId) -> bool {
        if let Some(entry) = self.ring.iter_mut().flatten().find(|e| e.id == id) {
            if entry.count >= self.max_per_message {
                return false;
            }
            entry.count += 1;
            return true;
        }
        let len = self.ring.len();
        self.ring[self.write_index] = Some(Entry { id, count: 1 });
        self.write_index = (self.write_index + 1) % len;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_cap_allows_exactly_one_alt() {
        let mut history = AltSuppressionHistory::new(4, 1);
        assert!(history.try_use(MessageId(1)));
        assert!(!history.try_use(MessageId(1)));
    }
}
