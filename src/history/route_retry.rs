//! Route-retry history: caps alternate-route re-enqueues per message-id so
//! a message can never bounce around the mesh indefinitely.

use crate::ids::MessageId;

#[derive(Debug, Clone, Copy)]
struct Entry {
    id: MessageId,
    count: u8,
}

#[derive(Debug)]
pub struct RouteRetryHistory {
    ring: Vec<Option<Entry>>,
    write_index: usize,
    max_per_message: u8,
}

impl RouteRetryHistory {
    pub fn new(capacity: usize, max_per_message: u8) -> Self {
        RouteRetryHistory {
            ring: vec![None; capacity],
            write_index: 0,
            max_per_message,
        }
    }

    /// Returns whether another alternate-route re-enqueue is permitted for
    /// `id`, bumping its counter as a side effect when it is.
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
    fn allows_up_to_cap_then_refuses() {
        let mut history = RouteRetryHistory::new(4, 2);
        assert!(history.try_use(MessageId(1)));
        assert!(history.try_use(MessageId(1)));
        assert!(!history.try_use(MessageId(1)));
    }

    #[test]
    fn independent_messages_have_independent_caps() {
        let mut history = RouteRetryHistory::new(4, 1);
        assert!(history.try_use(MessageId(1)));
        assert!(history.try_use(MessageId(2)));
        assert!(!history.try_use(MessageId(1)));
    }
}
