//! Transmit queue: bounded set of outgoing items with randomized send
//! times, ACK-priority scheduling, and a listen-before-talk gate.

use rand::Rng;

use crate::packet::Packet;

/// One queued outgoing frame and the monotonic time it becomes eligible to send.
#[derive(Debug, Clone, Copy)]
struct Item {
    packet: Packet,
    send_at: u64,
}

#[derive(Debug)]
pub struct TransmitQueue {
    slots: Vec<Option<Item>>,
}

impl TransmitQueue {
    pub fn new(capacity: usize) -> Self {
        TransmitQueue {
            slots: vec![None; capacity],
        }
    }

    /// Enqueue `packet` with a jittered send time in
    /// `[now + lower, now + upper)`. Returns `false` (log-only on the
    /// caller's side) if the queue has no free slot.
    pub fn enqueue(
        &mut self,
        packet: Packet,
        now: u64,
        lower: u64,
        upper: u64,
        rng: &mut impl Rng,
    ) -> bool {
        let Some(free) = self.slots.iter_mut().find(|s| s.is_none()) else {
            return false;
        };
        let jitter = if upper > lower {
            rng.gen_range(lower..upper)
        } else {
            lower
        };
        *free = Some(Item {
            packet,
            send_at: now + jitter,
        });
        true
    }

    /// Select the next item ready to send: an ACK with an elapsed send
    /// time takes strict priority; otherwise the first in-use slot whose
    /// send time has elapsed. Frees the slot and returns the packet.
    pub fn pop_ready(&mut self, now: u64) -> Option<Packet> {
        if let Some(slot) = self.slots.iter_mut().find(|s| {
            matches!(s, Some(item) if item.send_at <= now && matches!(item.packet, Packet::Ack(_)))
        }) {
            return slot.take().map(|item| item.packet);
        }
        if let Some(slot) = self
            .slots
            .iter_mut()
            .find(|s| matches!(s, Some(item) if item.send_at <= now))
        {
            return slot.take().map(|item| item.packet);
        }
        None
    }

    /// Stagger every still-queued item's send time by
    /// `[lower, upper)` after a successful reception.
    pub fn perturb_all(&mut self, lower: u64, upper: u64, rng: &mut impl Rng) {
        for slot in self.slots.iter_mut().flatten() {
            let jitter = if upper > lower {
                rng.gen_range(lower..upper)
            } else {
                lower
            };
            slot.send_at += jitter;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(|s| s.is_none())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{MessageId, NodeId};
    use crate::packet::{AckPacket, DataPacket, HelloPacket};
    use rand::rngs::mock::StepRng;

    fn data_packet() -> Packet {
        Packet::Data(DataPacket {
            mesh_id: 1,
            message_id: MessageId(1),
            origin: NodeId(1),
            destination: NodeId(2),
            next_hop: NodeId(3),
            extra: 0,
            ttl: 6,
            payload: 0,
        })
    }

    fn ack_packet() -> Packet {
        Packet::Ack(AckPacket {
            mesh_id: 1,
            message_id: MessageId(1),
            origin: NodeId(2),
            destination: NodeId(1),
        })
    }

    fn hello_packet() -> Packet {
        Packet::Hello(HelloPacket {
            mesh_id: 1,
            message_id: MessageId(2),
            origin: NodeId(1),
        })
    }

    #[test]
    fn ack_has_strict_priority_over_other_traffic() {
        let mut queue = TransmitQueue::new(4);
        let mut rng = StepRng::new(0, 1);
        queue.enqueue(data_packet(), 0, 0, 1, &mut rng);
        queue.enqueue(hello_packet(), 0, 0, 1, &mut rng);
        queue.enqueue(ack_packet(), 0, 0, 1, &mut rng);
        let popped = queue.pop_ready(10).unwrap();
        assert!(matches!(popped, Packet::Ack(_)));
    }

    #[test]
    fn nothing_pops_before_its_scheduled_time() {
        let mut queue = TransmitQueue::new(4);
        let mut rng = StepRng::new(0, 1);
        queue.enqueue(data_packet(), 1_000, 5_000, 5_001, &mut rng);
        assert!(queue.pop_ready(1_000).is_none());
        assert!(queue.pop_ready(6_001).is_some());
    }

    #[test]
    fn full_queue_rejects_enqueue() {
        let mut queue = TransmitQueue::new(1);
        let mut rng = StepRng::new(0, 1);
        assert!(queue.enqueue(data_packet(), 0, 0, 1, &mut rng));
        assert!(!queue.enqueue(hello_packet(), 0, 0, 1, &mut rng));
    }

    #[test]
    fn perturb_all_delays_every_queued_item() {
        let mut queue = TransmitQueue::new(2);
        let mut rng = StepRng::new(0, 1);
        queue.enqueue(data_packet(), 0, 0, 1, &mut rng);
        queue.perturb_all(500, 501, &mut rng);
        assert!(queue.pop_ready(400).is_none());
        assert!(queue.pop_ready(500).is_some());
    }
}
