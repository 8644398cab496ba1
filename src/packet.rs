//! Wire packet variants and their field-by-field (de)serialization.
//!
//! The four variants are modeled as a tagged sum type rather than a shared
//! base record with virtual dispatch (`spec.md` §9 is explicit about this),
//! since their field sets genuinely differ. Layout on the wire is packed
//! little-endian, in declared field order — never a raw struct memory dump,
//! since Rust gives no alignment guarantee equivalent to the original's
//! `#pragma`-free C structs.

use crate::config;
use crate::ids::{MessageId, NodeId};

/// First-byte wire discriminator for a [`Packet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    Data = config::MESSAGE_TYPE_DATA,
    Ack = config::MESSAGE_TYPE_ACK,
    Hello = config::MESSAGE_TYPE_HELLO,
    Alt = config::MESSAGE_TYPE_ALT,
}

impl PacketType {
    fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            config::MESSAGE_TYPE_DATA => Some(PacketType::Data),
            config::MESSAGE_TYPE_ACK => Some(PacketType::Ack),
            config::MESSAGE_TYPE_HELLO => Some(PacketType::Hello),
            config::MESSAGE_TYPE_ALT => Some(PacketType::Alt),
            _ => None,
        }
    }
}

/// A DATA frame: application payload en route to `destination`, hop by hop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataPacket {
    pub mesh_id: u16,
    pub message_id: MessageId,
    pub origin: NodeId,
    pub destination: NodeId,
    pub next_hop: NodeId,
    pub extra: u8,
    pub ttl: u8,
    pub payload: u32,
}

impl DataPacket {
    pub const WIRE_SIZE: usize = 1 + 2 + 4 + 2 + 2 + 2 + 1 + 1 + 4;

    fn encode(&self, buf: &mut Vec<u8>) {
        buf.push(PacketType::Data as u8);
        buf.extend_from_slice(&self.mesh_id.to_le_bytes());
        buf.extend_from_slice(&self.message_id.0.to_le_bytes());
        buf.extend_from_slice(&self.origin.0.to_le_bytes());
        buf.extend_from_slice(&self.destination.0.to_le_bytes());
        buf.extend_from_slice(&self.next_hop.0.to_le_bytes());
        buf.push(self.extra);
        buf.push(self.ttl);
        buf.extend_from_slice(&self.payload.to_le_bytes());
    }

    fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < Self::WIRE_SIZE {
            return None;
        }
        Some(DataPacket {
            mesh_id: u16::from_le_bytes([bytes[1], bytes[2]]),
            message_id: MessageId(u32::from_le_bytes([bytes[3], bytes[4], bytes[5], bytes[6]])),
            origin: NodeId(u16::from_le_bytes([bytes[7], bytes[8]])),
            destination: NodeId(u16::from_le_bytes([bytes[9], bytes[10]])),
            next_hop: NodeId(u16::from_le_bytes([bytes[11], bytes[12]])),
            extra: bytes[13],
            ttl: bytes[14],
            payload: u32::from_le_bytes([bytes[15], bytes[16], bytes[17], bytes[18]]),
        })
    }
}

/// A hop-by-hop acknowledgement for a previously received DATA frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckPacket {
    pub mesh_id: u16,
    pub message_id: MessageId,
    pub origin: NodeId,
    pub destination: NodeId,
}

impl AckPacket {
    pub const WIRE_SIZE: usize = 1 + 2 + 4 + 2 + 2;

    fn encode(&self, buf: &mut Vec<u8>) {
        buf.push(PacketType::Ack as u8);
        buf.extend_from_slice(&self.mesh_id.to_le_bytes());
        buf.extend_from_slice(&self.message_id.0.to_le_bytes());
        buf.extend_from_slice(&self.origin.0.to_le_bytes());
        buf.extend_from_slice(&self.destination.0.to_le_bytes());
    }

    fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < Self::WIRE_SIZE {
            return None;
        }
        Some(AckPacket {
            mesh_id: u16::from_le_bytes([bytes[1], bytes[2]]),
            message_id: MessageId(u32::from_le_bytes([bytes[3], bytes[4], bytes[5], bytes[6]])),
            origin: NodeId(u16::from_le_bytes([bytes[7], bytes[8]])),
            destination: NodeId(u16::from_le_bytes([bytes[9], bytes[10]])),
        })
    }
}

/// A beacon announcing this node's presence, used to populate neighbor tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HelloPacket {
    pub mesh_id: u16,
    pub message_id: MessageId,
    pub origin: NodeId,
}

impl HelloPacket {
    pub const WIRE_SIZE: usize = 1 + 2 + 4 + 2;

    fn encode(&self, buf: &mut Vec<u8>) {
        buf.push(PacketType::Hello as u8);
        buf.extend_from_slice(&self.mesh_id.to_le_bytes());
        buf.extend_from_slice(&self.message_id.0.to_le_bytes());
        buf.extend_from_slice(&self.origin.0.to_le_bytes());
    }

    fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < Self::WIRE_SIZE {
            return None;
        }
        Some(HelloPacket {
            mesh_id: u16::from_le_bytes([bytes[1], bytes[2]]),
            message_id: MessageId(u32::from_le_bytes([bytes[3], bytes[4], bytes[5], bytes[6]])),
            origin: NodeId(u16::from_le_bytes([bytes[7], bytes[8]])),
        })
    }
}

/// A hint asking the previous hop to pick a different next-hop, sent when a
/// DATA frame was received as a duplicate here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AltPacket {
    pub mesh_id: u16,
    /// message-id of the offending DATA packet.
    pub message_id: MessageId,
    pub origin: NodeId,
    pub destination: NodeId,
}

impl AltPacket {
    pub const WIRE_SIZE: usize = 1 + 2 + 4 + 2 + 2;

    fn encode(&self, buf: &mut Vec<u8>) {
        buf.push(PacketType::Alt as u8);
        buf.extend_from_slice(&self.mesh_id.to_le_bytes());
        buf.extend_from_slice(&self.message_id.0.to_le_bytes());
        buf.extend_from_slice(&self.origin.0.to_le_bytes());
        buf.extend_from_slice(&self.destination.0.to_le_bytes());
    }

    fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < Self::WIRE_SIZE {
            return None;
        }
        Some(AltPacket {
            mesh_id: u16::from_le_bytes([bytes[1], bytes[2]]),
            message_id: MessageId(u32::from_le_bytes([bytes[3], bytes[4], bytes[5], bytes[6]])),
            origin: NodeId(u16::from_le_bytes([bytes[7], bytes[8]])),
            destination: NodeId(u16::from_le_bytes([bytes[9], bytes[10]])),
        })
    }
}

/// A decoded frame of any of the four message types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Packet {
    Data(DataPacket),
    Ack(AckPacket),
    Hello(HelloPacket),
    Alt(AltPacket),
}

impl Packet {
    pub fn mesh_id(&self) -> u16 {
        match self {
            Packet::Data(p) => p.mesh_id,
            Packet::Ack(p) => p.mesh_id,
            Packet::Hello(p) => p.mesh_id,
            Packet::Alt(p) => p.mesh_id,
        }
    }

    pub fn message_id(&self) -> MessageId {
        match self {
            Packet::Data(p) => p.message_id,
            Packet::Ack(p) => p.message_id,
            Packet::Hello(p) => p.message_id,
            Packet::Alt(p) => p.message_id,
        }
    }

    /// Encode into a freshly allocated little-endian byte buffer.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(DataPacket::WIRE_SIZE);
        match self {
            Packet::Data(p) => p.encode(&mut buf),
            Packet::Ack(p) => p.encode(&mut buf),
            Packet::Hello(p) => p.encode(&mut buf),
            Packet::Alt(p) => p.encode(&mut buf),
        }
        buf
    }

    /// Decode a frame from its first byte discriminator. Frames larger than
    /// [`config::MAX_PACKET_SIZE`] must be rejected by the caller before
    /// this is reached; an unrecognized discriminator or truncated body
    /// yields `None` so it can be dropped silently.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.is_empty() || bytes.len() > config::MAX_PACKET_SIZE {
            return None;
        }
        match PacketType::from_byte(bytes[0])? {
            PacketType::Data => DataPacket::decode(bytes).map(Packet::Data),
            PacketType::Ack => AckPacket::decode(bytes).map(Packet::Ack),
            PacketType::Hello => HelloPacket::decode(bytes).map(Packet::Hello),
            PacketType::Alt => AltPacket::decode(bytes).map(Packet::Alt),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_packet_round_trips() {
        let packet = Packet::Data(DataPacket {
            mesh_id: 0x1234,
            message_id: MessageId(0x0102_ABCD),
            origin: NodeId(11),
            destination: NodeId(22),
            next_hop: NodeId(33),
            extra: 1,
            ttl: 6,
            payload: 42,
        });
        let bytes = packet.encode();
        assert_eq!(bytes.len(), DataPacket::WIRE_SIZE);
        assert_eq!(Packet::decode(&bytes), Some(packet));
    }

    #[test]
    fn ack_packet_round_trips() {
        let packet = Packet::Ack(AckPacket {
            mesh_id: 0x1234,
            message_id: MessageId(0x02AB_CDEF),
            origin: NodeId(22),
            destination: NodeId(11),
        });
        let bytes = packet.encode();
        assert_eq!(Packet::decode(&bytes), Some(packet));
    }

    #[test]
    fn hello_packet_round_trips() {
        let packet = Packet::Hello(HelloPacket {
            mesh_id: 0x1234,
            message_id: MessageId(0x03FF_0001),
            origin: NodeId(7),
        });
        let bytes = packet.encode();
        assert_eq!(Packet::decode(&bytes), Some(packet));
    }

    #[test]
    fn alt_packet_round_trips() {
        let packet = Packet::Alt(AltPacket {
            mesh_id: 0x1234,
            message_id: MessageId(0x04AA_0002),
            origin: NodeId(9),
            destination: NodeId(10),
        });
        let bytes = packet.encode();
        assert_eq!(Packet::decode(&bytes), Some(packet));
    }

    #[test]
    fn unknown_discriminator_is_dropped_silently() {
        let bytes = [0xEFu8; DataPacket::WIRE_SIZE];
        assert_eq!(Packet::decode(&bytes), None);
    }

    #[test]
    fn truncated_frame_is_dropped_silently() {
        let packet = Packet::Data(DataPacket {
            mesh_id: 1,
            message_id: MessageId(1),
            origin: NodeId(1),
            destination: NodeId(2),
            next_hop: NodeId(3),
            extra: 0,
            ttl: 1,
            payload: 0,
        });
        let mut bytes = packet.encode();
        bytes.truncate(5);
        assert_eq!(Packet::decode(&bytes), None);
    }

    #[test]
    fn oversize_frame_is_rejected() {
        let bytes = vec![config::MESSAGE_TYPE_DATA; config::MAX_PACKET_SIZE + 1];
        assert_eq!(Packet::decode(&bytes), None);
    }
}
