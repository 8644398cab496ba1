//! Store-and-forward LoRa mesh routing core.
//!
//! This crate implements the protocol logic for a half-duplex LoRa mesh:
//! packet codec, neighbor table, hop-by-hop ACK scheduling, listen-before-talk
//! collision avoidance, and alternate-route recovery. It integrates:
//! - A tagged packet codec (DATA/ACK/HELLO/ALT) with packed little-endian wire layout
//! - A fixed-capacity neighbor table scored by RSSI and freshness
//! - Bounded history rings for duplicate suppression, ACK replay, and route/ALT caps
//! - A pending-ACK table with retry and timeout bookkeeping
//! - A jittered transmit queue with strict ACK priority
//! - A narrow [`radio::RadioDevice`] trait separating protocol logic from device I/O
//!
//! ## Module Organization
//!
//! - `ids`: node and message identifiers
//! - `config`: tunable capacities, timeouts, and constants
//! - `error`: caller-actionable failure modes
//! - `packet`: wire codec for the four packet types
//! - `neighbor`: neighbor table and next-hop selection
//! - `history`: duplicate, ACK-replay, route-retry, and ALT-suppression rings
//! - `pending_ack`: outbound DATA awaiting acknowledgement
//! - `queue`: jittered transmit scheduling
//! - `radio`: device shim and cross-callback staging area
//! - `identity`: hardware-id to node-id folding
//! - `clock`: injected monotonic time source
//! - `node`: [`node::MeshNode`], the owning record and its cooperative tick
//!
//! ## Public API
//!
//! The main entry point is [`node::MeshNode`]: construct one per local node,
//! call [`node::MeshNode::submit`] to originate traffic, and drive
//! [`node::MeshNode::tick`] from the host's own scheduling loop.

pub mod clock;
pub mod config;
pub mod error;
pub mod history;
pub mod identity;
pub mod ids;
pub mod neighbor;
pub mod node;
pub mod packet;
pub mod pending_ack;
pub mod queue;
pub mod radio;

pub use clock::{Clock, TestClock};
pub use config::MeshConfig;
pub use error::MeshError;
pub use identity::{node_id_from_hardware_id, IdentitySource};
pub use ids::{MessageId, NodeId};
pub use node::{DeliveryHandler, MeshNode};
pub use packet::{AckPacket, AltPacket, DataPacket, HelloPacket, Packet, PacketType};
pub use radio::{RadioDevice, RadioStaging};
