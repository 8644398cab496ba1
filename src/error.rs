//! Caller-actionable error conditions.
//!
//! Most of the failure modes in `spec.md` §7 (oversize frame, mesh-id
//! mismatch, decode failure, full neighbor table, full pending-ack table)
//! are routine and handled in place with a log line — there is nothing a
//! caller can do about them, so they never reach this type. Only the two
//! outcomes a caller must react to at submission time are modeled here.

use thiserror::Error;

/// Errors returned by [`crate::node::MeshNode::submit`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MeshError {
    /// The transmit queue had no free slot for the new DATA item.
    #[error("transmit queue is full")]
    QueueFull,
    /// No neighbor could be selected as next hop toward the destination.
    #[error("no route to destination")]
    NoRoute,
}
