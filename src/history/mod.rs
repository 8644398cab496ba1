//! Bounded history rings: duplicate suppression, ACK replay, and the two
//! caps that keep alternate-route and ALT traffic from looping forever.
//!
//! All four are FIFO with a write index that wraps; eviction is purely by
//! position, never by age (except the ACK-replay ring's *presence* check,
//! which additionally consults a TTL — the ring itself still evicts by
//! position).

mod ack_replay;
mod alt_suppression;
mod duplicate;
mod route_retry;

pub use ack_replay::AckReplayHistory;
pub use alt_suppression::AltSuppressionHistory;
pub use duplicate::DuplicateHistory;
pub use route_retry::RouteRetryHistory;
