//! RMC Core - leaf types for the Palaver replicated multicast chat
//!
//! This crate holds the pieces every other layer builds on:
//! - Group and room identities ([`group`])
//! - Vector clocks for causal delivery ([`clock`])
//! - The comma-delimited peer wire codec ([`wire`])
//!
//! Nothing here does I/O; the ordering engine and the server runtime sit in
//! their own crates on top of these types.

pub mod clock;
pub mod group;
pub mod wire;

// Re-export main types for convenience
pub use clock::VectorClock;
pub use group::{Group, RoomId, ServerId, ROOM_COUNT};
pub use wire::{DecodeError, Phase, WireMessage, WIRE_FIELDS};
