//! RMC Order - the multicast delivery-ordering engine for Palaver
//!
//! A fixed group of chat servers replicates client messages to each other
//! under one of four delivery guarantees:
//!
//! - **Unordered**: forward on arrival, no buffering.
//! - **FIFO**: per-sender sequence numbers; each sender's messages reach
//!   every replica's clients in send order.
//! - **Causal**: vector clocks; a message is held back until everything
//!   that causally precedes it has been delivered.
//! - **Total**: an ISIS-style propose/agree protocol; every replica
//!   delivers agreed messages in one identical global order.
//!
//! The engine is pure state-machine code: it consumes decoded peer frames
//! and returns explicit outcomes (deliverable payloads plus frames to
//! send). Hold-back buffering lives in [`holdback`], the propose/agree
//! collection in [`total`], and a deterministic multi-replica harness for
//! tests in [`simulator`].

pub mod engine;
pub mod holdback;
pub mod simulator;
pub mod total;

// Re-export main types for convenience
pub use engine::{
    Delivery, EngineError, LocalSend, Outbound, Outcome, OrderingEngine, OrderingMode,
};
pub use holdback::{CausalHoldback, FifoHoldback, SequenceKey, TotalHoldback};
pub use simulator::{LinkConfig, NetLink, ReplicaGroup};
pub use total::{Proposal, TotalOrderCoordinator};
