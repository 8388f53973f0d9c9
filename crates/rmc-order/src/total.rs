//! Originator-side proposal collection for the total-order propose/agree
//! protocol.
//!
//! When a server multicasts a NEW-phase message, every group member
//! (itself included) answers with a proposed sequence number. The
//! coordinator gathers one proposal per member, keyed by the message
//! payload, and once the set is complete selects the winner: the highest
//! proposed id, ties broken by the lowest proposer index. The winning pair
//! becomes the AGREEMENT broadcast and the collection entry is discarded.

use rmc_core::ServerId;
use std::collections::HashMap;

/// One member's proposed sequence number for a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Proposal {
    pub id: u64,
    pub proposer: ServerId,
}

/// Collects proposals for the messages this server originated.
#[derive(Debug, Default)]
pub struct TotalOrderCoordinator {
    collecting: HashMap<String, Vec<Proposal>>,
}

impl TotalOrderCoordinator {
    pub fn new() -> Self {
        TotalOrderCoordinator::default()
    }

    /// Record one member's proposal. Returns the winning proposal once all
    /// `group_size` members have answered, discarding the entry; `None`
    /// while the collection is still incomplete.
    pub fn record(
        &mut self,
        payload: &str,
        proposal: Proposal,
        group_size: usize,
    ) -> Option<Proposal> {
        let entry = self.collecting.entry(payload.to_string()).or_default();
        entry.push(proposal);
        if entry.len() < group_size {
            return None;
        }

        let proposals = self.collecting.remove(payload)?;
        proposals.into_iter().reduce(|best, p| {
            if p.id > best.id || (p.id == best.id && p.proposer < best.proposer) {
                p
            } else {
                best
            }
        })
    }

    /// Messages still waiting on proposals.
    pub fn outstanding(&self) -> usize {
        self.collecting.len()
    }
}
