//! Vector clocks over the fixed replication group.
//!
//! One slot per group member, tracking how many of that member's messages
//! this replica has causally delivered. Slots are monotonically
//! non-decreasing: a slot moves only on delivery, except the owner's own
//! slot which is incremented at send time.

use crate::group::ServerId;
use serde::{Deserialize, Serialize};

/// A fixed-length vector clock, one counter per group member.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorClock {
    counts: Vec<u64>,
}

impl VectorClock {
    /// An all-zero clock for a group of `len` members.
    pub fn new(len: usize) -> Self {
        VectorClock {
            counts: vec![0; len],
        }
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// The count for one member. Ids outside the clock read as zero.
    pub fn get(&self, id: ServerId) -> u64 {
        self.counts.get(id.slot()).copied().unwrap_or(0)
    }

    /// Increment one member's slot, returning the new count.
    pub fn increment(&mut self, id: ServerId) -> u64 {
        let entry = &mut self.counts[id.slot()];
        *entry += 1;
        *entry
    }

    /// True when `self[i] >= other[i]` for every slot.
    pub fn dominates(&self, other: &VectorClock) -> bool {
        self.counts
            .iter()
            .zip(other.counts.iter())
            .all(|(a, b)| a >= b)
    }

    /// True when `dominates(other)` and the clocks differ somewhere.
    pub fn strictly_dominates(&self, other: &VectorClock) -> bool {
        self.dominates(other) && self != other
    }

    /// Neither clock dominates the other.
    pub fn concurrent_with(&self, other: &VectorClock) -> bool {
        !self.dominates(other) && !other.dominates(self)
    }

    /// Component-wise maximum with another clock.
    pub fn merge(&mut self, other: &VectorClock) {
        for (a, b) in self.counts.iter_mut().zip(other.counts.iter()) {
            *a = (*a).max(*b);
        }
    }

    /// Render as the `$`-delimited wire field, e.g. `1$0$2`.
    pub fn to_wire(&self) -> String {
        let parts: Vec<String> = self.counts.iter().map(|c| c.to_string()).collect();
        parts.join("$")
    }

    /// Parse the `$`-delimited wire field. Returns `None` on any
    /// non-numeric component; length is validated by the caller against
    /// the group size.
    pub fn from_wire(text: &str) -> Option<Self> {
        let counts: Option<Vec<u64>> = text.split('$').map(|p| p.parse().ok()).collect();
        counts.map(|counts| VectorClock { counts })
    }
}
