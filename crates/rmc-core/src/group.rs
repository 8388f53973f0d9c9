//! Identities for the fixed replication group and the chat rooms.
//!
//! The group is established once at startup from configuration and is
//! immutable for the lifetime of the process. Servers are addressed by a
//! 1-based index into the configured peer list; rooms are a fixed set of
//! independent ordering domains.

use serde::{Deserialize, Serialize};

/// Number of chat rooms every server hosts.
pub const ROOM_COUNT: usize = 16;

/// 1-based index of a server within the fixed group.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ServerId(usize);

impl ServerId {
    /// Create a server id from a 1-based index. Index 0 is never a valid
    /// member, which also keeps proposer tie-breaking well defined.
    pub fn new(index: usize) -> Option<Self> {
        if index >= 1 {
            Some(ServerId(index))
        } else {
            None
        }
    }

    /// The 1-based index as carried on the wire.
    pub fn index(&self) -> usize {
        self.0
    }

    /// The 0-based slot for dense per-member storage.
    pub fn slot(&self) -> usize {
        self.0 - 1
    }
}

impl std::fmt::Display for ServerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "S{:02}", self.0)
    }
}

/// 1-based chat room number, always within `1..=ROOM_COUNT`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RoomId(usize);

impl RoomId {
    /// Create a room id, rejecting anything outside the fixed range.
    pub fn new(number: usize) -> Option<Self> {
        if (1..=ROOM_COUNT).contains(&number) {
            Some(RoomId(number))
        } else {
            None
        }
    }

    /// The 1-based room number as carried on the wire.
    pub fn number(&self) -> usize {
        self.0
    }

    /// The 0-based slot for dense per-room storage.
    pub fn slot(&self) -> usize {
        self.0 - 1
    }

    /// Iterate over every room.
    pub fn all() -> impl Iterator<Item = RoomId> {
        (1..=ROOM_COUNT).map(RoomId)
    }
}

impl std::fmt::Display for RoomId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The fixed, ordered replication group plus this server's own position in it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    size: usize,
    self_id: ServerId,
}

impl Group {
    /// Build a group of `size` members with `self_id` as our own index.
    /// Returns `None` when the index falls outside the group.
    pub fn new(size: usize, self_id: ServerId) -> Option<Self> {
        if size >= 1 && self_id.index() <= size {
            Some(Group { size, self_id })
        } else {
            None
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn self_id(&self) -> ServerId {
        self.self_id
    }

    /// Whether a 1-based index identifies a member of this group.
    pub fn contains(&self, id: ServerId) -> bool {
        id.index() <= self.size
    }

    /// Resolve a raw wire index into a member id.
    pub fn member(&self, index: usize) -> Option<ServerId> {
        ServerId::new(index).filter(|id| self.contains(*id))
    }

    /// Iterate over every member in group order.
    pub fn members(&self) -> impl Iterator<Item = ServerId> {
        (1..=self.size).map(|i| ServerId(i))
    }
}
