//! Fan-out of deliverable messages to local room members.

use crate::membership::Roster;
use crate::transport::Transport;
use rmc_core::RoomId;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, warn};

/// Sends ordered deliveries and command replies to clients. Per-client send
/// failures are logged and skipped so one dead client never blocks a room.
pub struct DeliveryDispatcher<T> {
    transport: Arc<T>,
}

impl<T: Transport> DeliveryDispatcher<T> {
    pub fn new(transport: Arc<T>) -> Self {
        DeliveryDispatcher { transport }
    }

    /// Deliver one message to every local client in `room`. A room with no
    /// local members results in zero sends, which is not an error.
    pub async fn deliver_room(&self, roster: &Roster, room: RoomId, text: &str) {
        let members = roster.members_of(room);
        debug!(%room, members = members.len(), "delivering message");
        for addr in members {
            if let Err(error) = self.transport.send_to(addr, text).await {
                warn!(client = %addr, %error, "dropping delivery to client");
            }
        }
    }

    /// Answer one client directly.
    pub async fn respond(&self, addr: SocketAddr, text: &str) {
        if let Err(error) = self.transport.send_to(addr, text).await {
            warn!(client = %addr, %error, "dropping response to client");
        }
    }
}
