//! Who is on the other end of a datagram.
//!
//! A single socket receives from both group peers and chat clients. The
//! roster classifies senders by address: anything matching a configured
//! peer forward address is a server, everything else is a client. Clients
//! are tracked with their optional nickname and current room.

use rmc_core::{RoomId, ServerId};
use std::collections::HashMap;
use std::net::SocketAddr;

/// Classification of a datagram source.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Source {
    Peer(ServerId),
    Client(SocketAddr),
}

/// One connected chat client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientEntry {
    pub addr: SocketAddr,
    pub nick: Option<String>,
    pub room: Option<RoomId>,
}

impl ClientEntry {
    /// The name shown to other room members: the nickname if set, the
    /// source address otherwise.
    pub fn display_name(&self) -> String {
        match &self.nick {
            Some(nick) => nick.clone(),
            None => self.addr.to_string(),
        }
    }
}

/// Tracks group peers and connected clients by address.
#[derive(Debug)]
pub struct Roster {
    peers: Vec<SocketAddr>,
    clients: HashMap<SocketAddr, ClientEntry>,
}

impl Roster {
    pub fn new(peers: Vec<SocketAddr>) -> Self {
        Roster {
            peers,
            clients: HashMap::new(),
        }
    }

    /// Classify a datagram source, registering unseen clients on first
    /// contact.
    pub fn classify(&mut self, addr: SocketAddr) -> Source {
        let peer = self
            .peers
            .iter()
            .position(|p| *p == addr)
            .and_then(|position| ServerId::new(position + 1));
        if let Some(id) = peer {
            return Source::Peer(id);
        }
        self.clients.entry(addr).or_insert(ClientEntry {
            addr,
            nick: None,
            room: None,
        });
        Source::Client(addr)
    }

    pub fn peer_addr(&self, id: ServerId) -> Option<SocketAddr> {
        self.peers.get(id.slot()).copied()
    }

    pub fn client(&self, addr: SocketAddr) -> Option<&ClientEntry> {
        self.clients.get(&addr)
    }

    pub fn client_mut(&mut self, addr: SocketAddr) -> Option<&mut ClientEntry> {
        self.clients.get_mut(&addr)
    }

    pub fn remove_client(&mut self, addr: SocketAddr) -> Option<ClientEntry> {
        self.clients.remove(&addr)
    }

    /// Addresses of every local client currently in `room`.
    pub fn members_of(&self, room: RoomId) -> Vec<SocketAddr> {
        self.clients
            .values()
            .filter(|c| c.room == Some(room))
            .map(|c| c.addr)
            .collect()
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }
}
