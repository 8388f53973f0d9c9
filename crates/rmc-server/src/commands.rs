//! The client-facing command protocol.
//!
//! Clients speak plain text datagrams: `/nick`, `/join`, `/part`, `/quit`,
//! and anything else is chat content for the client's current room.
//! Responses use the `+OK` / `-ERR` convention. This layer only mutates the
//! roster and describes what should happen next; sending is the server's
//! job.

use crate::membership::Roster;
use rmc_core::{RoomId, ROOM_COUNT};
use std::net::SocketAddr;

const UNJOINED: &str = "-ERR Haven't joined any chat room yet.";
const UNKNOWN: &str = "-ERR Unknown command.";
const BAD_ROOM: &str = "-ERR Invalid chat room number.";
const BAD_NICK: &str = "-ERR Invalid nick name.";

/// What one client datagram asks the server to do.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClientAction {
    /// Answer the client directly.
    Reply(String),
    /// Multicast a chat message to a room. `text` already carries the
    /// sender's display name.
    Post { room: RoomId, text: String },
    /// The client left; it has been dropped from the roster.
    Quit,
}

/// Interpret one line from a client, updating the roster in place.
///
/// The caller has already classified `addr` as a client, so the roster
/// entry exists.
pub fn handle_line(roster: &mut Roster, addr: SocketAddr, line: &str) -> ClientAction {
    if let Some(rest) = line.strip_prefix('/') {
        let mut words = rest.split_whitespace();
        let command = words.next().unwrap_or("");
        match command.to_ascii_lowercase().as_str() {
            "nick" => set_nick(roster, addr, words),
            "join" => join(roster, addr, words.next()),
            "part" => part(roster, addr),
            "quit" => {
                roster.remove_client(addr);
                ClientAction::Quit
            }
            _ => ClientAction::Reply(UNKNOWN.to_string()),
        }
    } else {
        post(roster, addr, line)
    }
}

fn set_nick<'a>(
    roster: &mut Roster,
    addr: SocketAddr,
    words: impl Iterator<Item = &'a str>,
) -> ClientAction {
    let name = words.collect::<Vec<_>>().join(" ");
    if name.is_empty() {
        return ClientAction::Reply(BAD_NICK.to_string());
    }
    if let Some(client) = roster.client_mut(addr) {
        client.nick = Some(name.clone());
    }
    ClientAction::Reply(format!("+OK Nickname set to '{name}'"))
}

fn join(roster: &mut Roster, addr: SocketAddr, argument: Option<&str>) -> ClientAction {
    if let Some(current) = roster.client(addr).and_then(|c| c.room) {
        return ClientAction::Reply(format!(
            "-ERR You are already in room #{}",
            current.number()
        ));
    }
    let number: usize = match argument.and_then(|a| a.parse().ok()) {
        Some(n) if n >= 1 => n,
        _ => return ClientAction::Reply(BAD_ROOM.to_string()),
    };
    let room = match RoomId::new(number) {
        Some(room) => room,
        None => {
            return ClientAction::Reply(format!(
                "-ERR There are only total {ROOM_COUNT} chat rooms."
            ))
        }
    };
    if let Some(client) = roster.client_mut(addr) {
        client.room = Some(room);
    }
    ClientAction::Reply(format!("+OK You are now in chat room #{}", room.number()))
}

fn part(roster: &mut Roster, addr: SocketAddr) -> ClientAction {
    match roster.client_mut(addr) {
        Some(client) => match client.room.take() {
            Some(left) => ClientAction::Reply(format!(
                "+OK You have left chat room #{}",
                left.number()
            )),
            None => ClientAction::Reply(UNJOINED.to_string()),
        },
        None => ClientAction::Reply(UNJOINED.to_string()),
    }
}

fn post(roster: &mut Roster, addr: SocketAddr, line: &str) -> ClientAction {
    match roster.client(addr) {
        Some(client) => match client.room {
            Some(room) => ClientAction::Post {
                room,
                text: format!("<{}> {line}", client.display_name()),
            },
            None => ClientAction::Reply(UNJOINED.to_string()),
        },
        None => ClientAction::Reply(UNJOINED.to_string()),
    }
}
