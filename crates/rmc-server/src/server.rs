//! The server process: one socket, one receive loop.
//!
//! Every datagram that arrives is either a replication frame from a group
//! peer or a text line from a chat client; the roster decides which. Peer
//! frames run through the ordering engine, whose outcome drives local
//! deliveries and further frames on the wire. Client lines run through the
//! command layer. Nothing in the loop panics or aborts on bad input: a
//! malformed frame or a failed send is logged and dropped.

use crate::commands::{self, ClientAction};
use crate::config::{ConfigError, ServerConfig};
use crate::dispatch::DeliveryDispatcher;
use crate::error::ServerError;
use crate::membership::{Roster, Source};
use crate::transport::Transport;
use rmc_core::{Group, ServerId, WireMessage};
use rmc_order::{Outbound, Outcome, OrderingEngine, OrderingMode};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// A replicated chat server bound to one transport endpoint.
pub struct Server<T> {
    group: Group,
    engine: OrderingEngine,
    roster: Roster,
    transport: Arc<T>,
    dispatcher: DeliveryDispatcher<T>,
}

impl<T: Transport> Server<T> {
    pub fn new(
        config: &ServerConfig,
        mode: OrderingMode,
        transport: Arc<T>,
    ) -> Result<Self, ServerError> {
        let group =
            Group::new(config.group_size(), config.self_id).ok_or(ConfigError::IndexOutOfRange {
                index: config.self_id.index(),
                count: config.group_size(),
            })?;
        Ok(Server {
            group,
            engine: OrderingEngine::new(mode, group),
            roster: Roster::new(config.peers.clone()),
            dispatcher: DeliveryDispatcher::new(transport.clone()),
            transport,
        })
    }

    pub fn group(&self) -> Group {
        self.group
    }

    /// Run the receive loop until `shutdown` flips to true or the sender
    /// side is dropped.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<(), ServerError> {
        info!(
            server = %self.group.self_id(),
            mode = %self.engine.mode(),
            addr = %self.transport.local_addr(),
            "receive loop started"
        );
        loop {
            // cloned so the pending recv borrow never pins `self`
            let transport = self.transport.clone();
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                received = transport.recv() => {
                    let (addr, text) = received?;
                    self.handle_datagram(addr, &text).await;
                }
            }
        }
        info!(server = %self.group.self_id(), "receive loop stopped");
        Ok(())
    }

    async fn handle_datagram(&mut self, addr: SocketAddr, text: &str) {
        match self.roster.classify(addr) {
            Source::Peer(sender) => self.handle_peer_frame(sender, text).await,
            Source::Client(client) => self.handle_client_line(client, text).await,
        }
    }

    async fn handle_peer_frame(&mut self, sender: ServerId, text: &str) {
        let frame = match WireMessage::parse(text, self.group.size()) {
            Ok(frame) => frame,
            Err(error) => {
                warn!(peer = %sender, %error, raw = text, "dropping malformed frame");
                return;
            }
        };
        debug!(peer = %sender, phase = ?frame.phase, room = %frame.room, "frame received");
        match self.engine.handle_peer(sender, frame) {
            Ok(outcome) => self.apply_outcome(outcome).await,
            Err(error) => warn!(peer = %sender, %error, "dropping rejected frame"),
        }
    }

    async fn handle_client_line(&mut self, addr: SocketAddr, text: &str) {
        let line = text.trim_end_matches(['\r', '\n']);
        match commands::handle_line(&mut self.roster, addr, line) {
            ClientAction::Reply(reply) => self.dispatcher.respond(addr, &reply).await,
            ClientAction::Quit => debug!(client = %addr, "client quit"),
            ClientAction::Post { room, text } => {
                let send = self.engine.local_message(room, text.clone());
                if send.deliver_locally {
                    self.dispatcher.deliver_room(&self.roster, room, &text).await;
                }
                self.send_outbound(send.outbound).await;
            }
        }
    }

    async fn apply_outcome(&mut self, outcome: Outcome) {
        for delivery in outcome.deliveries {
            self.dispatcher
                .deliver_room(&self.roster, delivery.room, &delivery.payload)
                .await;
        }
        for outbound in outcome.outbound {
            self.send_outbound(outbound).await;
        }
    }

    async fn send_outbound(&self, outbound: Outbound) {
        match outbound {
            Outbound::Unicast { to, frame } => self.send_peer(to, &frame.encode()).await,
            Outbound::Broadcast {
                frame,
                include_self,
            } => {
                let text = frame.encode();
                for member in self.group.members() {
                    if member == self.group.self_id() && !include_self {
                        continue;
                    }
                    self.send_peer(member, &text).await;
                }
            }
        }
    }

    async fn send_peer(&self, to: ServerId, text: &str) {
        match self.roster.peer_addr(to) {
            Some(addr) => {
                if let Err(error) = self.transport.send_to(addr, text).await {
                    warn!(peer = %to, %error, "dropping frame to peer");
                }
            }
            None => warn!(peer = %to, "no address configured for peer"),
        }
    }
}
