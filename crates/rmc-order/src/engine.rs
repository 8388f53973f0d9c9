//! The delivery-ordering engine.
//!
//! One `OrderingEngine` instance per server process owns every piece of
//! ordering state explicitly: the mode, the group, the replica vector
//! clock, the per-room hold-back stores and the total-order coordinator.
//! The server's receive loop feeds it one decoded peer frame at a time and
//! acts on the returned [`Outcome`]; the engine itself never touches the
//! network.
//!
//! All expected conditions are expressed as values: deliverable payloads,
//! frames to send, or an [`EngineError`] the caller drops and logs.

use crate::holdback::{CausalHoldback, FifoHoldback, PendingCausal, TotalHoldback};
use crate::total::{Proposal, TotalOrderCoordinator};
use rmc_core::{Group, Phase, RoomId, ServerId, VectorClock, WireMessage, ROOM_COUNT};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The delivery guarantee a server group runs under, fixed at startup.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderingMode {
    Unordered,
    Fifo,
    Causal,
    Total,
}

impl std::str::FromStr for OrderingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "unordered" => Ok(OrderingMode::Unordered),
            "fifo" => Ok(OrderingMode::Fifo),
            "causal" => Ok(OrderingMode::Causal),
            "total" => Ok(OrderingMode::Total),
            other => Err(format!("unknown ordering mode: {other:?}")),
        }
    }
}

impl std::fmt::Display for OrderingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            OrderingMode::Unordered => "unordered",
            OrderingMode::Fifo => "fifo",
            OrderingMode::Causal => "causal",
            OrderingMode::Total => "total",
        };
        write!(f, "{name}")
    }
}

/// A frame the caller must put on the wire.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outbound {
    /// Send to one group member only (proposals go back to the originator).
    Unicast { to: ServerId, frame: WireMessage },
    /// Send to the whole group. `include_self` is set for total-order NEW
    /// and AGREEMENT frames, where our own copy drives our own state.
    Broadcast {
        frame: WireMessage,
        include_self: bool,
    },
}

/// A payload that became deliverable to the local members of a room.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Delivery {
    pub room: RoomId,
    pub payload: String,
}

/// Everything a single peer frame caused: zero or more local deliveries
/// and zero or more frames to send.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Outcome {
    pub deliveries: Vec<Delivery>,
    pub outbound: Vec<Outbound>,
}

/// The multicast side of a locally originated chat message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalSend {
    /// Whether the payload is delivered to local room members right away.
    /// False only in total order, where local delivery waits on agreement.
    pub deliver_locally: bool,
    pub outbound: Outbound,
}

/// Why a peer frame was rejected. Configuration mismatches, not faults:
/// the receive loop drops the frame and continues.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("sender index {0} is not a member of the group")]
    UnknownSender(usize),

    #[error("proposer index {0} is not a member of the group")]
    UnknownProposer(usize),

    #[error("causal frame carries no vector clock")]
    MissingClock,
}

/// Per-room ordering state. Only the store for the active mode is ever
/// touched; the others stay empty.
#[derive(Debug)]
struct RoomState {
    /// Sequence counter for messages this server originates in the room.
    next_send_seq: u64,
    fifo: FifoHoldback,
    causal: CausalHoldback,
    total: TotalHoldback,
}

impl RoomState {
    fn new(group_size: usize) -> Self {
        RoomState {
            next_send_seq: 0,
            fifo: FifoHoldback::new(group_size),
            causal: CausalHoldback::new(),
            total: TotalHoldback::new(),
        }
    }
}

/// The ordering engine: consumes decoded peer frames, decides what becomes
/// deliverable now, and emits the frames the protocol requires in turn.
#[derive(Debug)]
pub struct OrderingEngine {
    mode: OrderingMode,
    group: Group,
    /// Counts of causally delivered messages per group member. Our own
    /// slot advances at send time, every other slot on delivery.
    clock: VectorClock,
    rooms: Vec<RoomState>,
    coordinator: TotalOrderCoordinator,
}

impl OrderingEngine {
    pub fn new(mode: OrderingMode, group: Group) -> Self {
        let mut rooms = Vec::with_capacity(ROOM_COUNT);
        rooms.resize_with(ROOM_COUNT, || RoomState::new(group.size()));
        OrderingEngine {
            mode,
            group,
            clock: VectorClock::new(group.size()),
            rooms,
            coordinator: TotalOrderCoordinator::new(),
        }
    }

    pub fn mode(&self) -> OrderingMode {
        self.mode
    }

    pub fn group(&self) -> Group {
        self.group
    }

    pub fn clock(&self) -> &VectorClock {
        &self.clock
    }

    /// Buffered entries currently held back for a room, for observability.
    pub fn holdback_depth(&self, room: RoomId) -> usize {
        let state = &self.rooms[room.slot()];
        match self.mode {
            OrderingMode::Unordered => 0,
            OrderingMode::Fifo => state.fifo.depth(),
            OrderingMode::Causal => state.causal.depth(),
            OrderingMode::Total => state.total.depth(),
        }
    }

    /// Prepare the multicast for a chat message originated by a local
    /// client. The payload is already display-formatted by the command
    /// layer; the engine assigns sequencing metadata per the active mode.
    pub fn local_message(&mut self, room: RoomId, payload: String) -> LocalSend {
        let state = &mut self.rooms[room.slot()];
        match self.mode {
            OrderingMode::Unordered => LocalSend {
                deliver_locally: true,
                outbound: Outbound::Broadcast {
                    frame: new_frame(0, None, room, payload),
                    include_self: false,
                },
            },
            OrderingMode::Fifo => {
                state.next_send_seq += 1;
                LocalSend {
                    deliver_locally: true,
                    outbound: Outbound::Broadcast {
                        frame: new_frame(state.next_send_seq, None, room, payload),
                        include_self: false,
                    },
                }
            }
            OrderingMode::Causal => {
                self.clock.increment(self.group.self_id());
                LocalSend {
                    deliver_locally: true,
                    outbound: Outbound::Broadcast {
                        frame: new_frame(0, Some(self.clock.clone()), room, payload),
                        include_self: false,
                    },
                }
            }
            OrderingMode::Total => LocalSend {
                // Local delivery is gated on agreement; our own copy of the
                // NEW frame comes back through the receive loop.
                deliver_locally: false,
                outbound: Outbound::Broadcast {
                    frame: new_frame(0, None, room, payload),
                    include_self: true,
                },
            },
        }
    }

    /// Route one decoded peer frame through the active ordering rule.
    pub fn handle_peer(
        &mut self,
        sender: ServerId,
        frame: WireMessage,
    ) -> Result<Outcome, EngineError> {
        if !self.group.contains(sender) {
            return Err(EngineError::UnknownSender(sender.index()));
        }

        match self.mode {
            OrderingMode::Unordered => Ok(self.handle_unordered(frame)),
            OrderingMode::Fifo => Ok(self.handle_fifo(sender, frame)),
            OrderingMode::Causal => self.handle_causal(sender, frame),
            OrderingMode::Total => self.handle_total(sender, frame),
        }
    }

    /// Stateless pass-through: forward to the room immediately.
    fn handle_unordered(&mut self, frame: WireMessage) -> Outcome {
        Outcome {
            deliveries: vec![Delivery {
                room: frame.room,
                payload: frame.payload,
            }],
            outbound: Vec::new(),
        }
    }

    /// The frame id is the sender's per-room sequence number; buffer and
    /// release every consecutive sequence from next-expected.
    fn handle_fifo(&mut self, sender: ServerId, frame: WireMessage) -> Outcome {
        let room = frame.room;
        let ready = self.rooms[room.slot()]
            .fifo
            .insert_and_drain(sender, frame.id, frame.payload);
        Outcome {
            deliveries: into_deliveries(room, ready),
            outbound: Vec::new(),
        }
    }

    /// Buffer with the carried clock, then scan the room to a fixed point
    /// against our delivery clock.
    fn handle_causal(
        &mut self,
        sender: ServerId,
        frame: WireMessage,
    ) -> Result<Outcome, EngineError> {
        let clock = frame.clock.ok_or(EngineError::MissingClock)?;
        let room = frame.room;
        let state = &mut self.rooms[room.slot()];
        state.causal.insert(PendingCausal {
            sender,
            clock,
            payload: frame.payload,
        });
        let ready = state.causal.drain_ready(&mut self.clock);
        Ok(Outcome {
            deliveries: into_deliveries(room, ready),
            outbound: Vec::new(),
        })
    }

    /// The three-phase propose/agree protocol.
    fn handle_total(
        &mut self,
        sender: ServerId,
        frame: WireMessage,
    ) -> Result<Outcome, EngineError> {
        let room = frame.room;
        match frame.phase {
            // A fresh message: stage it under our local proposal and answer
            // the originator alone with that proposal.
            Phase::New => {
                let proposal = self.rooms[room.slot()].total.stage(frame.payload.clone());
                let reply = WireMessage {
                    id: proposal,
                    clock: None,
                    phase: Phase::Proposal,
                    proposer: self.group.self_id().index(),
                    room,
                    payload: frame.payload,
                };
                Ok(Outcome {
                    deliveries: Vec::new(),
                    outbound: vec![Outbound::Unicast {
                        to: sender,
                        frame: reply,
                    }],
                })
            }
            // We originated this message; collect proposals and broadcast
            // the agreement once every member has answered.
            Phase::Proposal => {
                let proposer = self
                    .group
                    .member(frame.proposer)
                    .ok_or(EngineError::UnknownProposer(frame.proposer))?;
                let winner = self.coordinator.record(
                    &frame.payload,
                    Proposal {
                        id: frame.id,
                        proposer,
                    },
                    self.group.size(),
                );
                let outbound = match winner {
                    Some(agreed) => vec![Outbound::Broadcast {
                        frame: WireMessage {
                            id: agreed.id,
                            clock: None,
                            phase: Phase::Agreement,
                            proposer: agreed.proposer.index(),
                            room,
                            payload: frame.payload,
                        },
                        include_self: true,
                    }],
                    None => Vec::new(),
                };
                Ok(Outcome {
                    deliveries: Vec::new(),
                    outbound,
                })
            }
            // Re-key the candidate under the agreed sequence, then deliver
            // from the front of the queue while the minimum is agreed.
            Phase::Agreement => {
                let proposer = self
                    .group
                    .member(frame.proposer)
                    .ok_or(EngineError::UnknownProposer(frame.proposer))?;
                let state = &mut self.rooms[room.slot()];
                state
                    .total
                    .apply_agreement(frame.id, proposer.index(), &frame.payload);
                let ready = state.total.drain_agreed();
                Ok(Outcome {
                    deliveries: into_deliveries(room, ready),
                    outbound: Vec::new(),
                })
            }
        }
    }
}

fn new_frame(id: u64, clock: Option<VectorClock>, room: RoomId, payload: String) -> WireMessage {
    WireMessage {
        id,
        clock,
        phase: Phase::New,
        proposer: 0,
        room,
        payload,
    }
}

fn into_deliveries(room: RoomId, payloads: Vec<String>) -> Vec<Delivery> {
    payloads
        .into_iter()
        .map(|payload| Delivery { room, payload })
        .collect()
}
