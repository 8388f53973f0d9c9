//! The peer-to-peer wire codec.
//!
//! Every frame exchanged between servers is a single comma-delimited text
//! record of exactly six fields:
//!
//! ```text
//! <id>,<clock|"n/a">,<phase 0|1|2>,<proposer>,<room>,<payload>
//! ```
//!
//! The payload is the final field and is never split further, so chat text
//! may itself contain commas. Frames are validated once here at the
//! boundary; everything past the codec operates on the typed record. A
//! malformed frame is a [`DecodeError`] the receive loop drops and logs,
//! never a crash.

use crate::clock::VectorClock;
use crate::group::{RoomId, ROOM_COUNT};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of comma-delimited fields in a frame.
pub const WIRE_FIELDS: usize = 6;

/// Placeholder for the clock field when the mode carries no vector clock.
const NO_CLOCK: &str = "n/a";

/// Protocol phase of a frame. Only total order uses `Proposal` and
/// `Agreement`; every other mode sends `New` frames exclusively.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    New,
    Proposal,
    Agreement,
}

impl Phase {
    pub fn code(self) -> u8 {
        match self {
            Phase::New => 0,
            Phase::Proposal => 1,
            Phase::Agreement => 2,
        }
    }

    pub fn from_code(code: u64) -> Option<Self> {
        match code {
            0 => Some(Phase::New),
            1 => Some(Phase::Proposal),
            2 => Some(Phase::Agreement),
            _ => None,
        }
    }
}

/// A decoded peer multicast frame.
///
/// `id` carries the per-sender sequence number in FIFO mode and the
/// proposed or agreed number in total order; it is `0` otherwise.
/// `proposer` is the 1-based index of the proposing server in `Proposal`
/// and `Agreement` frames and `0` in `New` frames.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireMessage {
    pub id: u64,
    pub clock: Option<VectorClock>,
    pub phase: Phase,
    pub proposer: usize,
    pub room: RoomId,
    pub payload: String,
}

/// Why a frame was rejected at the decode boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("expected {WIRE_FIELDS} comma-delimited fields, found {0}")]
    FieldCount(usize),

    #[error("non-numeric {field} field: {value:?}")]
    BadInteger { field: &'static str, value: String },

    #[error("unknown phase code {0}")]
    BadPhase(u64),

    #[error("room {0} outside the fixed range 1..={ROOM_COUNT}")]
    RoomOutOfRange(u64),

    #[error("malformed vector clock field: {0:?}")]
    BadClock(String),

    #[error("vector clock has {found} entries, group has {expected}")]
    ClockLength { found: usize, expected: usize },
}

impl WireMessage {
    /// Render the frame as its wire text.
    pub fn encode(&self) -> String {
        let clock = match &self.clock {
            Some(vc) => vc.to_wire(),
            None => NO_CLOCK.to_string(),
        };
        format!(
            "{},{},{},{},{},{}",
            self.id,
            clock,
            self.phase.code(),
            self.proposer,
            self.room.number(),
            self.payload
        )
    }

    /// Parse and validate a frame against the configured group size.
    pub fn parse(text: &str, group_size: usize) -> Result<Self, DecodeError> {
        let fields: Vec<&str> = text.splitn(WIRE_FIELDS, ',').collect();
        if fields.len() != WIRE_FIELDS {
            return Err(DecodeError::FieldCount(fields.len()));
        }

        let id = parse_int(fields[0], "id")?;
        let phase_code = parse_int(fields[2], "phase")?;
        let phase = Phase::from_code(phase_code).ok_or(DecodeError::BadPhase(phase_code))?;
        let proposer = parse_int(fields[3], "proposer")? as usize;
        let room_number = parse_int(fields[4], "room")?;
        let room = usize::try_from(room_number)
            .ok()
            .and_then(RoomId::new)
            .ok_or(DecodeError::RoomOutOfRange(room_number))?;

        let clock = if fields[1] == NO_CLOCK {
            None
        } else {
            let vc = VectorClock::from_wire(fields[1])
                .ok_or_else(|| DecodeError::BadClock(fields[1].to_string()))?;
            if vc.len() != group_size {
                return Err(DecodeError::ClockLength {
                    found: vc.len(),
                    expected: group_size,
                });
            }
            Some(vc)
        };

        Ok(WireMessage {
            id,
            clock,
            phase,
            proposer,
            room,
            payload: fields[5].to_string(),
        })
    }
}

fn parse_int(text: &str, field: &'static str) -> Result<u64, DecodeError> {
    text.parse().map_err(|_| DecodeError::BadInteger {
        field,
        value: text.to_string(),
    })
}
