//! Hold-back stores: per-room buffering for messages that are not yet
//! deliverable under the active ordering rule.
//!
//! Each room owns one store per ordering mode. Entries are created when a
//! frame arrives out of turn and destroyed the moment they become
//! deliverable; nothing persists past delivery. A gap that never fills
//! leaves its successors buffered indefinitely - that is a liveness
//! property of the protocols, surfaced only through the depth accessors.

use rmc_core::{ServerId, VectorClock};
use std::collections::{BTreeMap, HashMap};

/// FIFO hold-back for one room: a sparse sequence map per sender plus the
/// next-expected counter.
///
/// Messages from one sender are delivered in strictly increasing sequence
/// order; senders never block each other.
#[derive(Debug, Default)]
pub struct FifoHoldback {
    senders: Vec<FifoSenderState>,
}

#[derive(Debug, Default)]
struct FifoSenderState {
    /// Highest sequence delivered so far; next expected is `delivered + 1`.
    delivered: u64,
    pending: HashMap<u64, String>,
}

impl FifoHoldback {
    pub fn new(group_size: usize) -> Self {
        let mut senders = Vec::with_capacity(group_size);
        senders.resize_with(group_size, FifoSenderState::default);
        FifoHoldback { senders }
    }

    /// Buffer a frame, then deliver every consecutive sequence starting at
    /// next-expected. Stale duplicates (sequence already delivered) are
    /// discarded so re-transmission can only delay, never corrupt.
    pub fn insert_and_drain(&mut self, sender: ServerId, seq: u64, payload: String) -> Vec<String> {
        let state = &mut self.senders[sender.slot()];
        if seq > state.delivered {
            state.pending.insert(seq, payload);
        }

        let mut ready = Vec::new();
        while let Some(text) = state.pending.remove(&(state.delivered + 1)) {
            state.delivered += 1;
            ready.push(text);
        }
        ready
    }

    /// Total buffered entries across all senders.
    pub fn depth(&self) -> usize {
        self.senders.iter().map(|s| s.pending.len()).sum()
    }
}

/// One buffered causal message: the payload plus the full vector clock its
/// sender attached at multicast time.
#[derive(Debug, Clone)]
pub struct PendingCausal {
    pub sender: ServerId,
    pub clock: VectorClock,
    pub payload: String,
}

/// Causal hold-back for one room: an unordered pending set scanned to a
/// fixed point against the replica's delivery clock.
#[derive(Debug, Default)]
pub struct CausalHoldback {
    pending: Vec<PendingCausal>,
}

impl CausalHoldback {
    pub fn new() -> Self {
        CausalHoldback::default()
    }

    pub fn insert(&mut self, message: PendingCausal) {
        self.pending.push(message);
    }

    /// Deliver every message whose clock is satisfied by `observed`.
    ///
    /// A message is deliverable when its sender slot equals the observed
    /// count plus one and every other slot is at or below the observed
    /// count. Each delivery bumps `observed` and may unblock others, so the
    /// scan repeats until a pass makes no progress. Re-running with no new
    /// arrivals delivers nothing further.
    pub fn drain_ready(&mut self, observed: &mut VectorClock) -> Vec<String> {
        let mut ready = Vec::new();
        loop {
            let position = self.pending.iter().position(|m| deliverable(m, observed));
            match position {
                Some(i) => {
                    let message = self.pending.swap_remove(i);
                    observed.increment(message.sender);
                    ready.push(message.payload);
                }
                None => break,
            }
        }
        ready
    }

    pub fn depth(&self) -> usize {
        self.pending.len()
    }
}

fn deliverable(message: &PendingCausal, observed: &VectorClock) -> bool {
    if message.clock.get(message.sender) != observed.get(message.sender) + 1 {
        return false;
    }
    (1..=observed.len())
        .filter_map(ServerId::new)
        .filter(|id| *id != message.sender)
        .all(|id| message.clock.get(id) <= observed.get(id))
}

/// Ordering key for total-order candidates: agreed (or proposed) number
/// first, proposing server as the tie-break. Derived `Ord` gives exactly
/// the id-ascending, proposer-ascending global order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct SequenceKey {
    pub id: u64,
    pub proposer: usize,
}

#[derive(Debug, Clone)]
struct Candidate {
    payload: String,
    deliverable: bool,
}

/// Total-order hold-back for one room: candidates keyed by their current
/// (provisional or agreed) sequence, plus the proposal counters.
///
/// A provisional candidate is keyed under its local proposal with proposer
/// 0; agreement re-keys it by removing the old entry and inserting the new
/// one, never by mutating a key in place.
#[derive(Debug, Default)]
pub struct TotalHoldback {
    queue: BTreeMap<SequenceKey, Candidate>,
    highest_proposed: u64,
    highest_agreed: u64,
}

impl TotalHoldback {
    pub fn new() -> Self {
        TotalHoldback::default()
    }

    /// Record a NEW-phase payload and return the local proposal number:
    /// `max(highest proposed, highest agreed) + 1`.
    pub fn stage(&mut self, payload: String) -> u64 {
        self.highest_proposed = self.highest_proposed.max(self.highest_agreed) + 1;
        self.queue.insert(
            SequenceKey {
                id: self.highest_proposed,
                proposer: 0,
            },
            Candidate {
                payload,
                deliverable: false,
            },
        );
        self.highest_proposed
    }

    /// Re-key the candidate holding `payload` under the agreed sequence and
    /// mark it deliverable.
    pub fn apply_agreement(&mut self, id: u64, proposer: usize, payload: &str) {
        let old_key = self
            .queue
            .iter()
            .find(|(_, c)| c.payload == payload)
            .map(|(k, _)| *k);
        if let Some(key) = old_key {
            let candidate = self.queue.remove(&key);
            if let Some(mut candidate) = candidate {
                candidate.deliverable = true;
                self.queue.insert(SequenceKey { id, proposer }, candidate);
            }
        }
        self.highest_agreed = self.highest_agreed.max(id);
    }

    /// Pop candidates from the front of the queue while the minimum key is
    /// marked deliverable. A lower-keyed candidate that is still awaiting
    /// agreement blocks everything behind it.
    pub fn drain_agreed(&mut self) -> Vec<String> {
        let mut ready = Vec::new();
        while let Some((key, candidate)) = self.queue.first_key_value() {
            if !candidate.deliverable {
                break;
            }
            let key = *key;
            if let Some(candidate) = self.queue.remove(&key) {
                ready.push(candidate.payload);
            }
        }
        ready
    }

    pub fn depth(&self) -> usize {
        self.queue.len()
    }

    pub fn highest_proposed(&self) -> u64 {
        self.highest_proposed
    }

    pub fn highest_agreed(&self) -> u64 {
        self.highest_agreed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sid(i: usize) -> ServerId {
        ServerId::new(i).unwrap()
    }

    #[test]
    fn fifo_delivers_in_sequence() {
        let mut fifo = FifoHoldback::new(3);
        assert_eq!(fifo.insert_and_drain(sid(1), 1, "a".into()), vec!["a"]);
        assert_eq!(fifo.insert_and_drain(sid(1), 2, "b".into()), vec!["b"]);
        assert_eq!(fifo.depth(), 0);
    }

    #[test]
    fn fifo_buffers_gap_then_releases() {
        let mut fifo = FifoHoldback::new(3);
        assert!(fifo.insert_and_drain(sid(1), 2, "b".into()).is_empty());
        assert_eq!(fifo.depth(), 1);
        assert_eq!(
            fifo.insert_and_drain(sid(1), 1, "a".into()),
            vec!["a", "b"]
        );
        assert_eq!(fifo.depth(), 0);
    }

    #[test]
    fn fifo_senders_are_independent() {
        let mut fifo = FifoHoldback::new(2);
        assert!(fifo.insert_and_drain(sid(1), 2, "a2".into()).is_empty());
        assert_eq!(fifo.insert_and_drain(sid(2), 1, "b1".into()), vec!["b1"]);
    }

    #[test]
    fn fifo_drops_stale_duplicate() {
        let mut fifo = FifoHoldback::new(1);
        fifo.insert_and_drain(sid(1), 1, "a".into());
        assert!(fifo.insert_and_drain(sid(1), 1, "a".into()).is_empty());
        assert_eq!(fifo.depth(), 0);
    }

    #[test]
    fn causal_blocks_until_predecessor() {
        let mut holdback = CausalHoldback::new();
        let mut observed = VectorClock::new(2);

        // m2 from server 1 depends on m1 from server 1
        let mut c2 = VectorClock::new(2);
        c2.increment(sid(1));
        c2.increment(sid(1));
        holdback.insert(PendingCausal {
            sender: sid(1),
            clock: c2,
            payload: "m2".into(),
        });
        assert!(holdback.drain_ready(&mut observed).is_empty());
        assert_eq!(holdback.depth(), 1);

        let mut c1 = VectorClock::new(2);
        c1.increment(sid(1));
        holdback.insert(PendingCausal {
            sender: sid(1),
            clock: c1,
            payload: "m1".into(),
        });
        assert_eq!(holdback.drain_ready(&mut observed), vec!["m1", "m2"]);
        assert_eq!(observed.get(sid(1)), 2);
    }

    #[test]
    fn causal_rescan_without_arrivals_is_idempotent() {
        let mut holdback = CausalHoldback::new();
        let mut observed = VectorClock::new(2);
        let mut c1 = VectorClock::new(2);
        c1.increment(sid(1));
        holdback.insert(PendingCausal {
            sender: sid(1),
            clock: c1,
            payload: "m1".into(),
        });
        assert_eq!(holdback.drain_ready(&mut observed).len(), 1);
        let before = observed.clone();
        assert!(holdback.drain_ready(&mut observed).is_empty());
        assert_eq!(observed, before);
    }

    #[test]
    fn empty_holdback_scans_yield_nothing() {
        let mut observed = VectorClock::new(3);
        assert!(CausalHoldback::new().drain_ready(&mut observed).is_empty());
        assert!(TotalHoldback::new().drain_agreed().is_empty());
        assert_eq!(FifoHoldback::new(3).depth(), 0);
    }

    #[test]
    fn total_stage_advances_past_agreed() {
        let mut total = TotalHoldback::new();
        assert_eq!(total.stage("a".into()), 1);
        total.apply_agreement(5, 2, "a");
        assert_eq!(total.stage("b".into()), 6);
    }

    #[test]
    fn total_agreement_rekeys_and_delivers_in_order() {
        let mut total = TotalHoldback::new();
        total.stage("first".into());
        total.stage("second".into());

        // "second" agreed at a higher sequence than "first"
        total.apply_agreement(3, 2, "second");
        assert!(total.drain_agreed().is_empty(), "first still blocks");

        total.apply_agreement(2, 1, "first");
        assert_eq!(total.drain_agreed(), vec!["first", "second"]);
        assert_eq!(total.depth(), 0);
        assert_eq!(total.highest_agreed(), 3);
    }

    #[test]
    fn total_tie_breaks_by_proposer() {
        let mut total = TotalHoldback::new();
        total.stage("x".into());
        total.stage("y".into());
        total.apply_agreement(4, 2, "y");
        total.apply_agreement(4, 1, "x");
        assert_eq!(total.drain_agreed(), vec!["x", "y"]);
    }

    #[test]
    fn total_rescan_without_agreement_is_idempotent() {
        let mut total = TotalHoldback::new();
        total.stage("pending".into());
        assert!(total.drain_agreed().is_empty());
        assert!(total.drain_agreed().is_empty());
        assert_eq!(total.depth(), 1);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Whatever order a sender's sequences arrive in, the drained
            /// output is always 1..=n in order with nothing left buffered.
            #[test]
            fn fifo_any_arrival_order_drains_in_sequence(
                arrival in Just((1u64..=12).collect::<Vec<_>>()).prop_shuffle()
            ) {
                let mut fifo = FifoHoldback::new(1);
                let mut delivered = Vec::new();
                for seq in &arrival {
                    delivered.extend(fifo.insert_and_drain(sid(1), *seq, format!("m{seq}")));
                }
                let expected: Vec<String> =
                    (1..=arrival.len() as u64).map(|s| format!("m{s}")).collect();
                prop_assert_eq!(delivered, expected);
                prop_assert_eq!(fifo.depth(), 0);
            }

            /// A single sender's causal chain drains fully in send order
            /// from any arrival permutation.
            #[test]
            fn causal_chain_any_arrival_order_drains_in_send_order(
                arrival in Just((1u64..=8).collect::<Vec<_>>()).prop_shuffle()
            ) {
                let mut holdback = CausalHoldback::new();
                let mut observed = VectorClock::new(2);
                let mut delivered = Vec::new();
                for position in &arrival {
                    let mut clock = VectorClock::new(2);
                    for _ in 0..*position {
                        clock.increment(sid(1));
                    }
                    holdback.insert(PendingCausal {
                        sender: sid(1),
                        clock,
                        payload: format!("m{position}"),
                    });
                    delivered.extend(holdback.drain_ready(&mut observed));
                }
                let expected: Vec<String> =
                    (1..=arrival.len() as u64).map(|p| format!("m{p}")).collect();
                prop_assert_eq!(delivered, expected);
                prop_assert_eq!(holdback.depth(), 0);
            }
        }
    }
}
