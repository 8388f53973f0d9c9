//! Deterministic in-process group harness.
//!
//! Wires N ordering engines together over a simulated datagram link that
//! can lose, duplicate and reorder frames, with a per-replica delivery
//! log. Frames cross the link as encoded wire text, so the codec is
//! exercised end to end. Used by the integration tests and the root
//! simulation binary to check the ordering properties under adverse
//! delivery.

use crate::engine::{Delivery, Outbound, OrderingEngine, OrderingMode};
use rmc_core::{Group, RoomId, ServerId, WireMessage};
use std::collections::VecDeque;

/// Fault injection rates for the simulated link. The seed fixes the fault
/// schedule, so a failing run replays exactly.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Probability of dropping a frame (0.0 - 1.0).
    pub loss_rate: f64,
    /// Probability of duplicating a frame (0.0 - 1.0).
    pub dup_rate: f64,
    /// Probability of a frame jumping the queue (0.0 - 1.0).
    pub reorder_rate: f64,
    pub seed: u64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        LinkConfig {
            loss_rate: 0.0,
            dup_rate: 0.0,
            reorder_rate: 0.0,
            seed: 42,
        }
    }
}

impl LinkConfig {
    pub fn reordering(reorder_rate: f64) -> Self {
        LinkConfig {
            reorder_rate,
            ..Default::default()
        }
    }

    /// Every failure mode at once.
    pub fn chaotic() -> Self {
        LinkConfig {
            loss_rate: 0.1,
            dup_rate: 0.2,
            reorder_rate: 0.3,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone)]
struct Datagram {
    from: ServerId,
    to: ServerId,
    text: String,
}

/// The simulated link: a frame queue with seeded, reproducible faults.
#[derive(Debug)]
pub struct NetLink {
    in_flight: VecDeque<Datagram>,
    lost: Vec<Datagram>,
    config: LinkConfig,
    rng_state: u64,
}

impl NetLink {
    pub fn new(config: LinkConfig) -> Self {
        // xorshift64 degenerates on a zero state
        let rng_state = config.seed.max(1);
        NetLink {
            in_flight: VecDeque::new(),
            lost: Vec::new(),
            config,
            rng_state,
        }
    }

    fn next_u64(&mut self) -> u64 {
        // xorshift64
        self.rng_state ^= self.rng_state << 13;
        self.rng_state ^= self.rng_state >> 7;
        self.rng_state ^= self.rng_state << 17;
        self.rng_state
    }

    fn chance(&mut self, rate: f64) -> bool {
        (self.next_u64() >> 11) as f64 / ((1u64 << 53) as f64) < rate
    }

    fn send(&mut self, datagram: Datagram) {
        if self.chance(self.config.loss_rate) {
            self.lost.push(datagram);
            return;
        }
        let copies = if self.chance(self.config.dup_rate) { 2 } else { 1 };
        for _ in 0..copies {
            self.in_flight.push_back(datagram.clone());
            // a queue jump swaps the new arrival with a random earlier frame
            if self.in_flight.len() > 1 && self.chance(self.config.reorder_rate) {
                let last = self.in_flight.len() - 1;
                let target = (self.next_u64() % last as u64) as usize;
                self.in_flight.swap(target, last);
            }
        }
    }

    fn receive(&mut self) -> Option<Datagram> {
        self.in_flight.pop_front()
    }

    /// Put lost frames back in flight, simulating retransmission.
    pub fn retransmit_lost(&mut self) {
        for datagram in self.lost.drain(..) {
            self.in_flight.push_back(datagram);
        }
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    pub fn lost_count(&self) -> usize {
        self.lost.len()
    }
}

/// A group of replicas joined by a [`NetLink`], each with its own engine
/// and delivery log.
pub struct ReplicaGroup {
    engines: Vec<OrderingEngine>,
    link: NetLink,
    logs: Vec<Vec<Delivery>>,
}

impl ReplicaGroup {
    pub fn new(size: usize, mode: OrderingMode, config: LinkConfig) -> Self {
        let engines = (1..=size)
            .map(|i| {
                let self_id = ServerId::new(i).expect("index starts at 1");
                let group = Group::new(size, self_id).expect("id within group");
                OrderingEngine::new(mode, group)
            })
            .collect();
        ReplicaGroup {
            engines,
            link: NetLink::new(config),
            logs: vec![Vec::new(); size],
        }
    }

    pub fn size(&self) -> usize {
        self.engines.len()
    }

    pub fn engine(&self, id: ServerId) -> &OrderingEngine {
        &self.engines[id.slot()]
    }

    /// A client of `origin` posts chat text to a room.
    pub fn post(&mut self, origin: ServerId, room: RoomId, text: &str) {
        let send = self.engines[origin.slot()].local_message(room, text.to_string());
        if send.deliver_locally {
            self.logs[origin.slot()].push(Delivery {
                room,
                payload: text.to_string(),
            });
        }
        self.dispatch(origin, send.outbound);
    }

    fn dispatch(&mut self, origin: ServerId, outbound: Outbound) {
        match outbound {
            Outbound::Unicast { to, frame } => {
                self.link.send(Datagram {
                    from: origin,
                    to,
                    text: frame.encode(),
                });
            }
            Outbound::Broadcast {
                frame,
                include_self,
            } => {
                let text = frame.encode();
                let members: Vec<ServerId> = self.engines[origin.slot()]
                    .group()
                    .members()
                    .filter(|m| include_self || *m != origin)
                    .collect();
                for to in members {
                    self.link.send(Datagram {
                        from: origin,
                        to,
                        text: text.clone(),
                    });
                }
            }
        }
    }

    /// Deliver one in-flight frame to its destination engine.
    /// Returns false when the link is drained.
    pub fn step(&mut self) -> bool {
        let Some(datagram) = self.link.receive() else {
            return false;
        };
        let size = self.size();
        match WireMessage::parse(&datagram.text, size) {
            Ok(frame) => {
                match self.engines[datagram.to.slot()].handle_peer(datagram.from, frame) {
                    Ok(outcome) => {
                        self.logs[datagram.to.slot()].extend(outcome.deliveries);
                        for outbound in outcome.outbound {
                            self.dispatch(datagram.to, outbound);
                        }
                    }
                    // Drop-and-continue, as the server loop would.
                    Err(_) => {}
                }
            }
            Err(_) => {}
        }
        true
    }

    /// Drain the link, retransmitting lost frames until nothing remains.
    pub fn run_to_quiescence(&mut self) {
        loop {
            while self.step() {}
            if self.link.lost_count() == 0 {
                break;
            }
            self.link.retransmit_lost();
        }
    }

    pub fn link(&mut self) -> &mut NetLink {
        &mut self.link
    }

    /// Every delivery a replica made, in order.
    pub fn log(&self, id: ServerId) -> &[Delivery] {
        &self.logs[id.slot()]
    }

    /// One replica's delivery order within a single room.
    pub fn room_log(&self, id: ServerId, room: RoomId) -> Vec<&str> {
        self.logs[id.slot()]
            .iter()
            .filter(|d| d.room == room)
            .map(|d| d.payload.as_str())
            .collect()
    }

    /// Whether every replica saw the identical delivery order for a room.
    pub fn consistent_order(&self, room: RoomId) -> bool {
        let mut logs = (1..=self.size())
            .filter_map(ServerId::new)
            .map(|id| self.room_log(id, room));
        match logs.next() {
            Some(first) => logs.all(|log| log == first),
            None => true,
        }
    }

    /// Total hold-back depth across all replicas and rooms.
    pub fn total_holdback(&self) -> usize {
        self.engines
            .iter()
            .map(|e| RoomId::all().map(|r| e.holdback_depth(r)).sum::<usize>())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sid(i: usize) -> ServerId {
        ServerId::new(i).unwrap()
    }

    fn room(n: usize) -> RoomId {
        RoomId::new(n).unwrap()
    }

    #[test]
    fn clean_link_delivers_everywhere() {
        let mut group = ReplicaGroup::new(3, OrderingMode::Fifo, LinkConfig::default());
        group.post(sid(1), room(1), "hello");
        group.run_to_quiescence();
        for i in 1..=3 {
            assert_eq!(group.room_log(sid(i), room(1)), ["hello"]);
        }
    }

    #[test]
    fn equal_seeds_replay_the_same_schedule() {
        let run = |seed: u64| {
            let config = LinkConfig {
                reorder_rate: 0.7,
                seed,
                ..Default::default()
            };
            let mut group = ReplicaGroup::new(3, OrderingMode::Unordered, config);
            for i in 0..12 {
                group.post(sid(1), room(1), &format!("m{i}"));
            }
            group.run_to_quiescence();
            group
                .room_log(sid(2), room(1))
                .iter()
                .map(|text| text.to_string())
                .collect::<Vec<_>>()
        };
        assert_eq!(run(99), run(99));
    }

    #[test]
    fn lost_frames_arrive_after_retransmission() {
        let mut group = ReplicaGroup::new(2, OrderingMode::Fifo, LinkConfig {
            loss_rate: 1.0,
            ..Default::default()
        });
        group.post(sid(1), room(1), "m");
        while group.step() {}
        assert!(group.room_log(sid(2), room(1)).is_empty());

        group.link().retransmit_lost();
        group.run_to_quiescence();
        assert_eq!(group.room_log(sid(2), room(1)), ["m"]);
    }
}
