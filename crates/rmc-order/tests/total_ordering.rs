//! Total order: every replica delivers agreed messages in one identical
//! global order, keyed by (agreed id, proposer) ascending.

use rmc_core::{RoomId, ServerId};
use rmc_order::{LinkConfig, OrderingMode, ReplicaGroup};

fn sid(i: usize) -> ServerId {
    ServerId::new(i).unwrap()
}

fn room(n: usize) -> RoomId {
    RoomId::new(n).unwrap()
}

/// One message runs the full NEW -> PROPOSAL -> AGREEMENT round and lands
/// at every replica, including the originator's own clients.
#[test]
fn single_message_reaches_everyone_in_agreement_order() {
    let mut group = ReplicaGroup::new(3, OrderingMode::Total, LinkConfig::default());
    group.post(sid(1), room(1), "hello");

    // Nothing is delivered anywhere before agreement, the originator
    // included.
    assert!(group.room_log(sid(1), room(1)).is_empty());

    group.run_to_quiescence();
    for i in 1..=3 {
        assert_eq!(group.room_log(sid(i), room(1)), ["hello"]);
    }
    assert_eq!(group.total_holdback(), 0);
}

/// Two sequential rounds: the second agreement lands strictly after the
/// first in every replica's log.
#[test]
fn sequential_rounds_extend_the_global_order() {
    let mut group = ReplicaGroup::new(3, OrderingMode::Total, LinkConfig::default());

    group.post(sid(2), room(1), "warm-up");
    group.run_to_quiescence();

    group.post(sid(1), room(1), "contested");
    group.run_to_quiescence();

    for i in 1..=3 {
        assert_eq!(
            group.room_log(sid(i), room(1)),
            ["warm-up", "contested"]
        );
    }
}

/// Concurrent posts from every replica: the relative delivery order is
/// identical at all replicas, whatever it turns out to be.
#[test]
fn concurrent_posts_deliver_identically_everywhere() {
    let mut group = ReplicaGroup::new(3, OrderingMode::Total, LinkConfig::default());
    group.post(sid(1), room(4), "from-1");
    group.post(sid(2), room(4), "from-2");
    group.post(sid(3), room(4), "from-3");
    group.run_to_quiescence();

    assert!(group.consistent_order(room(4)));
    assert_eq!(group.room_log(sid(1), room(4)).len(), 3);
    assert_eq!(group.total_holdback(), 0);
}

/// Same property under a reordering link: agreements and proposals may
/// cross on the wire, the agreed global order still matches everywhere.
#[test]
fn identical_order_survives_reordering_link() {
    let mut group = ReplicaGroup::new(3, OrderingMode::Total, LinkConfig::reordering(0.6));
    for i in 0..12 {
        group.post(sid(i % 3 + 1), room(1), &format!("m{i}"));
    }
    group.run_to_quiescence();

    assert!(group.consistent_order(room(1)));
    assert_eq!(group.room_log(sid(1), room(1)).len(), 12);
    assert_eq!(group.total_holdback(), 0);
}

/// Rooms order independently: traffic in one room never blocks another.
#[test]
fn rooms_are_independent_ordering_domains() {
    let mut group = ReplicaGroup::new(2, OrderingMode::Total, LinkConfig::default());
    group.post(sid(1), room(1), "room-one");
    group.post(sid(2), room(16), "room-sixteen");
    group.run_to_quiescence();

    for i in 1..=2 {
        assert_eq!(group.room_log(sid(i), room(1)), ["room-one"]);
        assert_eq!(group.room_log(sid(i), room(16)), ["room-sixteen"]);
    }
    assert!(group.consistent_order(room(1)));
    assert!(group.consistent_order(room(16)));
}
