//! End-to-end runs of the receive loop over the in-memory network:
//! clients join rooms, post messages, and every server's local room
//! members see the replicated traffic.

use rmc_order::OrderingMode;
use rmc_server::{MemoryNetwork, MemoryTransport, Server, ServerConfig, Transport};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::timeout;

fn server_addr(i: usize) -> SocketAddr {
    format!("10.1.0.{i}:7000").parse().unwrap()
}

fn client_addr(i: usize) -> SocketAddr {
    format!("10.2.0.{i}:9000").parse().unwrap()
}

/// Spawn `size` servers on a shared in-memory network. The returned sender
/// shuts the loops down when dropped or flipped.
fn start_cluster(
    size: usize,
    mode: OrderingMode,
    network: &MemoryNetwork,
) -> watch::Sender<bool> {
    let list: String = (1..=size).map(|i| format!("{}\n", server_addr(i))).collect();
    let (shutdown, _) = watch::channel(false);
    for i in 1..=size {
        let config = ServerConfig::parse(&list, i).unwrap();
        let transport = Arc::new(network.endpoint(config.bind));
        let mut server = Server::new(&config, mode, transport).unwrap();
        let receiver = shutdown.subscribe();
        tokio::spawn(async move {
            let _ = server.run(receiver).await;
        });
    }
    shutdown
}

async fn expect_text(endpoint: &MemoryTransport) -> String {
    let (_, text) = timeout(Duration::from_secs(5), endpoint.recv())
        .await
        .expect("timed out waiting for a datagram")
        .expect("endpoint closed");
    text
}

#[tokio::test]
async fn client_commands_round_trip() {
    let network = MemoryNetwork::new();
    let _cluster = start_cluster(1, OrderingMode::Unordered, &network);
    let client = network.endpoint(client_addr(1));

    client.send_to(server_addr(1), "/join 1").await.unwrap();
    assert_eq!(expect_text(&client).await, "+OK You are now in chat room #1");

    client.send_to(server_addr(1), "/nick alice").await.unwrap();
    assert_eq!(expect_text(&client).await, "+OK Nickname set to 'alice'");

    // chat echoes back to the sender's own room
    client.send_to(server_addr(1), "hello").await.unwrap();
    assert_eq!(expect_text(&client).await, "<alice> hello");
}

#[tokio::test]
async fn rooms_replicate_across_servers() {
    let network = MemoryNetwork::new();
    let _cluster = start_cluster(2, OrderingMode::Unordered, &network);
    let near = network.endpoint(client_addr(1));
    let far = network.endpoint(client_addr(2));

    near.send_to(server_addr(1), "/join 3").await.unwrap();
    expect_text(&near).await;
    far.send_to(server_addr(2), "/join 3").await.unwrap();
    expect_text(&far).await;

    near.send_to(server_addr(1), "over here").await.unwrap();
    assert_eq!(expect_text(&near).await, "<10.2.0.1:9000> over here");
    assert_eq!(expect_text(&far).await, "<10.2.0.1:9000> over here");
}

#[tokio::test]
async fn rooms_are_isolated() {
    let network = MemoryNetwork::new();
    let _cluster = start_cluster(2, OrderingMode::Fifo, &network);
    let in_room = network.endpoint(client_addr(1));
    let elsewhere = network.endpoint(client_addr(2));

    in_room.send_to(server_addr(1), "/join 1").await.unwrap();
    expect_text(&in_room).await;
    elsewhere.send_to(server_addr(2), "/join 2").await.unwrap();
    expect_text(&elsewhere).await;

    in_room.send_to(server_addr(1), "room one only").await.unwrap();
    assert_eq!(expect_text(&in_room).await, "<10.2.0.1:9000> room one only");

    // the other room hears nothing; a follow-up reply proves the silence
    elsewhere.send_to(server_addr(2), "/part").await.unwrap();
    assert_eq!(expect_text(&elsewhere).await, "+OK You have left chat room #2");
}

#[tokio::test]
async fn total_order_reaches_the_originating_server_too() {
    let network = MemoryNetwork::new();
    let _cluster = start_cluster(3, OrderingMode::Total, &network);
    let mut clients = Vec::new();
    for i in 1..=3 {
        let client = network.endpoint(client_addr(i));
        client.send_to(server_addr(i), "/join 5").await.unwrap();
        expect_text(&client).await;
        clients.push(client);
    }

    // The originator's own delivery waits for agreement, then everyone
    // gets the same message.
    clients[0].send_to(server_addr(1), "agreed?").await.unwrap();
    for client in &clients {
        assert_eq!(expect_text(client).await, "<10.2.0.1:9000> agreed?");
    }
}

#[tokio::test]
async fn malformed_peer_frames_are_dropped() {
    let network = MemoryNetwork::new();
    // Two-server list, but only server 1 runs; we impersonate server 2.
    let list = format!("{}\n{}\n", server_addr(1), server_addr(2));
    let config = ServerConfig::parse(&list, 1).unwrap();
    let transport = Arc::new(network.endpoint(config.bind));
    let mut server = Server::new(&config, OrderingMode::Unordered, transport).unwrap();
    let (shutdown, receiver) = watch::channel(false);
    tokio::spawn(async move {
        let _ = server.run(receiver).await;
    });

    let client = network.endpoint(client_addr(1));
    client.send_to(server_addr(1), "/join 1").await.unwrap();
    expect_text(&client).await;

    let peer = network.endpoint(server_addr(2));
    peer.send_to(server_addr(1), "not,a,frame").await.unwrap();
    peer.send_to(server_addr(1), "0,n/a,0,0,1,survived").await.unwrap();

    // the well-formed frame still lands after the garbage
    assert_eq!(expect_text(&client).await, "survived");
    drop(shutdown);
}
