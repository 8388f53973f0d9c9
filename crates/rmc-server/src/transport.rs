//! Datagram transport abstractions.
//!
//! The server talks to peers and clients through one [`Transport`]: a UDP
//! socket in production, a channel-backed in-memory network in tests.
//! Frames are short text datagrams; a send is fire-and-forget.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, Mutex};

/// Largest datagram the receive loop will accept.
pub const MAX_DATAGRAM: usize = 2048;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no route to {0}")]
    UnknownDestination(SocketAddr),

    #[error("transport closed")]
    Closed,
}

/// Abstract datagram transport.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Send one text datagram. Best effort; an error reports a local
    /// failure, never a delivery guarantee.
    async fn send_to(&self, addr: SocketAddr, text: &str) -> Result<(), TransportError>;

    /// Block until the next datagram arrives.
    async fn recv(&self) -> Result<(SocketAddr, String), TransportError>;

    /// The address peers and clients reach us at.
    fn local_addr(&self) -> SocketAddr;
}

/// UDP transport over a tokio socket.
pub struct UdpTransport {
    socket: UdpSocket,
    local: SocketAddr,
}

impl UdpTransport {
    pub async fn bind(addr: SocketAddr) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind(addr).await?;
        let local = socket.local_addr()?;
        Ok(UdpTransport { socket, local })
    }
}

#[async_trait]
impl Transport for UdpTransport {
    async fn send_to(&self, addr: SocketAddr, text: &str) -> Result<(), TransportError> {
        self.socket.send_to(text.as_bytes(), addr).await?;
        Ok(())
    }

    async fn recv(&self) -> Result<(SocketAddr, String), TransportError> {
        let mut buffer = [0u8; MAX_DATAGRAM];
        let (len, addr) = self.socket.recv_from(&mut buffer).await?;
        let text = String::from_utf8_lossy(&buffer[..len]).into_owned();
        Ok((addr, text))
    }

    fn local_addr(&self) -> SocketAddr {
        self.local
    }
}

type Inbox = mpsc::Sender<(SocketAddr, String)>;

/// A shared address space for in-memory transports.
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    routes: Arc<RwLock<HashMap<SocketAddr, Inbox>>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        MemoryNetwork::default()
    }

    /// Open an endpoint at `addr` on this network.
    pub fn endpoint(&self, addr: SocketAddr) -> MemoryTransport {
        let (tx, rx) = mpsc::channel(100);
        self.routes.write().insert(addr, tx);
        MemoryTransport {
            addr,
            network: self.clone(),
            inbox: Mutex::new(rx),
        }
    }
}

/// In-memory transport for testing and simulation.
pub struct MemoryTransport {
    addr: SocketAddr,
    network: MemoryNetwork,
    inbox: Mutex<mpsc::Receiver<(SocketAddr, String)>>,
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send_to(&self, addr: SocketAddr, text: &str) -> Result<(), TransportError> {
        let route = self.network.routes.read().get(&addr).cloned();
        match route {
            Some(tx) => tx
                .send((self.addr, text.to_string()))
                .await
                .map_err(|_| TransportError::Closed),
            None => Err(TransportError::UnknownDestination(addr)),
        }
    }

    async fn recv(&self) -> Result<(SocketAddr, String), TransportError> {
        self.inbox
            .lock()
            .await
            .recv()
            .await
            .ok_or(TransportError::Closed)
    }

    fn local_addr(&self) -> SocketAddr {
        self.addr
    }
}
