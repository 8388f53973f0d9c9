//! Server runtime for the replicated chat service.
//!
//! Ties the ordering engine to a datagram transport: configuration of the
//! fixed server group, classification of datagram sources, the client
//! command protocol, and the single receive loop that drives everything.

pub mod commands;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod membership;
pub mod server;
pub mod transport;

pub use commands::ClientAction;
pub use config::{ConfigError, ServerConfig};
pub use dispatch::DeliveryDispatcher;
pub use error::ServerError;
pub use membership::{ClientEntry, Roster, Source};
pub use server::Server;
pub use transport::{MemoryNetwork, MemoryTransport, Transport, TransportError, UdpTransport};
