//! Server list configuration.
//!
//! Every server in the group reads the same configuration file: one line
//! per server, `<forward-addr>[,<bind-addr>]`. The first address is where
//! peers reach that server; the optional second address is what the server
//! itself binds, for hosts behind NAT where the two differ. A server picks
//! its own line by the 1-based index given on the command line.

use rmc_core::ServerId;
use std::net::SocketAddr;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read server list: {0}")]
    Io(#[from] std::io::Error),

    #[error("server list is empty")]
    Empty,

    #[error("line {line}: bad address {text:?}")]
    BadAddress { line: usize, text: String },

    #[error("server index {index} out of range, the list has {count} entries")]
    IndexOutOfRange { index: usize, count: usize },
}

/// The resolved configuration for one server process.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    /// Forward addresses of every group member, in list order.
    pub peers: Vec<SocketAddr>,
    /// The address this server binds.
    pub bind: SocketAddr,
    /// This server's 1-based position in the list.
    pub self_id: ServerId,
}

impl ServerConfig {
    /// Load the server list from `path` and resolve entry `index` (1-based)
    /// as our own.
    pub fn load(path: impl AsRef<Path>, index: usize) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text, index)
    }

    /// Parse the server list text and resolve entry `index` as our own.
    pub fn parse(text: &str, index: usize) -> Result<Self, ConfigError> {
        let mut peers = Vec::new();
        let mut binds = Vec::new();
        for (number, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut parts = line.splitn(2, ',');
            let forward = parse_addr(parts.next().unwrap_or(""), number + 1)?;
            let bind = match parts.next() {
                Some(second) => parse_addr(second, number + 1)?,
                None => forward,
            };
            peers.push(forward);
            binds.push(bind);
        }

        if peers.is_empty() {
            return Err(ConfigError::Empty);
        }
        let self_id = ServerId::new(index)
            .filter(|id| id.index() <= peers.len())
            .ok_or(ConfigError::IndexOutOfRange {
                index,
                count: peers.len(),
            })?;
        let bind = binds[self_id.slot()];
        Ok(ServerConfig {
            peers,
            bind,
            self_id,
        })
    }

    pub fn group_size(&self) -> usize {
        self.peers.len()
    }
}

fn parse_addr(text: &str, line: usize) -> Result<SocketAddr, ConfigError> {
    text.trim().parse().map_err(|_| ConfigError::BadAddress {
        line,
        text: text.trim().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIST: &str = "\
127.0.0.1:5000
127.0.0.1:5001,0.0.0.0:5001
127.0.0.1:5002
";

    #[test]
    fn resolves_own_entry_and_bind() {
        let config = ServerConfig::parse(LIST, 2).unwrap();
        assert_eq!(config.group_size(), 3);
        assert_eq!(config.self_id.index(), 2);
        assert_eq!(config.bind, "0.0.0.0:5001".parse().unwrap());
        assert_eq!(config.peers[1], "127.0.0.1:5001".parse().unwrap());
    }

    #[test]
    fn bind_defaults_to_forward_address() {
        let config = ServerConfig::parse(LIST, 1).unwrap();
        assert_eq!(config.bind, "127.0.0.1:5000".parse().unwrap());
    }

    #[test]
    fn skips_blank_and_comment_lines() {
        let text = "# group\n\n127.0.0.1:4000\n  \n127.0.0.1:4001\n";
        let config = ServerConfig::parse(text, 1).unwrap();
        assert_eq!(config.group_size(), 2);
    }

    #[test]
    fn rejects_out_of_range_index() {
        assert!(matches!(
            ServerConfig::parse(LIST, 0),
            Err(ConfigError::IndexOutOfRange { .. })
        ));
        assert!(matches!(
            ServerConfig::parse(LIST, 4),
            Err(ConfigError::IndexOutOfRange { index: 4, count: 3 })
        ));
    }

    #[test]
    fn rejects_bad_addresses_and_empty_lists() {
        assert!(matches!(
            ServerConfig::parse("not-an-address\n", 1),
            Err(ConfigError::BadAddress { line: 1, .. })
        ));
        assert!(matches!(
            ServerConfig::parse("\n\n", 1),
            Err(ConfigError::Empty)
        ));
    }
}
