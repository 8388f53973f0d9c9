use crate::config::ConfigError;
use crate::transport::TransportError;
use thiserror::Error;

/// Fatal server errors. Anything recoverable (malformed frames, dead
/// clients, rejected commands) is handled and logged inside the loop.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}
