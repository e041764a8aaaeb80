//! Server error types.

use thiserror::Error;

/// Errors produced by the server driver and runtime.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Invalid configuration (bind address, key seed).
    #[error("configuration error: {0}")]
    Config(String),

    /// Transport-level failure (bind, accept, socket metadata).
    #[error("transport error: {0}")]
    Transport(String),

    /// A frame violated the protocol in a way the driver cannot answer.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// An event referenced a connection the driver does not know.
    #[error("unknown connection {0}")]
    UnknownConnection(u64),
}

impl From<tether_proto::ProtocolError> for ServerError {
    fn from(error: tether_proto::ProtocolError) -> Self {
        Self::Protocol(error.to_string())
    }
}
