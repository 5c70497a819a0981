use thiserror::Error;

use crate::peer::PeerId;

/// Transport- and codec-level error taxonomy.
#[derive(Debug, Error, Clone)]
pub enum MeshError {
    #[error("invalid peer id: {0}")]
    InvalidPeerId(String),

    #[error("port unavailable: {0}")]
    PortUnavailable(u16),

    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("connection timed out")]
    ConnectionTimeout,

    #[error("peer not found: {0}")]
    PeerNotFound(PeerId),

    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    #[error("io error: {0}")]
    Io(String),
}

impl From<std::io::Error> for MeshError {
    fn from(e: std::io::Error) -> Self {
        MeshError::Io(e.to_string())
    }
}
