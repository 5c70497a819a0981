//! `PeerId` — the human-readable address of a host in the mesh.

use std::fmt;
use std::hash::Hash;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::MeshError;

/// Addressable peer identity of the form `name@host:port`.
///
/// Two peers are equal iff all three fields are equal; hashing covers all
/// three fields so `PeerId` can key a `HashMap`/`DashMap` directly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerId {
    pub name: String,
    pub host: String,
    pub port: u16,
}

impl PeerId {
    pub fn new(name: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.name, self.host, self.port)
    }
}

impl FromStr for PeerId {
    type Err = MeshError;

    /// Parses `"name@host:port"`. Fails with `InvalidPeerId` on a missing
    /// `@`, missing `:`, or non-numeric port.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, rest) = s
            .split_once('@')
            .ok_or_else(|| MeshError::InvalidPeerId(s.to_string()))?;
        let (host, port) = rest
            .rsplit_once(':')
            .ok_or_else(|| MeshError::InvalidPeerId(s.to_string()))?;
        if name.is_empty() || host.is_empty() {
            return Err(MeshError::InvalidPeerId(s.to_string()));
        }
        let port: u16 = port
            .parse()
            .map_err(|_| MeshError::InvalidPeerId(s.to_string()))?;
        Ok(PeerId {
            name: name.to_string(),
            host: host.to_string(),
            port,
        })
    }
}
