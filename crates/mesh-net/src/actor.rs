//! `ActorId` and the local dispatch seam every distributed actor implements.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::peer::PeerId;

/// Reserved uuid naming the well-known `SystemActor` on every started host.
pub const WELL_KNOWN_SYSTEM_UUID: &str = "00000000-0000-0000-0000-000000000001";

/// `(uuid, peer_id)` pair identifying a distributed actor instance.
///
/// `uuid` names the actor within its host; `peer_id` locates the host.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActorId {
    pub uuid: String,
    pub peer: PeerId,
}

impl ActorId {
    pub fn new(uuid: impl Into<String>, peer: PeerId) -> Self {
        Self {
            uuid: uuid.into(),
            peer,
        }
    }

    /// A fresh uuid-v4 actor id hosted on `peer`.
    pub fn generate(peer: PeerId) -> Self {
        Self {
            uuid: Uuid::new_v4().to_string(),
            peer,
        }
    }

    /// The well-known `SystemActor` id hosted on `peer`.
    pub fn well_known(peer: PeerId) -> Self {
        Self {
            uuid: WELL_KNOWN_SYSTEM_UUID.to_string(),
            peer,
        }
    }
}

impl fmt::Display for ActorId {
    /// Diagnostic-only short form: `<uuid[0..8]>@<peer>`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let short = self.uuid.get(0..8).unwrap_or(&self.uuid);
        write!(f, "{short}@{}", self.peer)
    }
}

/// A failure raised while executing a locally dispatched method.
///
/// Distinct from `mesh_net::RuntimeError` (the wire-level error sum): this is
/// the in-process error a handler returns, which the dispatcher then wraps
/// into a `RuntimeError::ExecutionFailed` for the wire.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct ActorError(pub String);

impl ActorError {
    pub fn new(msg: impl Into<String>) -> Self {
        ActorError(msg.into())
    }
}

impl From<&str> for ActorError {
    fn from(s: &str) -> Self {
        ActorError(s.to_string())
    }
}

impl From<String> for ActorError {
    fn from(s: String) -> Self {
        ActorError(s)
    }
}

/// Implemented by every local actor kind (`SystemActor`, `Member`, …).
///
/// `target` is a stable mangled method identifier (e.g. `"Member.tell:1"`);
/// each actor kind owns its own naming. The call is synchronous with
/// respect to the caller: local dispatch must run the method to completion
/// before `remote_call` resumes, so this trait is deliberately not `async`.
pub trait Actor: Send + Sync {
    /// Decode `args`, invoke the method named by `target`, and encode the
    /// result. Returns `Err` if `target` is unknown or the method raised.
    fn dispatch(&self, target: &str, args: &[u8]) -> Result<Vec<u8>, ActorError>;
}
