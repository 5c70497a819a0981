//! Wire-protocol types for the mesh envelope codec.
//!
//! All types derive `Serialize`/`Deserialize` and are encoded as CBOR on the
//! wire: `[u32 big-endian length][CBOR payload]`.

use serde::{Deserialize, Serialize};

use crate::actor::ActorId;

/// Sent from one agent to another to invoke a method on a distributed actor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InvocationEnvelope {
    /// Fresh uuid correlating the eventual `ResponseEnvelope`.
    pub call_id: String,
    /// The actor instance uuid to dispatch to on the recipient host.
    pub recipient_uuid: String,
    /// Canonical `PeerId` string of the caller (diagnostic / routing aid).
    pub sender_peer: String,
    /// Stable mangled method identifier, e.g. `"Member.tell:1"`.
    pub target: String,
    /// CBOR-encoded argument tuple, in invocation order.
    pub arguments: Vec<u8>,
}

/// Sent back in reply to an `InvocationEnvelope` with the same `call_id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResponseEnvelope {
    pub call_id: String,
    pub result: CallResult,
}

/// The outcome of a dispatched invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CallResult {
    Void,
    Success { value: Vec<u8> },
    Failure { error: RuntimeError },
}

/// Error sum carried on the wire inside a `CallResult::Failure`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuntimeError {
    ActorNotFound { uuid: String },
    ExecutionFailed { target: String, message: String },
    /// Catches a `kind` this binary doesn't recognize (e.g. a newer peer's
    /// error variant), so decoding a `RuntimeError` never hard-fails on it.
    #[serde(other)]
    Unknown,
}

impl RuntimeError {
    /// What an unrecognized `kind` tag resolves to once the decoder has a
    /// `target` to attach it to.
    pub fn unknown_tag(target: impl Into<String>) -> Self {
        RuntimeError::ExecutionFailed {
            target: target.into(),
            message: "unknown error tag".to_string(),
        }
    }
}

/// A single message exchanged on a connection once the handshake completes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Frame {
    Invocation(InvocationEnvelope),
    Response(ResponseEnvelope),
}

/// Self-reported identity exchanged once, immediately after connecting,
/// before either side sends a `Frame`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Handshake {
    pub peer_id: String,
}

/// Returned by `SystemActor::list_members` / `find_member`.
///
/// The optional fields carry PTY introspection when available; `None`
/// means the collaborator did not provide it, not that it was queried and
/// came back empty.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemberInfo {
    pub name: String,
    pub actor_id: ActorId,
    /// Canonical `PeerId` string; equal to `actor_id.peer.to_string()` but
    /// kept as its own field so callers don't need to reconstruct it.
    pub peer_id: String,
    pub transport: String,
    pub command: Option<String>,
    pub cwd: Option<String>,
    pub foreground_process: Option<String>,
}
