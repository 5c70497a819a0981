// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The `Member` distributed actor: the collaborator wrapping a [`PtyProcess`]
//! that every `mm join` session registers with its local `CommunitySystem`.

use std::sync::Arc;

use mesh_net::protocol::{cbor_decode, cbor_encode};
use mesh_net::{Actor, ActorError};

use crate::process::PtyProcess;

/// Distributed-actor wrapper around a PTY collaborator.
///
/// `Member` owns no network state of its own; it is registered with a
/// `CommunitySystem` under a fresh `ActorId` and a claimed name, and reached
/// exclusively through `Actor::dispatch`.
pub struct Member {
    name: String,
    pty: Arc<dyn PtyProcess>,
}

impl Member {
    pub fn new(name: impl Into<String>, pty: Arc<dyn PtyProcess>) -> Self {
        Self {
            name: name.into(),
            pty,
        }
    }

    fn tell(&self, text: &str) -> Result<(), ActorError> {
        self.pty
            .write_line(text)
            .map_err(|e| ActorError::new(e.to_string()))
    }
}

impl Actor for Member {
    fn dispatch(&self, target: &str, args: &[u8]) -> Result<Vec<u8>, ActorError> {
        match target {
            "Member.tell:1" => {
                let text: String =
                    cbor_decode(args).map_err(|e| ActorError::new(e.to_string()))?;
                self.tell(&text)?;
                cbor_encode(&()).map_err(|e| ActorError::new(e.to_string()))
            }
            "Member.is_running:0" => {
                cbor_encode(&self.pty.is_running()).map_err(|e| ActorError::new(e.to_string()))
            }
            "Member.get_name:0" => {
                cbor_encode(&self.name).map_err(|e| ActorError::new(e.to_string()))
            }
            "Member.get_command:0" => {
                cbor_encode(&self.pty.command()).map_err(|e| ActorError::new(e.to_string()))
            }
            "Member.get_cwd:0" => {
                cbor_encode(&self.pty.cwd()).map_err(|e| ActorError::new(e.to_string()))
            }
            "Member.get_foreground_process:0" => cbor_encode(&self.pty.foreground_process())
                .map_err(|e| ActorError::new(e.to_string())),
            other => Err(ActorError::new(format!("unknown target: {other}"))),
        }
    }
}
