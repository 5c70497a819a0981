// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

use mesh_net::MeshError;

/// Errors raised by the distributed-call runtime.
#[derive(Debug, Error, Clone)]
pub enum SystemError {
    #[error("name already taken: {0}")]
    NameAlreadyTaken(String),

    #[error("peer not found: {0}")]
    PeerNotFound(String),

    #[error("actor not found: {0}")]
    ActorNotFound(String),

    #[error("system stopped")]
    SystemStopped,

    #[error("execution failed in {target}: {message}")]
    ExecutionFailed { target: String, message: String },

    #[error("remote call timed out")]
    Timeout,

    #[error(transparent)]
    Mesh(#[from] MeshError),
}
