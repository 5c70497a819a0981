// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

/// Errors raised by the PTY collaborator.
#[derive(Debug, Error)]
pub enum PtyError {
    #[error("pty closed")]
    PtyClosed,

    #[error("spawn failed: {0}")]
    SpawnFailed(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
