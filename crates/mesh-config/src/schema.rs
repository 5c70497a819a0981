// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    50051
}

fn default_command() -> String {
    std::env::var("SHELL").unwrap_or_else(|_| "/bin/zsh".to_string())
}

fn default_remote_call_timeout_secs() -> u64 {
    30
}

fn default_member_exchange_timeout_secs() -> u64 {
    3
}

fn default_connect_timeout_secs() -> u64 {
    5
}

/// Top-level configuration, merged from layered YAML files by [`crate::load`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub join: JoinConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            join: JoinConfig::default(),
            timeouts: TimeoutConfig::default(),
        }
    }
}

/// Defaults for `mm join`; every field here can be overridden by a CLI flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinConfig {
    /// Command the PTY collaborator runs. Defaults to `$SHELL`, falling back
    /// to `/bin/zsh` when unset.
    #[serde(default = "default_command")]
    pub command: String,
    /// Loopback (or LAN) address the mesh listener binds to.
    #[serde(default = "default_host")]
    pub host: String,
    /// TCP port the mesh listener binds to. Port 50051 that is already in
    /// use is handled by `join`'s auto-fallback policy, not by this default.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Peers to dial on startup, as `name@host:port` strings.
    #[serde(default)]
    pub peers: Vec<String>,
    /// Disables automatic discovery (manual `--peer` only).
    #[serde(default)]
    pub no_discovery: bool,
}

impl Default for JoinConfig {
    fn default() -> Self {
        Self {
            command: default_command(),
            host: default_host(),
            port: default_port(),
            peers: Vec::new(),
            no_discovery: false,
        }
    }
}

/// Deadlines for the runtime's suspension points.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Deadline for a `remote_call`/`remote_call_void` round trip.
    #[serde(default = "default_remote_call_timeout_secs")]
    pub remote_call_secs: u64,
    /// Deadline for `all_members_with_status`'s per-peer metadata fetch.
    #[serde(default = "default_member_exchange_timeout_secs")]
    pub member_exchange_secs: u64,
    /// Deadline for dialing a peer's listener.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            remote_call_secs: default_remote_call_timeout_secs(),
            member_exchange_secs: default_member_exchange_timeout_secs(),
            connect_secs: default_connect_timeout_secs(),
        }
    }
}
