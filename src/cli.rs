// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "mm",
    about = "A peer-to-peer mesh of terminal agents",
    version,
    long_about = None,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to config file (overrides auto-discovery)
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v = debug, -vv = trace)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start an interactive collaborator and join the mesh.
    ///
    /// Spawns `command` (default: `$SHELL`, falling back to `/bin/zsh`)
    /// inside a PTY, registers it as a named `Member`, and attaches your
    /// terminal to it. If port 50051 is already bound by another `mm join`
    /// on this host, rebinds to an OS-assigned port and dials the existing
    /// server instead of failing.
    Join {
        /// Command to run inside the PTY.
        command: Option<String>,

        /// Name to register this member under. Defaults to a generated name.
        #[arg(long, short = 'n')]
        name: Option<String>,

        /// Address to listen on.
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on.
        #[arg(long, short = 'p')]
        port: Option<u16>,

        /// Peer to dial on startup, as `name@host:port`. May be repeated.
        #[arg(long = "peer", value_name = "name@host:port")]
        peers: Vec<String>,

        /// Disable automatic discovery (peers are only reached via --peer).
        #[arg(long)]
        no_discovery: bool,
    },

    /// Send a line of text to a named member, as if typed into its PTY.
    Tell {
        /// Name of the member to tell.
        name: String,
        /// Text to send.
        message: String,
        /// Address of a peer already in the mesh.
        #[arg(long)]
        host: Option<String>,
        #[arg(long, short = 'p')]
        port: Option<u16>,
    },

    /// List every member reachable from a peer in the mesh.
    List {
        #[arg(long)]
        host: Option<String>,
        #[arg(long, short = 'p')]
        port: Option<u16>,
    },

    /// Terminate `mm join` processes owned by the current user, or
    /// disconnect individual peers from the mesh.
    Kill {
        /// Peer ids (`name@host:port`) to disconnect.
        peers: Vec<String>,

        /// Terminate every `mm join` process owned by the current user.
        #[arg(long)]
        all: bool,

        /// Use SIGKILL instead of SIGTERM with --all.
        #[arg(long, short = 'f')]
        force: bool,
    },
}

impl Cli {
    /// True for subcommands that take over the terminal (raw mode, PTY
    /// passthrough) and therefore must not interleave `tracing` output with
    /// the collaborator's own screen writes.
    pub fn suppresses_stderr_logging(&self) -> bool {
        matches!(self.command, Some(Commands::Join { .. }))
    }
}
