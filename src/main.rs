// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod cli;
mod joins;
mod terminal;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use cli::{Cli, Commands};
use mesh_config::Config;
use mesh_net::{MeshError, PeerId, PeerNode, PeerNodeConfig};
use mesh_pty::{LocalPty, Member, PtyProcess, PtySpawnOptions};
use mesh_system::{ActorHandle, CommunitySystem, SystemError};
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.suppresses_stderr_logging());

    let config = mesh_config::load(cli.config.as_deref())?;

    let result = match cli.command.unwrap_or(Commands::List {
        host: None,
        port: None,
    }) {
        Commands::Join {
            command,
            name,
            host,
            port,
            peers,
            no_discovery,
        } => run_join(&config, command, name, host, port, peers, no_discovery).await,
        Commands::Tell {
            name,
            message,
            host,
            port,
        } => run_tell(&config, name, message, host, port).await,
        Commands::List { host, port } => run_list(&config, host, port).await,
        Commands::Kill { peers, all, force } => run_kill(peers, all, force).await,
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
    Ok(())
}

/// In `join`, stderr is shared with the raw terminal the PTY is drawing to:
/// any tracing line would corrupt the collaborator's screen. Logging is
/// suppressed there unless the caller explicitly opts in via `RUST_LOG`.
fn init_logging(verbose: u8, suppress: bool) {
    if suppress && std::env::var("RUST_LOG").is_err() {
        return;
    }
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("mm={default_level}")));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn bind_system(
    config: &Config,
    name: &str,
    host: &str,
    port: u16,
) -> Result<Arc<CommunitySystem>, SystemError> {
    let node = PeerNode::with_connect_timeout(
        PeerNodeConfig {
            name: name.to_string(),
            host: host.to_string(),
            port,
        },
        Duration::from_secs(config.timeouts.connect_secs),
    );
    let system = CommunitySystem::with_timeouts(
        name.to_string(),
        node,
        Duration::from_secs(config.timeouts.remote_call_secs),
        Duration::from_secs(config.timeouts.member_exchange_secs),
    );
    system.start().await?;
    Ok(system)
}

/// A throwaway system used purely to place remote calls (`tell`, `list`),
/// never to host a member of its own.
async fn ephemeral_system(config: &Config) -> anyhow::Result<Arc<CommunitySystem>> {
    let system = bind_system(config, &format!("_cli-{}", std::process::id()), "127.0.0.1", 0).await?;
    Ok(system)
}

async fn run_join(
    config: &Config,
    command: Option<String>,
    name: Option<String>,
    host: Option<String>,
    port: Option<u16>,
    peers: Vec<String>,
    _no_discovery: bool,
) -> anyhow::Result<()> {
    let name = name.unwrap_or_else(|| format!("member-{}", std::process::id()));
    let host = host.unwrap_or_else(|| config.join.host.clone());
    let requested_port = port.unwrap_or(config.join.port);
    let command = command.unwrap_or_else(|| config.join.command.clone());

    let (system, rebound) = match bind_system(config, &name, &host, requested_port).await {
        Ok(system) => (system, false),
        Err(SystemError::Mesh(MeshError::PortUnavailable(busy_port)))
            if requested_port == 50051 =>
        {
            tracing::info!(port = busy_port, "port 50051 busy, rebinding to an OS-assigned port");
            let system = bind_system(config, &name, &host, 0)
                .await
                .context("binding fallback port")?;
            (system, true)
        }
        Err(e) => return Err(e.into()),
    };

    if rebound {
        // Any name works here: the placeholder `PeerId` is only a local
        // routing key for this connection, never the other side's identity.
        let existing = PeerId::new("_existing", "127.0.0.1", 50051);
        if let Err(e) = system.connect_to_peer(&existing).await {
            tracing::warn!(error = %e, "could not dial the pre-existing server on 50051");
        }
    }

    for peer_str in &peers {
        match peer_str.parse::<PeerId>() {
            Ok(peer) => {
                if let Err(e) = system.connect_to_peer(&peer).await {
                    tracing::warn!(peer = %peer, error = %e, "failed to connect to seed peer");
                }
            }
            Err(e) => tracing::warn!(peer = peer_str, error = %e, "invalid --peer value, skipping"),
        }
    }

    let pty = LocalPty::spawn(PtySpawnOptions {
        command: command.clone(),
        cwd: std::env::current_dir().ok().map(|p| p.display().to_string()),
        rows: 24,
        cols: 80,
        env: vec![("MM_NAME".to_string(), name.clone())],
    })
    .context("spawning the collaborator process")?;

    let member = Member::new(name.clone(), pty.clone());
    let actor_id = system.ready(Arc::new(member));
    system.claim_name(&name, &actor_id)?;

    let join_record = joins::register(&system.local_peer_id())?;
    eprintln!("joined as {} on {}", name, system.local_peer_id());

    let session_result = terminal::run_interactive_session(pty.clone()).await;

    joins::unregister(&join_record);
    let _ = pty.close();
    system.resign(&actor_id);
    system.stop().await;

    session_result
}

async fn run_tell(
    config: &Config,
    name: String,
    message: String,
    host: Option<String>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    let host = host.unwrap_or_else(|| config.join.host.clone());
    let port = port.unwrap_or(config.join.port);
    let target = PeerId::new("_target", host, port);

    let system = ephemeral_system(config).await?;
    system
        .connect_to_peer(&target)
        .await
        .with_context(|| format!("connecting to {target}"))?;

    let member = system
        .find_member(&target, &name)
        .await?
        .ok_or_else(|| anyhow::anyhow!("no member named {name:?} on {target}"))?;

    let handle = ActorHandle::new(member.actor_id);
    system
        .remote_call_void(&handle, "Member.tell:1", &message)
        .await?;

    system.stop().await;
    Ok(())
}

async fn run_list(config: &Config, host: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    let host = host.unwrap_or_else(|| config.join.host.clone());
    let port = port.unwrap_or(config.join.port);
    let target = PeerId::new("_target", host, port);

    let system = ephemeral_system(config).await?;
    system
        .connect_to_peer(&target)
        .await
        .with_context(|| format!("connecting to {target}"))?;

    let members = system.all_members_with_status().await;
    let mine = std::env::var("MM_NAME").ok();

    if members.is_empty() {
        println!("no members");
    }
    for m in &members {
        let marker = if mine.as_deref() == Some(m.name.as_str()) {
            "*"
        } else {
            " "
        };
        println!(
            "{marker} {:<16} {:<28} {}",
            m.name,
            m.peer_id,
            m.command.as_deref().unwrap_or("-")
        );
    }

    system.stop().await;
    Ok(())
}

async fn run_kill(peers: Vec<String>, all: bool, force: bool) -> anyhow::Result<()> {
    if !all && peers.is_empty() {
        anyhow::bail!("specify one or more peer ids, or pass --all");
    }

    let signal = if force { libc::SIGKILL } else { libc::SIGTERM };
    let owned = joins::list();
    let targets: Vec<(String, u32)> = if all {
        owned
    } else {
        owned
            .into_iter()
            .filter(|(peer_id, _)| peers.iter().any(|p| p == peer_id))
            .collect()
    };

    if targets.is_empty() {
        anyhow::bail!("no matching mm join processes found");
    }

    for (peer_id, pid) in targets {
        tracing::info!(peer_id, pid, signal, "sending signal to owned join process");
        unsafe {
            libc::kill(pid as libc::pid_t, signal);
        }
    }
    Ok(())
}
