// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Tracks `mm join` processes owned by the current user so `mm kill --all`
//! (and `mm kill <peer-id>`) can find and signal them.
//!
//! There is no remote "shut down" RPC in the mesh itself (the spec's
//! `SystemActor` exposes only `find_member`/`list_members`, and adding one
//! would let any peer terminate any other without authentication, which the
//! mesh deliberately has none of). So `kill` always acts locally: every
//! `mm join` writes a small record of its peer id and pid here, and `kill`
//! signals the matching processes directly via their pid.

use std::fs;
use std::path::{Path, PathBuf};

use mesh_net::PeerId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
struct JoinRecord {
    peer_id: String,
    pid: u32,
}

fn joins_dir() -> PathBuf {
    dirs::runtime_dir()
        .or_else(dirs::data_local_dir)
        .unwrap_or_else(std::env::temp_dir)
        .join("mm/joins")
}

/// Records this process as an owner of `peer_id`. Returns the path of the
/// record so the caller can remove it again on exit.
pub fn register(peer_id: &PeerId) -> anyhow::Result<PathBuf> {
    let dir = joins_dir();
    fs::create_dir_all(&dir)?;
    let pid = std::process::id();
    let path = dir.join(format!("{pid}.json"));
    let record = JoinRecord {
        peer_id: peer_id.to_string(),
        pid,
    };
    fs::write(&path, serde_json::to_vec_pretty(&record)?)?;
    Ok(path)
}

pub fn unregister(path: &Path) {
    let _ = fs::remove_file(path);
}

/// Every `(peer_id, pid)` recorded by a still-registered `mm join`. A
/// process that died without cleaning up its own record is filtered out by
/// probing the pid with `kill(pid, 0)`.
pub fn list() -> Vec<(String, u32)> {
    let dir = joins_dir();
    let Ok(entries) = fs::read_dir(&dir) else {
        return Vec::new();
    };
    entries
        .flatten()
        .filter_map(|entry| {
            let text = fs::read_to_string(entry.path()).ok()?;
            let record: JoinRecord = serde_json::from_str(&text).ok()?;
            if process_alive(record.pid) {
                Some((record.peer_id, record.pid))
            } else {
                let _ = fs::remove_file(entry.path());
                None
            }
        })
        .collect()
}

fn process_alive(pid: u32) -> bool {
    unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
}
