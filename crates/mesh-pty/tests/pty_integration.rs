// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::time::Duration;

use mesh_pty::{LocalPty, PtyProcess, PtySpawnOptions};

/// Scenario S1: a collaborator is told a line and it echoes back, the way
/// `cat` reflects every line of stdin to stdout.
#[tokio::test]
async fn tell_echoes_back_through_cat() {
    let pty = LocalPty::spawn(PtySpawnOptions {
        command: "cat".to_string(),
        cwd: None,
        rows: 24,
        cols: 80,
        env: Vec::new(),
    })
    .expect("spawn cat");

    let mut output = pty.subscribe();
    pty.write_line("hello mesh").expect("write line");

    let seen = tokio::time::timeout(Duration::from_secs(2), async {
        let mut collected = Vec::new();
        loop {
            let chunk = output.recv().await.expect("pty output channel");
            collected.extend_from_slice(&chunk);
            if String::from_utf8_lossy(&collected).contains("hello mesh") {
                break;
            }
        }
    })
    .await;
    assert!(seen.is_ok(), "expected cat to echo the written line back");

    pty.close().expect("close pty");
    assert!(!pty.is_running());
}

#[tokio::test]
async fn close_on_unresponsive_process_eventually_kills_it() {
    let pty = LocalPty::spawn(PtySpawnOptions {
        command: "sleep 30".to_string(),
        cwd: None,
        rows: 24,
        cols: 80,
        env: Vec::new(),
    })
    .expect("spawn sleep");

    assert!(pty.is_running());
    pty.close().expect("close pty");
    assert!(!pty.is_running());
}

#[tokio::test]
async fn write_line_after_close_fails() {
    let pty = LocalPty::spawn(PtySpawnOptions {
        command: "true".to_string(),
        cwd: None,
        rows: 24,
        cols: 80,
        env: Vec::new(),
    })
    .expect("spawn true");

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(pty.write_line("too late").is_err());
}
