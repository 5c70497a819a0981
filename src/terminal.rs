// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Raw-mode terminal driver for `mm join`: forwards stdin to the PTY and the
//! PTY's output back to stdout until the collaborator process exits.

use std::sync::Arc;
use std::time::Duration;

use mesh_pty::PtyProcess;
use tokio::io::AsyncWriteExt;

struct RawModeGuard;

impl RawModeGuard {
    fn enable() -> anyhow::Result<Self> {
        crossterm::terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = crossterm::terminal::disable_raw_mode();
    }
}

/// Attaches the calling terminal to `pty` until the child process exits.
/// Blocking stdin reads are confined to a dedicated thread, matching the
/// PTY collaborator's own concurrency model.
pub async fn run_interactive_session(pty: Arc<dyn PtyProcess>) -> anyhow::Result<()> {
    let _raw = RawModeGuard::enable()?;

    let mut output = pty.subscribe();
    let stdout_task = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Ok(chunk) = output.recv().await {
            if stdout.write_all(&chunk).await.is_err() {
                break;
            }
            let _ = stdout.flush().await;
        }
    });

    let (stdin_tx, mut stdin_rx) = tokio::sync::mpsc::channel::<Vec<u8>>(64);
    std::thread::spawn(move || {
        use std::io::Read;
        let mut stdin = std::io::stdin();
        let mut buf = [0u8; 1024];
        loop {
            match stdin.read(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if stdin_tx.blocking_send(buf[..n].to_vec()).is_err() {
                        break;
                    }
                }
            }
        }
    });

    while pty.is_running() {
        tokio::select! {
            chunk = stdin_rx.recv() => {
                match chunk {
                    Some(bytes) => {
                        if pty.write_raw(&bytes).is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            _ = tokio::time::sleep(Duration::from_millis(200)) => {}
        }
    }

    stdout_task.abort();
    Ok(())
}
