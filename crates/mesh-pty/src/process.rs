// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The PTY collaborator trait and its `portable-pty`-backed implementation.
//!
//! Each spawned process gets its own session so the whole process group can
//! be signaled together on shutdown.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};
use tokio::sync::broadcast;

use crate::error::PtyError;

/// Parameters for spawning a new PTY-backed process.
#[derive(Debug, Clone)]
pub struct PtySpawnOptions {
    pub command: String,
    pub cwd: Option<String>,
    pub rows: u16,
    pub cols: u16,
    /// Extra environment variables set in the child's environment on top of
    /// whatever it inherits from this process.
    pub env: Vec<(String, String)>,
}

impl Default for PtySpawnOptions {
    fn default() -> Self {
        Self {
            command: std::env::var("SHELL").unwrap_or_else(|_| "/bin/zsh".to_string()),
            cwd: None,
            rows: 24,
            cols: 80,
            env: Vec::new(),
        }
    }
}

/// A PTY-backed interactive process, as a collaborator `Member` depends on
/// rather than implements directly.
///
/// Methods are synchronous: `Member::dispatch` runs inside `mesh_net::Actor`,
/// which must complete the call before `remote_call` resumes, so there is no
/// async seam to hand control back to a runtime here. The blocking involved
/// (a mutex write, a short sleep) is short enough to not warrant
/// `spawn_blocking`.
pub trait PtyProcess: Send + Sync {
    /// Writes `text` followed by a 10 ms pause and a carriage return, the
    /// same cadence a human typing into the terminal and pressing Enter
    /// would produce. Fails with `PtyClosed` if the process already exited.
    fn write_line(&self, text: &str) -> Result<(), PtyError>;

    /// Writes raw bytes with no line-ending massaging, used for interactive
    /// passthrough during `join`.
    fn write_raw(&self, bytes: &[u8]) -> Result<(), PtyError>;

    fn is_running(&self) -> bool;

    fn command(&self) -> Option<String>;

    fn cwd(&self) -> Option<String>;

    /// Best-effort name of the process currently occupying the PTY's
    /// foreground; `None` when the child has exited or the platform doesn't
    /// support the introspection.
    fn foreground_process(&self) -> Option<String>;

    /// Subscribes to raw output chunks read from the PTY master. Each
    /// subscriber gets its own lagging-tolerant receiver.
    fn subscribe(&self) -> broadcast::Receiver<Vec<u8>>;

    /// Escalates Ctrl-C, then SIGINT, then SIGTERM, then SIGKILL to the
    /// process group, polling roughly once a second between steps, until
    /// the child exits.
    fn close(&self) -> Result<(), PtyError>;
}

/// `PtyProcess` backed by `portable_pty`'s native PTY implementation.
pub struct LocalPty {
    writer: Mutex<Box<dyn Write + Send>>,
    child: Mutex<Box<dyn Child + Send + Sync>>,
    #[allow(dead_code)]
    master: Mutex<Box<dyn MasterPty + Send>>,
    pid: Option<u32>,
    command: String,
    cwd: Option<String>,
    running: Arc<AtomicBool>,
    output_tx: broadcast::Sender<Vec<u8>>,
}

impl LocalPty {
    /// Spawns `options.command` under a fresh PTY and starts a background
    /// thread forwarding master reads onto the broadcast channel; blocking
    /// PTY I/O is confined to this dedicated thread, never the async runtime.
    pub fn spawn(options: PtySpawnOptions) -> Result<Arc<Self>, PtyError> {
        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize {
                rows: options.rows,
                cols: options.cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| PtyError::SpawnFailed(e.to_string()))?;

        let mut parts = options.command.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| PtyError::SpawnFailed("empty command".to_string()))?;
        let mut cmd = CommandBuilder::new(program);
        cmd.args(parts);
        if let Some(cwd) = &options.cwd {
            cmd.cwd(cwd);
        }
        for (key, value) in &options.env {
            cmd.env(key, value);
        }

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| PtyError::SpawnFailed(e.to_string()))?;
        let pid = child.process_id();
        drop(pair.slave);

        let writer = pair
            .master
            .take_writer()
            .map_err(|e| PtyError::SpawnFailed(e.to_string()))?;
        let mut reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| PtyError::SpawnFailed(e.to_string()))?;

        let (output_tx, _) = broadcast::channel(256);
        let running = Arc::new(AtomicBool::new(true));

        let reader_tx = output_tx.clone();
        let reader_running = running.clone();
        std::thread::spawn(move || {
            let mut buf = [0u8; 4096];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        let _ = reader_tx.send(buf[..n].to_vec());
                    }
                    Err(_) => break,
                }
            }
            reader_running.store(false, Ordering::SeqCst);
        });

        Ok(Arc::new(Self {
            writer: Mutex::new(writer),
            child: Mutex::new(child),
            master: Mutex::new(pair.master),
            pid,
            command: options.command,
            cwd: options.cwd,
            running,
            output_tx,
        }))
    }

    fn write_bytes(&self, bytes: &[u8]) -> Result<(), PtyError> {
        if !self.is_running() {
            return Err(PtyError::PtyClosed);
        }
        let mut writer = self.writer.lock().expect("pty writer lock poisoned");
        writer.write_all(bytes)?;
        writer.flush()?;
        Ok(())
    }
}

impl PtyProcess for LocalPty {
    fn write_line(&self, text: &str) -> Result<(), PtyError> {
        self.write_bytes(text.as_bytes())?;
        std::thread::sleep(Duration::from_millis(10));
        self.write_bytes(b"\r")
    }

    fn write_raw(&self, bytes: &[u8]) -> Result<(), PtyError> {
        self.write_bytes(bytes)
    }

    fn is_running(&self) -> bool {
        if !self.running.load(Ordering::SeqCst) {
            return false;
        }
        let mut child = self.child.lock().expect("pty child lock poisoned");
        matches!(child.try_wait(), Ok(None))
    }

    fn command(&self) -> Option<String> {
        Some(self.command.clone())
    }

    fn cwd(&self) -> Option<String> {
        self.cwd.clone()
    }

    fn foreground_process(&self) -> Option<String> {
        #[cfg(target_os = "linux")]
        {
            let pid = self.pid?;
            std::fs::read_to_string(format!("/proc/{pid}/comm"))
                .ok()
                .map(|s| s.trim().to_string())
        }
        #[cfg(not(target_os = "linux"))]
        {
            None
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<Vec<u8>> {
        self.output_tx.subscribe()
    }

    fn close(&self) -> Result<(), PtyError> {
        let Some(pid) = self.pid else {
            return Ok(());
        };
        let pgid = pid as libc::pid_t;

        for (signal, label) in [
            (None, "ctrl-c"),
            (Some(libc::SIGINT), "sigint"),
            (Some(libc::SIGTERM), "sigterm"),
            (Some(libc::SIGKILL), "sigkill"),
        ] {
            if !self.is_running() {
                return Ok(());
            }
            match signal {
                None => {
                    let _ = self.write_bytes(&[0x03]);
                }
                Some(sig) => {
                    tracing::debug!(pid, signal = label, "escalating pty shutdown signal");
                    unsafe {
                        libc::killpg(pgid, sig);
                    }
                }
            }
            for _ in 0..10 {
                if !self.is_running() {
                    return Ok(());
                }
                std::thread::sleep(Duration::from_millis(100));
            }
        }
        Ok(())
    }
}
