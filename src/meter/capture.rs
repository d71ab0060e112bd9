//! Raw capture subprocess used for level measurement.
//!
//! A [`CaptureProcess`] is the only handle to its child. Dropping it kills
//! the child (`kill_on_drop`), so a capture can never outlive its owner.

use crate::config::MeterConfig;
use anyhow::{Context, Result};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tracing::{debug, warn};

const DIAGNOSTICS_TIMEOUT: Duration = Duration::from_millis(200);
const MAX_DIAGNOSTICS_BYTES: usize = 4096;

/// Starts capture processes for a device.
pub trait CaptureSpawner: Send + Sync {
    fn spawn(&self, device: &str) -> Result<CaptureProcess>;
}

/// Spawns the configured capture command with its placeholders expanded.
pub struct CommandSpawner {
    program: String,
    args: Vec<String>,
    sample_rate: u32,
    channels: u16,
}

impl CommandSpawner {
    pub fn new(config: &MeterConfig) -> Self {
        Self {
            program: config.program.clone(),
            args: config.args.clone(),
            sample_rate: config.sample_rate,
            channels: config.channels,
        }
    }

    fn expand_args(&self, device: &str) -> Vec<String> {
        let rate = self.sample_rate.to_string();
        let channels = self.channels.to_string();
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{device}", device)
                    .replace("{rate}", &rate)
                    .replace("{channels}", &channels)
            })
            .collect()
    }
}

impl CaptureSpawner for CommandSpawner {
    fn spawn(&self, device: &str) -> Result<CaptureProcess> {
        let args = self.expand_args(device);
        debug!("Spawning capture: {} {}", self.program, args.join(" "));

        let child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to spawn {} for {}", self.program, device))?;

        Ok(CaptureProcess::new(child))
    }
}

pub struct CaptureProcess {
    child: Child,
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
}

impl CaptureProcess {
    pub fn new(mut child: Child) -> Self {
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        Self {
            child,
            stdout,
            stderr,
        }
    }

    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Reads raw audio. Returns `Ok(0)` once the output is closed.
    pub async fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self.stdout.as_mut() {
            Some(stdout) => stdout.read(buf).await,
            None => Ok(0),
        }
    }

    /// Exit status if the process has already exited.
    pub fn exited(&mut self) -> Option<ExitStatus> {
        self.child.try_wait().ok().flatten()
    }

    /// Whatever the process wrote to stderr, bounded in time and size.
    pub async fn diagnostics(&mut self) -> String {
        let Some(mut stderr) = self.stderr.take() else {
            return String::new();
        };
        let mut collected = Vec::new();
        let read = async {
            let mut buf = [0u8; 512];
            while collected.len() < MAX_DIAGNOSTICS_BYTES {
                match stderr.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => collected.extend_from_slice(&buf[..n]),
                }
            }
        };
        let _ = tokio::time::timeout(DIAGNOSTICS_TIMEOUT, read).await;
        String::from_utf8_lossy(&collected).trim().to_string()
    }

    /// Closes the output pipe so the capture exits on its next write, then
    /// force-kills it if it is still running after `grace`.
    pub async fn terminate(mut self, grace: Duration) {
        let pid = self.child.id();
        drop(self.stdout.take());

        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => debug!("Capture {:?} exited with {}", pid, status),
            Ok(Err(e)) => warn!("Failed to wait for capture {:?}: {}", pid, e),
            Err(_) => {
                debug!("Capture {:?} ignored shutdown, killing", pid);
                if let Err(e) = self.child.kill().await {
                    warn!("Failed to kill capture {:?}: {}", pid, e);
                }
            }
        }
    }
}
