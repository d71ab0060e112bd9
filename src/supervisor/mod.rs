//! Service supervisor abstraction over the stream processes.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;
use which::which;

/// Starts, stops and queries named long-running processes.
///
/// Calls on unknown services, or services already in the requested state,
/// are no-ops. Errors are reserved for the supervisor itself being
/// unreachable or refusing a start.
#[async_trait]
pub trait ServiceSupervisor: Send + Sync {
    async fn start(&self, name: &str) -> Result<()>;
    async fn stop(&self, name: &str) -> Result<()>;
    async fn restart(&self, name: &str) -> Result<()>;
    async fn is_active(&self, name: &str) -> bool;
}

/// `systemctl`-backed supervisor.
pub struct SystemdSupervisor {
    systemctl: PathBuf,
    user: bool,
}

impl SystemdSupervisor {
    pub fn new(user: bool) -> Result<Self> {
        let systemctl = which("systemctl").context("systemctl binary not found in PATH")?;
        Ok(Self::with_systemctl(systemctl, user))
    }

    pub fn with_systemctl(systemctl: impl Into<PathBuf>, user: bool) -> Self {
        Self {
            systemctl: systemctl.into(),
            user,
        }
    }

    fn command(&self, verb: &str, name: &str) -> Command {
        let mut cmd = Command::new(&self.systemctl);
        if self.user {
            cmd.arg("--user");
        }
        cmd.arg(verb)
            .arg(name)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        cmd
    }

    async fn run(&self, verb: &str, name: &str) -> Result<std::process::Output> {
        debug!("systemctl {} {}", verb, name);
        self.command(verb, name)
            .output()
            .await
            .with_context(|| format!("Failed to invoke systemctl {} {}", verb, name))
    }

    async fn run_checked(&self, verb: &str, name: &str) -> Result<()> {
        let output = self.run(verb, name).await?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!(
            "systemctl {} {} failed ({}): {}",
            verb,
            name,
            output.status,
            stderr.trim()
        )
    }
}

#[async_trait]
impl ServiceSupervisor for SystemdSupervisor {
    async fn start(&self, name: &str) -> Result<()> {
        self.run_checked("start", name).await
    }

    async fn stop(&self, name: &str) -> Result<()> {
        // Non-zero exit here means the unit is unknown or already down.
        let output = self.run("stop", name).await?;
        if !output.status.success() {
            debug!(
                "systemctl stop {} exited with {}: {}",
                name,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }

    async fn restart(&self, name: &str) -> Result<()> {
        self.run_checked("restart", name).await
    }

    async fn is_active(&self, name: &str) -> bool {
        let mut cmd = self.command("is-active", name);
        cmd.arg("--quiet");
        match cmd.status().await {
            Ok(status) => status.success(),
            Err(e) => {
                debug!("systemctl is-active {} failed: {}", name, e);
                false
            }
        }
    }
}
