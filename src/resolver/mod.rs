//! Line-in capture device resolution.

use crate::config::ResolverConfig;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use regex::Regex;
use std::process::Stdio;
use std::sync::OnceLock;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Sentinel meaning "pick the first capture device found".
pub const AUTO_DEVICE: &str = "auto";
/// Used when enumeration yields nothing.
pub const FALLBACK_DEVICE: &str = "default";

/// Produces the textual capture device listing (`arecord -l` format).
#[async_trait]
pub trait DeviceLister: Send + Sync {
    async fn list_capture_devices(&self) -> Result<String>;
}

pub struct ArecordLister {
    program: String,
    args: Vec<String>,
}

impl ArecordLister {
    pub fn new(config: &ResolverConfig) -> Self {
        Self {
            program: config.list_program.clone(),
            args: config.list_args.clone(),
        }
    }
}

#[async_trait]
impl DeviceLister for ArecordLister {
    async fn list_capture_devices(&self) -> Result<String> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .output()
            .await
            .with_context(|| format!("Failed to execute {}", self.program))?;

        if !output.status.success() {
            bail!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

fn card_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?m)^card (\d+):([^\n]*)$").expect("card pattern"))
}

fn device_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"device (\d+):").expect("device pattern"))
}

/// Returns the first listed card as a hardware device path (`hw:<card>,<device>`).
pub fn first_capture_device(listing: &str) -> Option<String> {
    let caps = card_pattern().captures(listing)?;
    let card = caps.get(1)?.as_str();
    let device = caps
        .get(2)
        .and_then(|rest| device_pattern().captures(rest.as_str()))
        .and_then(|d| d.get(1))
        .map(|m| m.as_str())
        .unwrap_or("0");
    Some(format!("hw:{},{}", card, device))
}

/// Resolves the configured line-in capture device.
///
/// Anything other than `auto` is returned verbatim. Enumeration failures
/// degrade to [`FALLBACK_DEVICE`]; this never fails.
pub async fn resolve_linein_device(configured: &str, lister: &dyn DeviceLister) -> String {
    let configured = configured.trim();
    if !configured.is_empty() && configured != AUTO_DEVICE {
        return configured.to_string();
    }

    match lister.list_capture_devices().await {
        Ok(listing) => match first_capture_device(&listing) {
            Some(device) => {
                info!("Auto-detected line-in capture device {}", device);
                device
            }
            None => {
                debug!("No capture devices enumerated, using {}", FALLBACK_DEVICE);
                FALLBACK_DEVICE.to_string()
            }
        },
        Err(e) => {
            warn!(
                "Capture device enumeration failed, using {}: {}",
                FALLBACK_DEVICE, e
            );
            FALLBACK_DEVICE.to_string()
        }
    }
}
