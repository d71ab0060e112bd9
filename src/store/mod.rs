//! Durable key-value store for the appliance settings.
//!
//! The backing file holds one `KEY="value"` assignment per line. Only keys
//! that already exist in the file are ever rewritten; `seed` is the single
//! place new keys get created.

use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Keys understood by the controller.
pub mod keys {
    pub const LAST_SOURCE: &str = "LAST_SOURCE";
    pub const VOLUME: &str = "VOLUME";
    pub const LINEIN_CAPTURE: &str = "LINEIN_CAPTURE";
    pub const SPOTIFY_NAME: &str = "SPOTIFY_NAME";
}

/// Values written on first run.
pub const DEFAULTS: &[(&str, &str)] = &[
    (keys::LAST_SOURCE, "off"),
    (keys::VOLUME, "1.0"),
    (keys::LINEIN_CAPTURE, "auto"),
    (keys::SPOTIFY_NAME, "sourcectl"),
];

pub trait ConfigStore: Send + Sync {
    /// Returns the unquoted value, or `None` when the key is absent.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Overwrites an existing key. Returns `Ok(false)` without touching the
    /// store when the key is not present.
    fn set(&self, key: &str, value: &str) -> Result<bool>;
}

/// Replaces quote characters and strips line breaks so a value always fits
/// on a single quoted line.
pub fn sanitize_value(value: &str) -> String {
    value
        .chars()
        .filter(|c| *c != '\n' && *c != '\r')
        .map(|c| if c == '"' { '\'' } else { c })
        .collect()
}

fn parse_line(line: &str) -> Option<(&str, &str)> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }
    let (key, value) = trimmed.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    Some((key, unquote(value.trim())))
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

fn format_line(key: &str, value: &str) -> String {
    format!("{}=\"{}\"", key, sanitize_value(value))
}

pub struct EnvFileStore {
    path: PathBuf,
}

impl EnvFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Creates the store with `defaults` on first run and appends any
    /// default key missing from an existing file.
    pub fn seed(&self, defaults: &[(&str, &str)]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).context("Failed to create store directory")?;
        }
        let _lock = self.lock()?;

        let existing = if self.path.exists() {
            fs::read_to_string(&self.path).context("Failed to read store file")?
        } else {
            info!("Store file not found, seeding defaults at {:?}", self.path);
            String::new()
        };

        let mut lines: Vec<String> = existing.lines().map(String::from).collect();
        let mut added = 0;
        for (key, value) in defaults {
            let present = lines
                .iter()
                .any(|line| parse_line(line).map(|(k, _)| k == *key).unwrap_or(false));
            if !present {
                lines.push(format_line(key, value));
                added += 1;
            }
        }

        if added > 0 || !self.path.exists() {
            debug!("Seeding {} missing store keys", added);
            self.write_atomic(&lines)?;
        }
        Ok(())
    }

    fn lock(&self) -> Result<StoreLock> {
        let lock_path = self.path.with_extension("lock");
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .with_context(|| format!("Failed to open store lock {:?}", lock_path))?;
        file.lock_exclusive()
            .context("Failed to acquire store lock")?;
        Ok(StoreLock { file })
    }

    fn write_atomic(&self, lines: &[String]) -> Result<()> {
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut tmp =
            tempfile::NamedTempFile::new_in(dir).context("Failed to create temp store file")?;
        for line in lines {
            writeln!(tmp, "{}", line).context("Failed to write temp store file")?;
        }
        tmp.as_file()
            .sync_all()
            .context("Failed to flush temp store file")?;
        tmp.persist(&self.path)
            .with_context(|| format!("Failed to replace store file {:?}", self.path))?;
        Ok(())
    }
}

struct StoreLock {
    file: File,
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

impl ConfigStore for EnvFileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read store file {:?}", self.path))?;
        Ok(content
            .lines()
            .filter_map(parse_line)
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.to_string()))
    }

    fn set(&self, key: &str, value: &str) -> Result<bool> {
        let _lock = self.lock()?;
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read store file {:?}", self.path))?;

        let mut found = false;
        let lines: Vec<String> = content
            .lines()
            .map(|line| match parse_line(line) {
                Some((k, _)) if k == key => {
                    found = true;
                    format_line(key, value)
                }
                _ => line.to_string(),
            })
            .collect();

        if !found {
            debug!("Ignoring write to unknown store key {}", key);
            return Ok(false);
        }

        self.write_atomic(&lines)?;
        Ok(true)
    }
}
