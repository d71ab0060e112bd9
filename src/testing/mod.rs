//! In-memory collaborators for unit tests.

use crate::config::MeterConfig;
use crate::meter::{CommandSpawner, LevelSampler, MeterHandle, SamplerHandle, SamplerSettings};
use crate::resolver::DeviceLister;
use crate::store::{ConfigStore, DEFAULTS};
use crate::supervisor::ServiceSupervisor;
use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
pub struct FakeSupervisor {
    active: Mutex<HashSet<String>>,
    failing_starts: Mutex<HashSet<String>>,
    calls: Mutex<Vec<String>>,
}

impl FakeSupervisor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_start(&self, name: &str) {
        self.failing_starts.lock().unwrap().insert(name.to_string());
    }

    /// Simulates a stream process dying outside our control.
    pub fn crash(&self, name: &str) {
        self.active.lock().unwrap().remove(name);
    }

    pub fn set_active(&self, name: &str) {
        self.active.lock().unwrap().insert(name.to_string());
    }

    pub fn active(&self, name: &str) -> bool {
        self.active.lock().unwrap().contains(name)
    }

    /// Recorded mutating calls, e.g. `"start spotify-stream.service"`.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn record(&self, verb: &str, name: &str) {
        self.calls.lock().unwrap().push(format!("{} {}", verb, name));
    }
}

#[async_trait]
impl ServiceSupervisor for FakeSupervisor {
    async fn start(&self, name: &str) -> Result<()> {
        self.record("start", name);
        if self.failing_starts.lock().unwrap().contains(name) {
            bail!("Job for {} failed", name);
        }
        self.set_active(name);
        Ok(())
    }

    async fn stop(&self, name: &str) -> Result<()> {
        self.record("stop", name);
        self.crash(name);
        Ok(())
    }

    async fn restart(&self, name: &str) -> Result<()> {
        self.record("restart", name);
        self.set_active(name);
        Ok(())
    }

    async fn is_active(&self, name: &str) -> bool {
        self.active(name)
    }
}

pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn seeded() -> Arc<Self> {
        let values = DEFAULTS
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Arc::new(Self {
            values: Mutex::new(values),
            fail_writes: AtomicBool::new(false),
        })
    }

    pub fn fail_writes(&self) {
        self.fail_writes.store(true, Ordering::SeqCst);
    }

    pub fn value(&self, key: &str) -> Option<String> {
        self.values.lock().unwrap().get(key).cloned()
    }
}

impl ConfigStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.value(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<bool> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(anyhow!("read-only file system"));
        }
        let mut values = self.values.lock().unwrap();
        match values.get_mut(key) {
            Some(slot) => {
                *slot = value.to_string();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

pub struct FakeLister {
    listing: Option<String>,
    calls: AtomicUsize,
}

impl FakeLister {
    pub fn listing(listing: &str) -> Self {
        Self {
            listing: Some(listing.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            listing: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeviceLister for FakeLister {
    async fn list_capture_devices(&self) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.listing
            .clone()
            .ok_or_else(|| anyhow!("arecord: no soundcards found"))
    }
}

/// A sampler whose captures are silent `sleep` processes.
pub fn quiet_sampler() -> SamplerHandle {
    let config = MeterConfig {
        program: "sleep".to_string(),
        args: vec!["30".to_string()],
        ..MeterConfig::default()
    };
    let settings = SamplerSettings {
        stop_grace: Duration::from_millis(50),
        ..SamplerSettings::from(&config)
    };
    let (handle, _task) = LevelSampler::spawn(
        MeterHandle::default(),
        Arc::new(CommandSpawner::new(&config)),
        settings,
    );
    handle
}
