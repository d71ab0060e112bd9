//! Live level meter for the active source.
//!
//! [`MeterHandle`] is the shared, lock-guarded meter state. It is built once
//! at startup and handed to both the [`LevelSampler`] task (the only writer)
//! and the query surface.

pub mod capture;
pub mod level;
pub mod sampler;

pub use capture::{CaptureProcess, CaptureSpawner, CommandSpawner};
pub use sampler::{LevelSampler, SamplerHandle, SamplerSettings};

use crate::controller::Source;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeterState {
    /// Smoothed loudness, always within 0..=100.
    pub level: u8,
    pub source: Source,
    pub device: String,
    pub last_error: Option<String>,
}

impl Default for MeterState {
    fn default() -> Self {
        Self {
            level: 0,
            source: Source::Off,
            device: String::new(),
            last_error: None,
        }
    }
}

#[derive(Clone, Default)]
pub struct MeterHandle {
    inner: Arc<Mutex<MeterState>>,
}

impl MeterHandle {
    pub async fn snapshot(&self) -> MeterState {
        self.inner.lock().await.clone()
    }

    /// No target: level 0, no device, no error.
    pub(crate) async fn set_idle(&self, source: Source) {
        let mut state = self.inner.lock().await;
        *state = MeterState {
            source,
            ..MeterState::default()
        };
    }

    /// A fresh capture is running for `device`.
    pub(crate) async fn set_sampling(&self, source: Source, device: &str) {
        let mut state = self.inner.lock().await;
        state.level = 0;
        state.source = source;
        state.device = device.to_string();
        state.last_error = None;
    }

    pub(crate) async fn set_target_failed(&self, source: Source, device: &str, error: String) {
        let mut state = self.inner.lock().await;
        state.level = 0;
        state.source = source;
        state.device = device.to_string();
        state.last_error = Some(error);
    }

    /// Records a capture failure on the current target and drops the level.
    pub(crate) async fn record_error(&self, error: String) {
        let mut state = self.inner.lock().await;
        state.level = 0;
        state.last_error = Some(error);
    }

    /// Folds an instantaneous reading into the smoothed level.
    pub(crate) async fn apply_instant(&self, instant: u8) -> u8 {
        let mut state = self.inner.lock().await;
        state.level = level::smooth(state.level, instant);
        state.level
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_default_snapshot_is_idle() {
        let meter = MeterHandle::default();
        let state = meter.snapshot().await;
        assert_eq!(state.level, 0);
        assert_eq!(state.source, Source::Off);
        assert!(state.device.is_empty());
        assert!(state.last_error.is_none());
    }

    #[tokio::test]
    async fn test_apply_instant_smooths() {
        let meter = MeterHandle::default();
        meter.set_sampling(Source::LineIn, "hw:1,0").await;
        assert_eq!(meter.apply_instant(80).await, 80);
        assert_eq!(meter.apply_instant(0).await, 64);
        assert_eq!(meter.apply_instant(0).await, 51);
    }

    #[tokio::test]
    async fn test_record_error_zeroes_level_keeps_target() {
        let meter = MeterHandle::default();
        meter.set_sampling(Source::Spotify, "hw:Loopback,1,0").await;
        meter.apply_instant(70).await;
        meter.record_error("capture exited".to_string()).await;

        let state = meter.snapshot().await;
        assert_eq!(state.level, 0);
        assert_eq!(state.device, "hw:Loopback,1,0");
        assert_eq!(state.last_error.as_deref(), Some("capture exited"));
    }

    #[tokio::test]
    async fn test_set_idle_clears_everything() {
        let meter = MeterHandle::default();
        meter
            .set_target_failed(Source::LineIn, "hw:9,0", "no such device".to_string())
            .await;
        meter.set_idle(Source::Off).await;
        assert_eq!(meter.snapshot().await, MeterState::default());
    }

    #[test]
    fn test_meter_state_serializes_lowercase_source() {
        let state = MeterState {
            level: 42,
            source: Source::LineIn,
            device: "hw:1,0".to_string(),
            last_error: None,
        };
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["source"], "linein");
        assert_eq!(json["level"], 42);
    }
}
