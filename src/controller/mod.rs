//! Source controller.
//!
//! Keeps at most one stream process running, persists the selection and
//! points the level sampler at whatever is active. Operations are
//! best-effort: a failing step aborts the remaining ones but nothing is
//! rolled back. Overlapping selections are not serialized; the last
//! supervisor and store write wins.

mod error;
mod source;
pub mod validate;

pub use error::{ControllerError, SelectStep};
pub use source::Source;

use crate::config::{Config, ServicesConfig};
use crate::meter::{MeterState, SamplerHandle};
use crate::resolver::{self, DeviceLister, AUTO_DEVICE};
use crate::store::{keys, ConfigStore};
use crate::supervisor::ServiceSupervisor;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

const DEFAULT_VOLUME: f64 = 1.0;

/// Supervisor unit names of the two stream processes.
#[derive(Debug, Clone)]
pub struct StreamServices {
    pub spotify: String,
    pub linein: String,
}

impl From<&ServicesConfig> for StreamServices {
    fn from(config: &ServicesConfig) -> Self {
        Self {
            spotify: config.spotify_stream.clone(),
            linein: config.linein_stream.clone(),
        }
    }
}

/// Snapshot returned by [`SourceController::current_status`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceStatus {
    pub spotify_active: bool,
    pub linein_active: bool,
    pub volume: f64,
    pub last_source: Source,
    pub linein_device: String,
    pub spotify_name: String,
}

pub struct SourceController {
    supervisor: Arc<dyn ServiceSupervisor>,
    store: Arc<dyn ConfigStore>,
    lister: Arc<dyn DeviceLister>,
    sampler: SamplerHandle,
    services: StreamServices,
    spotify_device: String,
}

impl SourceController {
    pub fn new(
        supervisor: Arc<dyn ServiceSupervisor>,
        store: Arc<dyn ConfigStore>,
        lister: Arc<dyn DeviceLister>,
        sampler: SamplerHandle,
        config: &Config,
    ) -> Self {
        Self {
            supervisor,
            store,
            lister,
            sampler,
            services: StreamServices::from(&config.services),
            spotify_device: config.meter.spotify_device.clone(),
        }
    }

    /// Makes `requested` the only active source.
    pub async fn select_source(&self, requested: Source) -> Result<Source, ControllerError> {
        info!("Selecting source {}", requested);
        for step in Self::select_plan(requested) {
            if let Err(e) = self.run_step(step, requested).await {
                warn!("Source selection aborted at {:?}: {}", step, e);
                return Err(e);
            }
        }
        info!("Source {} selected", requested);
        Ok(requested)
    }

    fn select_plan(requested: Source) -> Vec<SelectStep> {
        let mut steps = vec![SelectStep::StopStreams];
        if requested != Source::Off {
            steps.push(SelectStep::StartStream);
        }
        steps.push(SelectStep::Persist);
        steps.push(SelectStep::Retarget);
        steps
    }

    async fn run_step(&self, step: SelectStep, requested: Source) -> Result<(), ControllerError> {
        match step {
            SelectStep::StopStreams => {
                for service in [&self.services.spotify, &self.services.linein] {
                    self.supervisor.stop(service).await.map_err(|e| {
                        ControllerError::StopFailed {
                            service: service.clone(),
                            cause: format!("{:#}", e),
                        }
                    })?;
                }
                Ok(())
            }
            SelectStep::StartStream => {
                let Some(service) = self.service_for(requested) else {
                    return Ok(());
                };
                self.supervisor
                    .start(service)
                    .await
                    .map_err(|e| ControllerError::StartFailed {
                        stream: requested,
                        cause: format!("{:#}", e),
                    })
            }
            SelectStep::Persist => self.persist(keys::LAST_SOURCE, requested.as_str()).await,
            SelectStep::Retarget => {
                self.retarget(requested).await;
                Ok(())
            }
        }
    }

    /// Observed truth from the supervisor, never the persisted intent.
    pub async fn current_source(&self) -> Source {
        if self.supervisor.is_active(&self.services.spotify).await {
            Source::Spotify
        } else if self.supervisor.is_active(&self.services.linein).await {
            Source::LineIn
        } else {
            Source::Off
        }
    }

    pub async fn current_status(&self) -> SourceStatus {
        let spotify_active = self.supervisor.is_active(&self.services.spotify).await;
        let linein_active = self.supervisor.is_active(&self.services.linein).await;

        let volume = self
            .stored(keys::VOLUME)
            .await
            .and_then(|raw| raw.trim().parse::<f64>().ok())
            .unwrap_or(DEFAULT_VOLUME);
        let last_source = self
            .stored(keys::LAST_SOURCE)
            .await
            .and_then(|raw| raw.parse::<Source>().ok())
            .unwrap_or_default();

        SourceStatus {
            spotify_active,
            linein_active,
            volume,
            last_source,
            linein_device: self
                .stored(keys::LINEIN_CAPTURE)
                .await
                .unwrap_or_else(|| AUTO_DEVICE.to_string()),
            spotify_name: self.stored(keys::SPOTIFY_NAME).await.unwrap_or_default(),
        }
    }

    pub async fn meter_snapshot(&self) -> MeterState {
        self.sampler.meter().snapshot().await
    }

    pub async fn set_volume(&self, gain: f64) -> Result<(), ControllerError> {
        let gain = validate::gain(gain)?;
        let services = [self.services.spotify.clone(), self.services.linein.clone()];
        self.apply_setting(keys::VOLUME, &gain.to_string(), &services)
            .await
    }

    pub async fn set_linein_device(&self, device: &str) -> Result<(), ControllerError> {
        let device = validate::linein_device(device)?;
        let services = [self.services.linein.clone()];
        self.apply_setting(keys::LINEIN_CAPTURE, &device, &services)
            .await
    }

    pub async fn set_spotify_name(&self, name: &str) -> Result<(), ControllerError> {
        let name = validate::spotify_name(name)?;
        let services = [self.services.spotify.clone()];
        self.apply_setting(keys::SPOTIFY_NAME, &name, &services)
            .await
    }

    /// Re-applies the persisted selection once at startup.
    pub async fn restore_selection(&self) -> Result<Source, ControllerError> {
        let source = match self.stored(keys::LAST_SOURCE).await {
            Some(raw) => raw.parse::<Source>().unwrap_or_else(|e| {
                warn!("Ignoring persisted selection: {}", e);
                Source::Off
            }),
            None => Source::Off,
        };
        info!("Restoring persisted source {}", source);
        self.select_source(source).await
    }

    /// Persists a parameter and restarts the affected streams that are
    /// currently running. Stopped streams stay stopped.
    async fn apply_setting(
        &self,
        key: &str,
        value: &str,
        affected: &[String],
    ) -> Result<(), ControllerError> {
        self.persist(key, value).await?;
        info!("{} set to {}", key, value);

        for service in affected {
            if !self.supervisor.is_active(service).await {
                continue;
            }
            info!("Restarting {} to apply {}", service, key);
            self.supervisor
                .restart(service)
                .await
                .map_err(|e| ControllerError::RestartFailed {
                    service: service.clone(),
                    cause: format!("{:#}", e),
                })?;
        }

        let active = self.current_source().await;
        self.retarget(active).await;
        Ok(())
    }

    /// Store calls may block on the file lock; they run on the blocking pool.
    async fn persist(&self, key: &str, value: &str) -> Result<(), ControllerError> {
        let store = self.store.clone();
        let (owned_key, owned_value) = (key.to_string(), value.to_string());
        let written = tokio::task::spawn_blocking(move || store.set(&owned_key, &owned_value))
            .await
            .map_err(|e| ControllerError::PersistFailed {
                cause: format!("store task failed: {}", e),
            })?;

        match written {
            Ok(true) => Ok(()),
            Ok(false) => Err(ControllerError::PersistFailed {
                cause: format!("{} is not present in the config store", key),
            }),
            Err(e) => Err(ControllerError::PersistFailed {
                cause: format!("{:#}", e),
            }),
        }
    }

    async fn stored(&self, key: &str) -> Option<String> {
        let store = self.store.clone();
        let owned_key = key.to_string();
        match tokio::task::spawn_blocking(move || store.get(&owned_key)).await {
            Ok(Ok(value)) => value,
            Ok(Err(e)) => {
                warn!("Failed to read {} from config store: {:#}", key, e);
                None
            }
            Err(e) => {
                warn!("Config store task for {} failed: {}", key, e);
                None
            }
        }
    }

    fn service_for(&self, source: Source) -> Option<&String> {
        match source {
            Source::Spotify => Some(&self.services.spotify),
            Source::LineIn => Some(&self.services.linein),
            Source::Off => None,
        }
    }

    async fn retarget(&self, source: Source) {
        let device = self.capture_device(source).await;
        self.sampler.retarget(source, &device).await;
    }

    async fn capture_device(&self, source: Source) -> String {
        match source {
            Source::Spotify => self.spotify_device.clone(),
            Source::LineIn => {
                let configured = self
                    .stored(keys::LINEIN_CAPTURE)
                    .await
                    .unwrap_or_else(|| AUTO_DEVICE.to_string());
                resolver::resolve_linein_device(&configured, self.lister.as_ref()).await
            }
            Source::Off => String::new(),
        }
    }
}
