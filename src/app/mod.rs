use crate::api::ApiServer;
use crate::config::Config;
use crate::controller::SourceController;
use crate::meter::{CommandSpawner, LevelSampler, MeterHandle, SamplerSettings};
use crate::resolver::ArecordLister;
use crate::store::{EnvFileStore, DEFAULTS};
use crate::supervisor::SystemdSupervisor;
use anyhow::Result;
use std::sync::Arc;
use tracing::{error, info, warn};

pub async fn run_service() -> Result<()> {
    info!("Starting sourcectl service");

    let config = Config::load()?;

    let store = Arc::new(EnvFileStore::new(config.store_path()?));
    let seeding = store.clone();
    tokio::task::spawn_blocking(move || seeding.seed(DEFAULTS)).await??;
    info!("Using config store {:?}", store.path());

    let supervisor = Arc::new(SystemdSupervisor::new(config.services.user)?);
    let lister = Arc::new(ArecordLister::new(&config.resolver));

    let meter = MeterHandle::default();
    let (sampler, sampler_task) = LevelSampler::spawn(
        meter,
        Arc::new(CommandSpawner::new(&config.meter)),
        SamplerSettings::from(&config.meter),
    );

    let controller = Arc::new(SourceController::new(
        supervisor,
        store,
        lister,
        sampler.clone(),
        &config,
    ));

    // One-shot: bring back whatever was playing before the restart.
    match controller.restore_selection().await {
        Ok(source) => info!("Restored source {}", source),
        Err(e) => warn!("Failed to restore persisted source: {}", e),
    }

    let api_server = ApiServer::new(controller, &config.api);
    let served = api_server.start(shutdown_signal()).await;

    info!("Shutting down level sampler");
    sampler.shutdown().await;
    if let Err(e) = sampler_task.await {
        error!("Level sampler task failed: {}", e);
    }

    served
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
