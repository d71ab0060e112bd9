//! REST API server for sourcectl.
//!
//! Provides HTTP endpoints for:
//! - Source selection and status
//! - Live level meter
//! - Volume, line-in device and Spotify name changes

pub mod error;
pub mod routes;

use crate::config::ApiConfig;
use crate::controller::SourceController;
use anyhow::{Context, Result};
use axum::{response::Json, routing::get, Router};
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use tower::ServiceBuilder;
use tracing::info;

pub struct ApiServer {
    bind: String,
    port: u16,
    controller: Arc<SourceController>,
}

impl ApiServer {
    pub fn new(controller: Arc<SourceController>, config: &ApiConfig) -> Self {
        Self {
            bind: config.bind.clone(),
            port: config.port,
            controller,
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/", get(status))
            .merge(routes::source::router(self.controller.clone()))
            .merge(routes::meter::router(self.controller.clone()))
            .merge(routes::settings::router(self.controller.clone()))
            .layer(ServiceBuilder::new())
    }

    /// Serves until `shutdown` resolves.
    pub async fn start(self, shutdown: impl Future<Output = ()> + Send + 'static) -> Result<()> {
        let app = self.router();
        let addr = format!("{}:{}", self.bind, self.port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind {}", addr))?;

        info!("API server listening on http://{}", addr);
        info!("Endpoints:");
        info!("  GET  /               - Service info");
        info!("  GET  /status         - Stream and parameter status");
        info!("  GET  /meter          - Live level meter");
        info!("  POST /source         - Select spotify, linein or off");
        info!("  PUT  /volume         - Set stream gain");
        info!("  PUT  /linein-device  - Set line-in capture device");
        info!("  PUT  /spotify-name   - Set Spotify device name");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;

        Ok(())
    }
}

async fn status() -> Json<Value> {
    Json(json!({
        "service": "sourcectl",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running"
    }))
}
