//! Stream parameter endpoints.
//!
//! Each change is persisted and the affected running stream is restarted.

use crate::api::error::ApiResult;
use crate::controller::SourceController;
use axum::{extract::State, response::Json, routing::put, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct VolumeRequest {
    pub gain: f64,
}

#[derive(Debug, Deserialize)]
pub struct DeviceRequest {
    pub device: String,
}

#[derive(Debug, Deserialize)]
pub struct NameRequest {
    pub name: String,
}

pub fn router(controller: Arc<SourceController>) -> Router {
    Router::new()
        .route("/volume", put(set_volume))
        .route("/linein-device", put(set_linein_device))
        .route("/spotify-name", put(set_spotify_name))
        .with_state(controller)
}

/// PUT /volume - Set the stream gain (0.0..=1.5).
async fn set_volume(
    State(controller): State<Arc<SourceController>>,
    Json(request): Json<VolumeRequest>,
) -> ApiResult<Json<Value>> {
    controller.set_volume(request.gain).await?;
    Ok(Json(json!({ "ok": true, "volume": request.gain })))
}

/// PUT /linein-device - Set the line-in capture device (`auto`, `default`, `hw:`, `plughw:`).
async fn set_linein_device(
    State(controller): State<Arc<SourceController>>,
    Json(request): Json<DeviceRequest>,
) -> ApiResult<Json<Value>> {
    controller.set_linein_device(&request.device).await?;
    Ok(Json(json!({ "ok": true, "linein_device": request.device.trim() })))
}

/// PUT /spotify-name - Set the advertised Spotify device name.
async fn set_spotify_name(
    State(controller): State<Arc<SourceController>>,
    Json(request): Json<NameRequest>,
) -> ApiResult<Json<Value>> {
    controller.set_spotify_name(&request.name).await?;
    Ok(Json(json!({ "ok": true, "spotify_name": request.name.trim() })))
}
