//! Source selection endpoints.
//!
//! - POST /source - Make one source active
//! - GET  /status - Stream, selection and parameter status

use crate::api::error::{ApiError, ApiResult};
use crate::controller::{ControllerError, Source, SourceController, SourceStatus};
use axum::{
    extract::State,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct SelectRequest {
    /// `spotify`, `linein` or `off`
    pub source: String,
}

pub fn router(controller: Arc<SourceController>) -> Router {
    Router::new()
        .route("/source", post(select_source))
        .route("/status", get(current_status))
        .with_state(controller)
}

/// POST /source - Select the active source.
async fn select_source(
    State(controller): State<Arc<SourceController>>,
    Json(request): Json<SelectRequest>,
) -> ApiResult<Json<Value>> {
    info!("Source change requested via API: {}", request.source);
    let requested: Source = request
        .source
        .parse()
        .map_err(|e: ControllerError| ApiError::bad_request(e.to_string()))?;
    let active = controller.select_source(requested).await?;
    Ok(Json(json!({
        "ok": true,
        "active_source": active,
    })))
}

/// GET /status - Current stream and parameter status.
async fn current_status(State(controller): State<Arc<SourceController>>) -> Json<SourceStatus> {
    Json(controller.current_status().await)
}
