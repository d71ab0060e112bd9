//! Level meter endpoint.

use crate::controller::SourceController;
use crate::meter::MeterState;
use axum::{extract::State, response::Json, routing::get, Router};
use std::sync::Arc;

pub fn router(controller: Arc<SourceController>) -> Router {
    Router::new()
        .route("/meter", get(meter_snapshot))
        .with_state(controller)
}

/// GET /meter - Latest smoothed level of the active source.
async fn meter_snapshot(State(controller): State<Arc<SourceController>>) -> Json<MeterState> {
    Json(controller.meter_snapshot().await)
}
