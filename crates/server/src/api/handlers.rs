use axum::http::header;
use axum::response::IntoResponse;
use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;
use stickerkit_core::processor::ProcessorStatus;
use stickerkit_core::PublicConfig;

use crate::metrics::{collect_dynamic_metrics, encode_metrics};
use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub processor: ProcessorStatus,
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        processor: state.processor().status(),
    })
}

pub async fn get_config(State(state): State<Arc<AppState>>) -> Json<PublicConfig> {
    Json(state.public_config())
}

/// GET /metrics in Prometheus text format.
pub async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    collect_dynamic_metrics(&state);
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        encode_metrics(),
    )
}
