//! Prometheus metrics for observability.
//!
//! This module provides metrics for monitoring the sticker service:
//! - HTTP request metrics (latency, counts)
//! - WebSocket listener metrics
//! - Conversion outcomes and compression passes

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts,
    Registry, TextEncoder,
};

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "stickerkit_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
        ]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("stickerkit_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "stickerkit_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

// =============================================================================
// WebSocket Metrics
// =============================================================================

/// Active WebSocket listeners.
pub static WS_CONNECTIONS_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "stickerkit_ws_connections_active",
        "Number of active WebSocket listeners",
    )
    .unwrap()
});

/// Total WebSocket connections since startup.
pub static WS_CONNECTIONS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "stickerkit_ws_connections_total",
        "Total WebSocket connections since startup",
    )
    .unwrap()
});

/// WebSocket messages sent, by message type.
pub static WS_MESSAGES_SENT: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "stickerkit_ws_messages_sent_total",
            "WebSocket messages sent by type",
        ),
        &["type"],
    )
    .unwrap()
});

/// Listeners disconnected for missing a heartbeat.
pub static WS_STALE_TERMINATED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "stickerkit_ws_stale_terminated_total",
        "WebSocket listeners terminated after a missed heartbeat",
    )
    .unwrap()
});

// =============================================================================
// Conversion Metrics
// =============================================================================

/// Finished conversions by kind (image/video) and outcome (success/failure).
pub static CONVERSIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("stickerkit_conversions_total", "Finished sticker conversions"),
        &["kind", "outcome"],
    )
    .unwrap()
});

/// Video jobs that needed the high-compression pass.
pub static SECOND_PASS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "stickerkit_video_second_pass_total",
        "Video conversions that ran the high-compression pass",
    )
    .unwrap()
});

/// Video outputs still over the size ceiling.
pub static NON_COMPLIANT_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "stickerkit_video_non_compliant_total",
        "Video outputs over the size ceiling after both passes",
    )
    .unwrap()
});

/// Conversions currently running.
pub static CONVERSIONS_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "stickerkit_conversions_active",
        "Number of sticker conversions in progress",
    )
    .unwrap()
});

// =============================================================================
// Registration
// =============================================================================

fn register_metrics(registry: &Registry) {
    // HTTP
    registry
        .register(Box::new(HTTP_REQUEST_DURATION.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()))
        .unwrap();

    // WebSocket
    registry
        .register(Box::new(WS_CONNECTIONS_ACTIVE.clone()))
        .unwrap();
    registry
        .register(Box::new(WS_CONNECTIONS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(WS_MESSAGES_SENT.clone()))
        .unwrap();
    registry
        .register(Box::new(WS_STALE_TERMINATED.clone()))
        .unwrap();

    // Conversions
    registry
        .register(Box::new(CONVERSIONS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(SECOND_PASS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(NON_COMPLIANT_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(CONVERSIONS_ACTIVE.clone()))
        .unwrap();
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Refresh gauges that mirror application state.
pub fn collect_dynamic_metrics(state: &crate::state::AppState) {
    let status = state.processor().status();
    CONVERSIONS_ACTIVE.set(status.active_jobs as i64);
}

/// Record a finished conversion.
pub fn record_conversion(kind: &str, success: bool) {
    let outcome = if success { "success" } else { "failure" };
    CONVERSIONS_TOTAL.with_label_values(&[kind, outcome]).inc();
}

/// Normalize a path for metric labels (output file names collapse to one label).
pub fn normalize_path(path: &str) -> String {
    if path.starts_with("/output/") {
        return "/output/{file}".to_string();
    }
    let uuid_regex = regex_lite::Regex::new(
        r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}",
    )
    .unwrap();
    let numeric_regex = regex_lite::Regex::new(r"/\d+(/|$)").unwrap();

    let result = uuid_regex.replace_all(path, "{id}");
    let result = numeric_regex.replace_all(&result, "/{id}$1");
    result.to_string()
}
