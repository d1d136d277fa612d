use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use super::{convert, download, handlers, middleware::metrics_middleware, ws};
use crate::state::AppState;

/// Room for multipart framing on top of the file size limit.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

pub fn create_router(state: Arc<AppState>) -> Router {
    let body_limit =
        usize::try_from(state.config().upload.max_file_size).unwrap_or(usize::MAX);
    let body_limit = body_limit.saturating_add(MULTIPART_OVERHEAD);
    let output_dir = state.config().paths.output.clone();
    let output_prefix = {
        let prefix = state.config().paths.output_url_prefix.trim_end_matches('/');
        // Absolute URLs point at an external host; serve locally under /output.
        if !prefix.starts_with('/') || prefix.len() < 2 {
            "/output".to_string()
        } else {
            prefix.to_string()
        }
    };

    // API routes
    let api_routes = Router::new()
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        .route("/convert-image", post(convert::convert_image))
        .route("/convert-video", post(convert::convert_video))
        .route("/download-batch", post(download::download_batch))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(Arc::clone(&state));

    Router::new()
        .nest("/api", api_routes)
        .route("/ws", get(ws::ws_handler))
        .route("/metrics", get(handlers::metrics))
        .with_state(state)
        .nest_service(&output_prefix, ServeDir::new(output_dir))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(middleware::from_fn(metrics_middleware)),
        )
}
