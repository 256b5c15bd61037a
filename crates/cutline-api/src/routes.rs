//! API routes.

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

use crate::handlers::{
    cut_remote, cut_upload, download, download_cut, download_segment, health, job_status,
    prepare_source, ready, search, video_info,
};
use crate::metrics::metrics_middleware;
use crate::middleware::{
    cors_layer, rate_limit_middleware, request_id, request_logging, security_headers,
    RateLimiterCache,
};
use crate::state::AppState;

/// Create the API router.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    // Cheap lookups, bounded by the request timeout
    let lookup_routes = Router::new()
        .route("/video-info", post(video_info))
        .route("/job-status/:job_id", get(job_status))
        .route("/search", get(search))
        .layer(TimeoutLayer::new(state.config.request_timeout));

    // Routes that download a source or stream an artifact run unbounded
    let transfer_routes = Router::new()
        .route("/prepare-youtube", post(prepare_source))
        .route("/cut-youtube", post(cut_remote))
        .route("/download", post(download))
        .route("/download-cut/:job_id/:filename", get(download_cut))
        .route("/jobs/:job_id/segments/:ordinal", get(download_segment));

    let json_routes = Router::new()
        .merge(lookup_routes)
        .merge(transfer_routes)
        .layer(RequestBodyLimitLayer::new(state.config.max_body_size));

    // Uploads are spooled to disk, so they get their own, larger limit
    let upload_routes = Router::new()
        .route("/cut-video", post(cut_upload))
        .layer(DefaultBodyLimit::max(state.config.max_upload_size))
        .layer(RequestBodyLimitLayer::new(state.config.max_upload_size));

    let rate_limiter = Arc::new(RateLimiterCache::new(
        state.config.rate_limit_rps,
        state.config.rate_limit_burst,
    ));

    let api_routes = Router::new()
        .merge(json_routes)
        .merge(upload_routes)
        .layer(middleware::from_fn_with_state(
            rate_limiter,
            rate_limit_middleware,
        ));

    let health_routes = Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health))
        .route("/ready", get(ready));

    let metrics_routes = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    Router::new()
        .nest("/api", api_routes)
        .merge(health_routes)
        .merge(metrics_routes)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(security_headers))
        .layer(middleware::from_fn(request_logging))
        .layer(middleware::from_fn(request_id))
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}
