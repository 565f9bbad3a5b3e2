// [[AUTORL]]/apps/autorl-kernel/src/server/mod.rs
// Purpose: HTTP/WebSocket surface of the kernel.
// Architecture: API Layer
// Dependencies: Axum, Tower HTTP

pub mod handlers;

use axum::{
    http::Method,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::runtime::AutoRLRuntime;

pub fn router(runtime: Arc<AutoRLRuntime>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health))
        .route("/demo/primary", post(handlers::start_primary))
        .route("/demo/cross-app", post(handlers::start_cross_app))
        .route("/runtime/status", get(handlers::runtime_status))
        .route("/runtime/state", get(handlers::get_runtime_state))
        .route("/api/devices", get(handlers::list_devices))
        .route("/api/metrics", get(handlers::get_metrics))
        .route("/api/activity", get(handlers::get_activity))
        .route("/ws/events", get(handlers::ws_event_stream))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(runtime)
}
