// src/server/router.rs

//! Builds the axum `Router` for the nine data-path operations plus `health`
//!: a panic boundary and access logging wrap every route.

use super::handlers::{get, health, keyspace, map, put};
use super::middleware::access_log;
use crate::core::state::ServerState;
use axum::BoxError;
use axum::Router;
use axum::error_handling::HandleErrorLayer;
use axum::http::StatusCode;
use axum::routing::{get as http_get, post};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower::timeout::TimeoutLayer;
use tower_http::catch_panic::CatchPanicLayer;

pub fn build(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/prepare_put", http_get(put::prepare_put))
        .route("/confirm_put", http_get(put::confirm_put))
        .route("/prepare_get", http_get(get::prepare_get))
        .route("/confirm_get", http_get(get::confirm_get))
        .route("/delete", http_get(keyspace::delete))
        .route("/list", http_get(keyspace::list))
        .route("/list_buckets", http_get(keyspace::list_buckets))
        .route("/eval", http_get(keyspace::eval))
        .route("/map", post(map::map))
        .route("/map_to_n", post(map::map_to_n))
        .route("/map_from_n", post(map::map_from_n))
        .route("/health", http_get(health::health))
        .layer(axum::middleware::from_fn(access_log))
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(handle_timeout))
                .layer(TimeoutLayer::new(request_timeout())),
        )
        .with_state(state)
}

async fn handle_timeout(err: BoxError) -> (StatusCode, String) {
    if err.is::<tower::timeout::error::Elapsed>() {
        (StatusCode::REQUEST_TIMEOUT, "request exceeded the server's idle ceiling".to_string())
    } else {
        (StatusCode::INTERNAL_SERVER_ERROR, format!("unhandled error: {err}"))
    }
}

/// Turns a caught panic into an HTTP 500, logging the reason instead of
/// letting it crash the task.
fn handle_panic(err: Box<dyn std::any::Any + Send + 'static>) -> axum::response::Response {
    let reason = if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    };
    tracing::error!(reason = %reason, "request handler panicked");
    axum::response::Response::builder()
        .status(axum::http::StatusCode::INTERNAL_SERVER_ERROR)
        .body(axum::body::Body::from(reason))
        .expect("building a panic response body never fails")
}

/// Server read/write/idle timeouts equal `MaxTimeout`.
pub fn request_timeout() -> Duration {
    crate::core::limits::MAX_TIMEOUT
}
