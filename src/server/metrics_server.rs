// src/server/metrics_server.rs

use crate::core::metrics::{POOL_IN_USE, gather_metrics};
use crate::core::state::ServerState;
use axum::{Router, http::StatusCode, response::IntoResponse, routing::get};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};

/// Handles HTTP requests to the `/metrics` endpoint.
async fn metrics_handler(state: Arc<ServerState>) -> impl IntoResponse {
    crate::core::metrics::ACTIVE_JOBS.set(state.jobs.len() as f64);
    let pools = &state.config.pools;
    POOL_IN_USE
        .with_label_values(&["io_send"])
        .set((pools.io_send.saturating_sub(state.pools.io_send.available_permits())) as f64);
    POOL_IN_USE
        .with_label_values(&["io_recv"])
        .set((pools.io_recv.saturating_sub(state.pools.io_recv.available_permits())) as f64);
    POOL_IN_USE
        .with_label_values(&["cpu"])
        .set((pools.cpu.saturating_sub(state.pools.cpu.available_permits())) as f64);
    POOL_IN_USE
        .with_label_values(&["misc"])
        .set((pools.misc.saturating_sub(state.pools.misc.available_permits())) as f64);

    let body = gather_metrics();
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4")],
        body,
    )
}

/// Runs a small HTTP server exposing Prometheus metrics on `/metrics`.
pub async fn run_metrics_server(state: Arc<ServerState>, mut shutdown_rx: broadcast::Receiver<()>) {
    let port = state.config.metrics_port();
    let app = Router::new().route("/metrics", get(move || metrics_handler(state.clone())));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("metrics server listening on http://{addr}/metrics");

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            error!(error = %e, port, "failed to bind metrics server");
            return;
        }
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_rx.recv().await.ok();
            info!("metrics server shutting down");
        })
        .await
        .unwrap();
}
