// src/server/middleware.rs

//! Access logging for the HTTP dispatcher: every request is
//! logged with status, method, path+query, client address, and elapsed
//! seconds.

use axum::extract::{ConnectInfo, Request};
use axum::middleware::Next;
use axum::response::Response;
use std::net::SocketAddr;
use std::time::Instant;
use tracing::info;

pub async fn access_log(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    req: Request,
    next: Next,
) -> Response {
    let method = req.method().clone();
    let path_and_query = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());
    let started = Instant::now();

    let response = next.run(req).await;

    info!(
        status = response.status().as_u16(),
        method = %method,
        path = %path_and_query,
        client = %addr,
        elapsed_secs = started.elapsed().as_secs_f64(),
        "request"
    );
    response
}
