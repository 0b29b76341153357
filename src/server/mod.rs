// src/server/mod.rs

use crate::config::ServerConfig;
use anyhow::Result;
use std::net::SocketAddr;
use tracing::info;

mod context;
mod handlers;
mod initialization;
mod metrics_server;
mod middleware;
mod router;
mod spawner;

/// Builds the HTTP router for a given state without binding or serving it;
/// used by the in-process test harness to stand up a node on an ephemeral
/// port.
pub fn router(state: std::sync::Arc<crate::core::state::ServerState>) -> axum::Router {
    router::build(state)
}

pub async fn run(config: ServerConfig) -> Result<()> {
    let mut ctx = initialization::setup(config).await?;
    spawner::spawn_all(&mut ctx).await?;

    let app = router::build(ctx.state.clone());
    let local_addr = ctx.listener.local_addr()?;
    info!(%local_addr, "s4 server ready");

    let mut shutdown_rx = ctx.shutdown_tx.subscribe();
    axum::serve(
        ctx.listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        shutdown_rx.recv().await.ok();
        info!("s4 server shutting down");
    })
    .await?;

    while ctx.background_tasks.join_next().await.is_some() {}
    Ok(())
}
