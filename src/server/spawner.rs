// src/server/spawner.rs

//! Spawns all of the server's long-running background tasks.

use super::context::ServerContext;
use super::metrics_server;
use crate::core::tasks::gc::GcTask;
use anyhow::Result;
use tracing::info;

/// Spawns all background tasks into the provided `JoinSet`.
pub async fn spawn_all(ctx: &mut ServerContext) -> Result<()> {
    let server_state = &ctx.state;
    let shutdown_tx = &ctx.shutdown_tx;
    let background_tasks = &mut ctx.background_tasks;

    if server_state.config.metrics.enabled {
        let metrics_state = server_state.clone();
        let shutdown_rx = shutdown_tx.subscribe();
        background_tasks.spawn(async move {
            metrics_server::run_metrics_server(metrics_state, shutdown_rx).await;
            Ok(())
        });
    } else {
        info!("metrics server is disabled in the configuration");
    }

    let gc_task = GcTask::new(server_state.clone());
    let shutdown_rx = shutdown_tx.subscribe();
    background_tasks.spawn(async move {
        gc_task.run(shutdown_rx).await;
        Ok(())
    });

    info!("all background tasks have been spawned");
    Ok(())
}
