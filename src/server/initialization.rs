// src/server/initialization.rs

//! Handles the complete server initialization process: configuration,
//! cluster membership, state setup, and binding the listener.

use super::context::ServerContext;
use crate::config::{ServerConfig, load_servers};
use crate::core::state::ServerState;
use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::info;

/// Initializes all server components before starting the main loop.
pub async fn setup(config: ServerConfig) -> Result<ServerContext> {
    log_startup_info(&config);
    let (shutdown_tx, _) = broadcast::channel(1);

    let servers = load_servers(&config.servers_file)
        .with_context(|| format!("failed to load cluster membership from '{}'", config.servers_file))?;
    let self_addr = resolve_self_addr(&servers, config.port);
    info!(%self_addr, "resolved self address in cluster membership");

    let host = config.host.clone();
    let port = config.port;

    let server_state = ServerState::initialize(config, servers, self_addr).await?;
    info!("server state initialized");

    let listener = TcpListener::bind((host.as_str(), port)).await?;
    info!("s4 server listening on {host}:{port}");

    Ok(ServerContext {
        state: server_state,
        listener,
        shutdown_tx,
        background_tasks: JoinSet::new(),
    })
}

/// Finds this node's entry in the cluster membership list. A server whose
/// port matches ours and whose address is either our configured host or the
/// loopback/wildcard equivalent is treated as self.
fn resolve_self_addr(servers: &[String], port: u16) -> String {
    let suffix = format!(":{port}");
    servers
        .iter()
        .find(|entry| entry.ends_with(&suffix))
        .cloned()
        .unwrap_or_else(|| format!("0.0.0.0{suffix}"))
}

fn log_startup_info(config: &ServerConfig) {
    info!(
        host = %config.host,
        port = config.port,
        data_dir = %config.data_dir,
        "starting s4 server"
    );
}
