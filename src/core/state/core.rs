// src/core/state/core.rs

//! Defines the central `ServerState` struct, holding all shared server-wide
//! state.

use super::stats::StatsState;
use crate::config::ServerConfig;
use crate::core::S4Error;
use crate::core::fs_layout::{TEMPDIRS_DIR, TEMPFILES_DIR};
use crate::core::jobs::{JobMap, new_job_map};
use crate::core::pools::ResourcePools;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// The central struct holding all shared, server-wide state. Wrapped in an
/// `Arc` and passed to every handler and background task.
pub struct ServerState {
    pub config: ServerConfig,
    /// The cluster's ordered `address:port` list; this order defines shard
    /// indices.
    pub servers: Vec<String>,
    /// This node's own entry in `servers`, normalized for self-comparison.
    pub self_addr: String,
    pub pools: Arc<ResourcePools>,
    pub jobs: JobMap,
    pub data_root: PathBuf,
    pub stats: StatsState,
    pub http: reqwest::Client,
}

impl ServerState {
    /// Initializes the server state: resource pools, job map, and the
    /// on-disk root's reserved directories.
    pub async fn initialize(
        config: ServerConfig,
        servers: Vec<String>,
        self_addr: String,
    ) -> Result<Arc<Self>, S4Error> {
        let data_root = PathBuf::from(&config.data_dir);
        tokio::fs::create_dir_all(data_root.join(TEMPFILES_DIR)).await?;
        tokio::fs::create_dir_all(data_root.join(TEMPDIRS_DIR)).await?;

        let pools = ResourcePools::new(&config.pools);
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| S4Error::Internal(format!("failed to build http client: {e}")))?;

        info!(%self_addr, servers = servers.len(), "server state initialized");

        Ok(Arc::new(Self {
            config,
            servers,
            self_addr,
            pools,
            jobs: new_job_map(),
            data_root,
            stats: StatsState::new(),
            http,
        }))
    }

    /// Whether `key` is owned by this node.
    pub fn owns(&self, key: &str) -> Result<bool, S4Error> {
        crate::core::shard::on_this_server(key, &self.self_addr, &self.servers)
    }

    pub fn pick_server(&self, key: &str) -> Result<&str, S4Error> {
        crate::core::shard::pick_server(key, &self.servers)
    }
}
