// src/test_support.rs

//! An in-process cluster harness for the integration test suite: binds real
//! HTTP listeners backed by `ServerState`s rooted at caller-supplied
//! directories, without going through `server::run`'s config file loading.

use crate::config::ServerConfig;
use crate::core::state::ServerState;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

pub struct TestNode {
    pub addr: SocketAddr,
    pub state: Arc<ServerState>,
}

/// Binds `data_dirs.len()` listeners up front (so every node knows the full
/// cluster's addresses before any `ServerState` is built), then brings each
/// node up serving on its own address.
pub async fn spawn_cluster(data_dirs: &[&Path]) -> Vec<TestNode> {
    let mut listeners = Vec::with_capacity(data_dirs.len());
    let mut servers = Vec::with_capacity(data_dirs.len());
    for _ in data_dirs {
        let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0))
            .await
            .expect("failed to bind test listener");
        let addr = listener.local_addr().expect("local_addr");
        servers.push(addr.to_string());
        listeners.push((listener, addr));
    }

    let mut nodes = Vec::with_capacity(data_dirs.len());
    for (data_dir, (listener, addr)) in data_dirs.iter().zip(listeners) {
        let mut config = ServerConfig::default();
        config.data_dir = data_dir.to_string_lossy().into_owned();
        config.metrics.enabled = false;

        let state = ServerState::initialize(config, servers.clone(), addr.to_string())
            .await
            .expect("failed to initialize test node state");

        let router = crate::server::router(state.clone());
        tokio::spawn(async move {
            let _ = axum::serve(
                listener,
                router.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await;
        });

        nodes.push(TestNode { addr, state });
    }
    nodes
}

/// Convenience wrapper for the common single-node test case.
pub async fn spawn_node(data_dir: &Path) -> TestNode {
    spawn_cluster(&[data_dir]).await.remove(0)
}
