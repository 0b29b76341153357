// src/config.rs

//! Server configuration: loading, resolving dynamic values, and validation.

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use sysinfo::System;
use tracing::{info, warn};

/// The final, validated, and resolved server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    /// Root directory for stored objects, temp files and temp dirs.
    pub data_dir: String,
    /// Path to the flat `address:port`-per-line cluster membership file.
    pub servers_file: String,
    pub pools: PoolConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    /// How long a put/get job may sit in the job map with no activity
    /// before the garbage collector reclaims it.
    #[serde(default = "default_job_timeout_secs")]
    pub job_timeout_secs: u64,
    /// Interval between garbage collector sweeps.
    #[serde(default = "default_gc_interval_secs")]
    pub gc_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            data_dir: default_data_dir(),
            servers_file: default_servers_file(),
            pools: PoolConfig::default(),
            metrics: MetricsConfig::default(),
            job_timeout_secs: default_job_timeout_secs(),
            gc_interval_secs: default_gc_interval_secs(),
        }
    }
}

/// A raw representation of the config file before validation and resolution.
#[derive(Deserialize)]
struct RawConfig {
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default = "default_log_level")]
    log_level: String,
    #[serde(default = "default_data_dir")]
    data_dir: String,
    #[serde(default = "default_servers_file")]
    servers_file: String,
    #[serde(default)]
    pools: RawPoolConfig,
    #[serde(default)]
    metrics: MetricsConfig,
    #[serde(default = "default_job_timeout_secs")]
    job_timeout_secs: u64,
    #[serde(default = "default_gc_interval_secs")]
    gc_interval_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_data_dir() -> String {
    "s4_data".to_string()
}
fn default_servers_file() -> String {
    "~/.s4.conf".to_string()
}
fn default_job_timeout_secs() -> u64 {
    crate::core::limits::MAX_TIMEOUT.as_secs()
}
fn default_gc_interval_secs() -> u64 {
    10
}

/// Sizes of the five named resource pools. `None` means "derive from host
/// resources at startup" rather than hardcoding a fixed pool size.
#[derive(Deserialize)]
struct RawPoolConfig {
    io_send: Option<usize>,
    io_recv: Option<usize>,
    cpu: Option<usize>,
    misc: Option<usize>,
}

impl Default for RawPoolConfig {
    fn default() -> Self {
        Self {
            io_send: None,
            io_recv: None,
            cpu: None,
            misc: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    pub io_send: usize,
    pub io_recv: usize,
    pub cpu: usize,
    pub misc: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        let cpus = num_cpus();
        Self {
            io_send: cpus * 4,
            io_recv: cpus * 4,
            cpu: cpus + 2,
            misc: cpus + 2,
        }
    }
}

fn num_cpus() -> usize {
    let mut sys = System::new();
    sys.refresh_cpu_all();
    sys.cpus().len().max(1)
}

/// Configuration for the Prometheus metrics exporter.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub port: Option<u16>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            port: None,
        }
    }
}

fn default_metrics_enabled() -> bool {
    true
}

impl ServerConfig {
    /// Creates a new `ServerConfig` by reading and parsing a TOML file.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file at '{path}'"))?;
        let raw: RawConfig = toml::from_str(&contents)
            .with_context(|| format!("failed to parse TOML from '{path}'"))?;

        let cpus = num_cpus();
        let pools = PoolConfig {
            io_send: raw.pools.io_send.unwrap_or(cpus * 4),
            io_recv: raw.pools.io_recv.unwrap_or(cpus * 4),
            cpu: raw.pools.cpu.unwrap_or(cpus + 2),
            misc: raw.pools.misc.unwrap_or(cpus + 2),
        };

        let config = ServerConfig {
            host: raw.host,
            port: raw.port,
            log_level: raw.log_level,
            data_dir: raw.data_dir,
            servers_file: raw.servers_file,
            pools,
            metrics: raw.metrics,
            job_timeout_secs: raw.job_timeout_secs,
            gc_interval_secs: raw.gc_interval_secs,
        };

        config.validate()?;
        info!(?config.host, config.port, "loaded server config");
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(anyhow!("port cannot be 0"));
        }
        if self.host.trim().is_empty() {
            return Err(anyhow!("host cannot be empty"));
        }
        if self.data_dir.trim().is_empty() {
            return Err(anyhow!("data_dir cannot be empty"));
        }
        if self.pools.io_send == 0 || self.pools.io_recv == 0 || self.pools.cpu == 0 {
            return Err(anyhow!("pool sizes cannot be 0"));
        }
        if self.job_timeout_secs == 0 {
            return Err(anyhow!("job_timeout_secs cannot be 0"));
        }
        if self.metrics.enabled
            && let Some(metrics_port) = self.metrics.port
            && metrics_port == self.port
        {
            return Err(anyhow!(
                "metrics.port cannot be the same as the main server port"
            ));
        }
        Ok(())
    }

    /// The port the metrics server should bind to, defaulting to `port + 1`.
    pub fn metrics_port(&self) -> u16 {
        self.metrics.port.unwrap_or(self.port.saturating_add(1))
    }
}

/// Resolves the cluster membership file path, matching the CLI's search
/// order: explicit argument, then `S4_CONF_PATH`, then `~/.s4.conf`.
pub fn resolve_servers_file(explicit: Option<&str>) -> Result<String> {
    if let Some(path) = explicit {
        return Ok(path.to_string());
    }
    if let Ok(path) = std::env::var("S4_CONF_PATH") {
        return Ok(path);
    }
    let home = std::env::var("HOME").context("HOME is not set and no config path was given")?;
    Ok(format!("{home}/.s4.conf"))
}

/// Parses the flat `address:port`-per-line cluster membership file.
pub fn load_servers(path: &str) -> Result<Vec<String>> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read servers file at '{path}'"))?;
    let servers: Vec<String> = contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect();
    if servers.is_empty() {
        return Err(anyhow!("servers file '{path}' has no entries"));
    }
    for server in &servers {
        if server.parse::<std::net::SocketAddr>().is_err() {
            warn!(%server, "servers file entry doesn't parse as host:port, passing through");
        }
    }
    Ok(servers)
}
