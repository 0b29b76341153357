// src/client/mod.rs

//! The client library: orchestrates `cp`/`ls`/`rm`/`eval`/`map`* over the
//! cluster's HTTP control channel and the raw TCP side-channel. Retries are
//! bounded and a conflict is always terminal.

use crate::core::S4Error;
use crate::core::fs_layout::ListEntry;
use crate::core::shard;
use crate::core::transport;
use std::io::Cursor;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

const RETRY_ATTEMPTS: u32 = 10;
const RETRY_BACKOFF: Duration = Duration::from_millis(250);

/// Errors the client library surfaces to its callers. `Conflict` is the
/// terminal "already exists" sentinel that aborts cross-shard `map_to_n`
/// puts without retrying.
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("transport error: {0}")]
    Transport(String),
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        ClientError::Transport(e.to_string())
    }
}

impl From<S4Error> for ClientError {
    fn from(e: S4Error) -> Self {
        match e {
            S4Error::Conflict(msg) => ClientError::Conflict(msg),
            other => ClientError::Transport(other.to_string()),
        }
    }
}

impl From<ClientError> for S4Error {
    fn from(e: ClientError) -> Self {
        match e {
            ClientError::Conflict(msg) => S4Error::Conflict(msg),
            ClientError::Transport(msg) => S4Error::Internal(msg),
        }
    }
}

/// A handle to the cluster used by both the CLI and server-to-server calls
/// (map_to_n's cross-shard egress).
#[derive(Clone)]
pub struct ClusterClient {
    http: reqwest::Client,
    servers: Vec<String>,
}

impl ClusterClient {
    pub fn new(servers: Vec<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            servers,
        }
    }

    pub fn servers(&self) -> &[String] {
        &self.servers
    }

    pub fn server_for(&self, key: &str) -> Result<&str, S4Error> {
        shard::pick_server(key, &self.servers)
    }

    /// Puts `bytes` at `key` on `server`, retrying transient transport
    /// failures with bounded backoff; a 409 is never retried.
    pub async fn put_bytes(&self, server: &str, key: &str, bytes: Vec<u8>) -> Result<(), ClientError> {
        let mut last_err = None;
        for attempt in 0..RETRY_ATTEMPTS {
            match self.put_bytes_once(server, key, &bytes).await {
                Ok(()) => return Ok(()),
                Err(ClientError::Conflict(msg)) => return Err(ClientError::Conflict(msg)),
                Err(e) => {
                    last_err = Some(e);
                    if attempt + 1 < RETRY_ATTEMPTS {
                        tokio::time::sleep(RETRY_BACKOFF * (attempt + 1)).await;
                    }
                }
            }
        }
        Err(last_err.unwrap_or_else(|| ClientError::Transport("put failed".to_string())))
    }

    async fn put_bytes_once(&self, server: &str, key: &str, bytes: &[u8]) -> Result<(), ClientError> {
        let url = format!(
            "http://{server}/prepare_put?key={}",
            urlencoding(key)
        );
        let resp = self.http.get(&url).send().await?;
        if resp.status() == reqwest::StatusCode::CONFLICT {
            return Err(ClientError::Conflict(format!("key '{key}' already exists")));
        }
        if !resp.status().is_success() {
            return Err(ClientError::Transport(format!(
                "prepare_put {key} on {server} returned {}",
                resp.status()
            )));
        }
        let body = resp.text().await?;
        let (uuid, port) = body
            .split_once(' ')
            .ok_or_else(|| ClientError::Transport("malformed prepare_put response".to_string()))?;

        let host = server.split(':').next().unwrap_or(server);
        let dial_addr: SocketAddr = format!("{host}:{port}")
            .parse()
            .map_err(|_| ClientError::Transport("bad prepare_put port".to_string()))?;
        let checksum = transport::send_stream(dial_addr, Cursor::new(bytes.to_vec()))
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        let confirm_url = format!("http://{server}/confirm_put?uuid={uuid}&checksum={checksum}");
        let confirm = self.http.get(&confirm_url).send().await?;
        if confirm.status() == reqwest::StatusCode::CONFLICT {
            return Err(ClientError::Conflict(format!("key '{key}' already exists")));
        }
        if !confirm.status().is_success() {
            return Err(ClientError::Transport(format!(
                "confirm_put {key} on {server} returned {}",
                confirm.status()
            )));
        }
        Ok(())
    }

    /// Gets `key`'s bytes from `server`, binding a local listener for the
    /// side-channel connection per the get protocol.
    pub async fn get_bytes(&self, server: &str, key: &str) -> Result<Vec<u8>, ClientError> {
        let (listener, port) = transport::bind_ephemeral("0.0.0.0")
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        let url = format!(
            "http://{server}/prepare_get?key={}&port={port}",
            urlencoding(key)
        );
        let resp = self.http.get(&url).send().await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ClientError::Transport(format!("key '{key}' not found")));
        }
        if !resp.status().is_success() {
            return Err(ClientError::Transport(format!(
                "prepare_get {key} on {server} returned {}",
                resp.status()
            )));
        }
        let uuid = resp.text().await?;

        let scratch = std::env::temp_dir().join(format!("s4-get-{}", uuid::Uuid::new_v4()));
        let file = tokio::fs::File::create(&scratch)
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        let checksum = transport::recv_stream(listener, file)
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        let confirm_url = format!("http://{server}/confirm_get?uuid={}&checksum={checksum}", uuid.trim());
        let confirm = self.http.get(&confirm_url).send().await?;
        let buf = tokio::fs::read(&scratch).await.unwrap_or_default();
        let _ = tokio::fs::remove_file(&scratch).await;
        if !confirm.status().is_success() {
            return Err(ClientError::Transport(format!(
                "confirm_get {key} on {server} returned {}",
                confirm.status()
            )));
        }
        Ok(buf)
    }

    pub async fn delete(&self, server: &str, prefix: &str, recursive: bool) -> Result<(), ClientError> {
        let url = format!(
            "http://{server}/delete?prefix={}&recursive={recursive}",
            urlencoding(prefix)
        );
        let resp = self.http.get(&url).send().await?;
        if !resp.status().is_success() {
            return Err(ClientError::Transport(format!(
                "delete {prefix} on {server} returned {}",
                resp.status()
            )));
        }
        Ok(())
    }

    pub async fn list(&self, server: &str, prefix: &str, recursive: bool) -> Result<Vec<ListEntry>, ClientError> {
        let url = format!(
            "http://{server}/list?prefix={}&recursive={recursive}",
            urlencoding(prefix)
        );
        let resp = self.http.get(&url).send().await?;
        if !resp.status().is_success() {
            return Err(ClientError::Transport(format!(
                "list {prefix} on {server} returned {}",
                resp.status()
            )));
        }
        Ok(resp.json().await?)
    }

    pub async fn list_buckets(&self, server: &str) -> Result<Vec<ListEntry>, ClientError> {
        let url = format!("http://{server}/list_buckets");
        let resp = self.http.get(&url).send().await?;
        if !resp.status().is_success() {
            return Err(ClientError::Transport(format!(
                "list_buckets on {server} returned {}",
                resp.status()
            )));
        }
        Ok(resp.json().await?)
    }

    pub async fn eval(&self, server: &str, key: &str, cmd: &str) -> Result<String, ClientError> {
        let url = format!("http://{server}/eval?key={}", urlencoding(key));
        let resp = self.http.get(&url).body(cmd.to_string()).send().await?;
        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(ClientError::Transport(body));
        }
        Ok(body)
    }

    pub async fn health(&self, server: &str) -> Result<(), ClientError> {
        let url = format!("http://{server}/health");
        let resp = self.http.get(&url).send().await?;
        if !resp.status().is_success() {
            return Err(ClientError::Transport(format!("health check on {server} failed")));
        }
        Ok(())
    }

    /// Broadcasts a map-family request to every node in the cluster; each
    /// node only processes its own shard-local inputs.
    pub async fn map_broadcast(&self, path: &str, cmd: &str, indir: &str, outdir: &str) -> Result<(), ClientError> {
        let body = serde_json::json!({ "cmd": cmd, "indir": indir, "outdir": outdir });
        for server in &self.servers {
            let url = format!("http://{server}/{path}");
            let resp = self.http.post(&url).json(&body).send().await?;
            if !resp.status().is_success() {
                let text = resp.text().await.unwrap_or_default();
                return Err(ClientError::Transport(format!("{path} on {server} failed: {text}")));
            }
        }
        Ok(())
    }
}

fn urlencoding(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}
