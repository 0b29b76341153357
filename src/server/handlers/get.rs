// src/server/handlers/get.rs

//! `prepare_get` / `confirm_get`: the three-phase get protocol.

use crate::core::S4Error;
use crate::core::fs_layout;
use crate::core::jobs::{GetJob, Job};
use crate::core::key::Key;
use crate::core::limits::TIMEOUT;
use crate::core::metrics;
use crate::core::shard::normalize_loopback;
use crate::core::state::ServerState;
use crate::core::transport;
use axum::extract::{ConnectInfo, Query, State};
use axum::http::StatusCode;
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::fs::File;
use tokio::sync::oneshot;
use uuid::Uuid;

#[derive(Deserialize)]
pub struct PrepareGetQuery {
    key: String,
    port: u16,
}

#[derive(Deserialize)]
pub struct ConfirmQuery {
    uuid: Uuid,
    checksum: String,
}

pub async fn prepare_get(
    State(state): State<Arc<ServerState>>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    Query(q): Query<PrepareGetQuery>,
) -> Result<(StatusCode, String), S4Error> {
    let parsed = Key::parse(&q.key)?;
    if !state.owns(&q.key)? {
        return Err(S4Error::Internal(format!(
            "key '{}' does not belong to this shard",
            q.key
        )));
    }

    let final_path = fs_layout::data_path(&state.data_root, &parsed.bucket, &parsed.path);
    let (disk_checksum, size) = {
        let _solo = state.pools.acquire_solo().await;
        if !fs_layout::exists(&final_path).await {
            return Err(S4Error::NotFound(format!("key '{}' does not exist", q.key)));
        }
        let checksum = tokio::fs::read_to_string(fs_layout::checksum_path(&final_path)).await?;
        let size = tokio::fs::metadata(&final_path).await.map(|m| m.len()).unwrap_or(0);
        (checksum, size)
    };

    let dial_host = normalize_loopback(&remote.ip().to_string()).to_string();
    let dial_addr: SocketAddr = format!("{dial_host}:{}", q.port)
        .parse()
        .map_err(|e| S4Error::BadRequest(format!("bad dial address: {e}")))?;

    let (started_tx, started_rx) = oneshot::channel();
    let (outcome_tx, outcome_rx) = oneshot::channel();
    let pools = state.pools.clone();
    let send_path = final_path.clone();
    tokio::spawn(async move {
        let _permit = match pools.io_send.acquire().await {
            Ok(permit) => permit,
            Err(_) => return,
        };
        let result = async {
            let file = File::open(&send_path).await?;
            let _ = started_tx.send(());
            transport::send_stream(dial_addr, file).await
        }
        .await;
        let _ = outcome_tx.send(result);
    });

    let uuid = Uuid::new_v4();
    state.jobs.insert(
        uuid,
        Job::Get(GetJob {
            started_at: Instant::now(),
            outcome: outcome_rx,
            disk_checksum,
            size,
        }),
    );

    match tokio::time::timeout(TIMEOUT, started_rx).await {
        Ok(Ok(())) => Ok((StatusCode::OK, uuid.to_string())),
        _ => {
            state.jobs.remove(&uuid);
            Err(S4Error::Throttled(
                "timed out starting the outbound transfer".to_string(),
            ))
        }
    }
}

pub async fn confirm_get(
    State(state): State<Arc<ServerState>>,
    Query(q): Query<ConfirmQuery>,
) -> Result<StatusCode, S4Error> {
    let (_, job) = state
        .jobs
        .remove(&q.uuid)
        .ok_or_else(|| S4Error::Internal(format!("no get job for uuid {}", q.uuid)))?;
    let Job::Get(get_job) = job else {
        return Err(S4Error::Internal(format!(
            "job {} is not a get job",
            q.uuid
        )));
    };

    let server_checksum = get_job
        .outcome
        .await
        .map_err(|_| S4Error::Internal("sender task was dropped before reporting".to_string()))??;
    if q.checksum != server_checksum || server_checksum != get_job.disk_checksum {
        return Err(S4Error::Internal(format!(
            "checksum mismatch: client={} server={server_checksum} disk={}",
            q.checksum, get_job.disk_checksum
        )));
    }

    metrics::GETS_TOTAL.inc();
    metrics::BYTES_TRANSFERRED_TOTAL
        .with_label_values(&["send"])
        .inc_by(get_job.size as f64);
    state.stats.increment_gets();
    state.stats.add_bytes_sent(get_job.size);
    Ok(StatusCode::OK)
}
