// src/server/handlers/put.rs

//! `prepare_put` / `confirm_put`: the three-phase put protocol.

use crate::core::S4Error;
use crate::core::fs_layout;
use crate::core::jobs::{Job, PutJob};
use crate::core::key::Key;
use crate::core::limits::TIMEOUT;
use crate::core::metrics;
use crate::core::state::ServerState;
use crate::core::transport;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::fs::File;
use tokio::sync::oneshot;
use uuid::Uuid;

#[derive(Deserialize)]
pub struct PreparePutQuery {
    key: String,
}

#[derive(Deserialize)]
pub struct ConfirmQuery {
    uuid: Uuid,
    checksum: String,
}

pub async fn prepare_put(
    State(state): State<Arc<ServerState>>,
    Query(q): Query<PreparePutQuery>,
) -> Result<(StatusCode, String), S4Error> {
    let parsed = Key::parse(&q.key)?;
    if !state.owns(&q.key)? {
        return Err(S4Error::BadRequest(format!(
            "key '{}' does not belong to this shard",
            q.key
        )));
    }

    let final_path = fs_layout::data_path(&state.data_root, &parsed.bucket, &parsed.path);
    let temp_path = {
        let _solo = state.pools.acquire_solo().await;
        if fs_layout::exists(&final_path).await {
            metrics::CONFLICTS_TOTAL.inc();
            return Err(S4Error::Conflict(format!("key '{}' already exists", q.key)));
        }
        let (_id, temp_path) = fs_layout::alloc_temp_file(&state.data_root).await?;
        temp_path
    };

    let (port_tx, port_rx) = oneshot::channel();
    let (outcome_tx, outcome_rx) = oneshot::channel();
    let pools = state.pools.clone();
    let recv_temp_path = temp_path.clone();
    tokio::spawn(async move {
        let _permit = match pools.io_recv.acquire().await {
            Ok(permit) => permit,
            Err(_) => return,
        };
        let result = async {
            let (listener, port) = transport::bind_ephemeral("0.0.0.0").await?;
            let _ = port_tx.send(port);
            let file = File::create(&recv_temp_path).await?;
            transport::recv_stream(listener, file).await
        }
        .await;
        let _ = outcome_tx.send(result);
    });

    let uuid = Uuid::new_v4();
    state.jobs.insert(
        uuid,
        Job::Put(PutJob {
            started_at: Instant::now(),
            outcome: outcome_rx,
            final_path,
            temp_path: temp_path.clone(),
        }),
    );

    match tokio::time::timeout(TIMEOUT, port_rx).await {
        Ok(Ok(port)) => Ok((StatusCode::OK, format!("{uuid} {port}"))),
        _ => {
            state.jobs.remove(&uuid);
            let _ = tokio::fs::remove_file(&temp_path).await;
            Err(S4Error::Throttled(
                "timed out waiting for the inbound connection".to_string(),
            ))
        }
    }
}

pub async fn confirm_put(
    State(state): State<Arc<ServerState>>,
    Query(q): Query<ConfirmQuery>,
) -> Result<StatusCode, S4Error> {
    let (_, job) = state
        .jobs
        .remove(&q.uuid)
        .ok_or_else(|| S4Error::Internal(format!("no put job for uuid {}", q.uuid)))?;
    let Job::Put(put_job) = job else {
        return Err(S4Error::Internal(format!(
            "job {} is not a put job",
            q.uuid
        )));
    };

    let server_checksum = put_job
        .outcome
        .await
        .map_err(|_| S4Error::Internal("receiver task was dropped before reporting".to_string()))??;
    if q.checksum != server_checksum {
        return Err(S4Error::Internal(format!(
            "checksum mismatch: client={} server={server_checksum}",
            q.checksum
        )));
    }

    {
        let _solo = state.pools.acquire_solo().await;
        fs_layout::seal(&put_job.temp_path, &put_job.final_path, &server_checksum).await?;
    }

    let size = tokio::fs::metadata(&put_job.final_path)
        .await
        .map(|m| m.len())
        .unwrap_or(0);
    metrics::PUTS_TOTAL.inc();
    metrics::BYTES_TRANSFERRED_TOTAL
        .with_label_values(&["recv"])
        .inc_by(size as f64);
    state.stats.increment_puts();
    state.stats.add_bytes_received(size);
    Ok(StatusCode::OK)
}
