// src/server/handlers/keyspace.rs

//! `delete`, `list`, `list_buckets`, `eval`.

use crate::core::S4Error;
use crate::core::fs_layout::{self, ListEntry};
use crate::core::key::{self, Key};
use crate::core::limits::TIMEOUT;
use crate::core::shell::{self, ShellError, ShellStdin};
use crate::core::state::ServerState;
use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use serde::Deserialize;
use std::sync::Arc;

#[derive(Deserialize)]
pub struct DeleteQuery {
    prefix: String,
    #[serde(default)]
    recursive: bool,
}

#[derive(Deserialize)]
pub struct ListQuery {
    prefix: String,
    #[serde(default)]
    recursive: bool,
}

#[derive(Deserialize)]
pub struct EvalQuery {
    key: String,
}

/// Splits a `prefix`/`list`-style query value (with or without the `s4://`
/// scheme) into `(bucket, rest-of-path)`. Rejects absolute paths.
fn split_bucket_path(raw: &str) -> Result<(String, String), S4Error> {
    let rest = raw.strip_prefix(key::SCHEME).unwrap_or(raw);
    if rest.starts_with('/') {
        return Err(S4Error::BadRequest(format!(
            "prefix '{raw}' is an absolute path"
        )));
    }
    match rest.split_once('/') {
        Some((bucket, path)) => Ok((bucket.to_string(), path.to_string())),
        None => Ok((rest.to_string(), String::new())),
    }
}

pub async fn delete(
    State(state): State<Arc<ServerState>>,
    Query(q): Query<DeleteQuery>,
) -> Result<StatusCode, S4Error> {
    let (bucket, path) = split_bucket_path(&q.prefix)?;
    let target = fs_layout::data_path(&state.data_root, &bucket, &path);

    let _solo = state.pools.acquire_solo().await;
    if q.recursive {
        fs_layout::delete_recursive(&target).await?;
    } else {
        fs_layout::delete_one(&target).await?;
    }
    Ok(StatusCode::OK)
}

pub async fn list(
    State(state): State<Arc<ServerState>>,
    Query(q): Query<ListQuery>,
) -> Result<Json<Vec<ListEntry>>, S4Error> {
    let (bucket, path) = split_bucket_path(&q.prefix)?;
    let bucket_root = state.data_root.join(&bucket);

    let _permit = state.pools.misc.acquire().await;
    let mut entries = if q.recursive {
        let start = bucket_root.join(&path);
        fs_layout::list_recursive(&start, &bucket_root).await?
    } else {
        let basename = path.rsplit('/').next().unwrap_or(&path);
        let dir = match path.rsplit_once('/') {
            Some((parent, _)) => bucket_root.join(parent),
            None => bucket_root.clone(),
        };
        fs_layout::list_non_recursive(&dir, basename).await?
    };

    entries.sort_by(|a, b| a.name().cmp(b.name()));
    Ok(Json(entries))
}

pub async fn list_buckets(
    State(state): State<Arc<ServerState>>,
) -> Result<Json<Vec<ListEntry>>, S4Error> {
    let _permit = state.pools.misc.acquire().await;
    let mut entries = fs_layout::list_buckets(&state.data_root).await?;
    // Bucket listings sort descending by name, unlike object listings.
    entries.sort_by(|a, b| b.name().cmp(a.name()));
    Ok(Json(entries))
}

pub async fn eval(
    State(state): State<Arc<ServerState>>,
    Query(q): Query<EvalQuery>,
    body: String,
) -> Result<(StatusCode, String), S4Error> {
    let parsed = Key::parse(&q.key)?;
    let final_path = fs_layout::data_path(&state.data_root, &parsed.bucket, &parsed.path);

    {
        let _solo = state.pools.acquire_solo().await;
        if !fs_layout::exists(&final_path).await {
            return Err(S4Error::NotFound(format!("key '{}' does not exist", q.key)));
        }
    }

    let _permit = state.pools.cpu.acquire().await;
    let cwd = final_path
        .parent()
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| state.data_root.clone());
    let outcome = shell::run(
        &body,
        &cwd,
        &[],
        ShellStdin::File(final_path),
        TIMEOUT,
    )
    .await;

    match outcome {
        Ok(out) => Ok((StatusCode::OK, String::from_utf8_lossy(&out.stdout).into_owned())),
        // A non-zero exit surfaces as infrastructure failure, same as the map
        // family, rather than a 400.
        Err(ShellError::NonZeroExit(out)) => Err(S4Error::Internal(format!(
            "{}\n{}",
            String::from_utf8_lossy(&out.stdout),
            String::from_utf8_lossy(&out.stderr)
        ))),
        Err(ShellError::Timeout) => Err(S4Error::Throttled("eval exceeded its timeout".to_string())),
        Err(ShellError::Io(e)) => Err(e.into()),
    }
}
