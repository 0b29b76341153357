// src/server/handlers/map.rs

//! `map`, `map_to_n`, `map_from_n`: spawn user commands
//! co-located with shard-local data, stage outputs in an isolated tempdir,
//! and route results by key (possibly cross-shard).

use crate::client::{ClientError, ClusterClient};
use crate::core::S4Error;
use crate::core::checksum;
use crate::core::fs_layout::{self, ListEntry};
use crate::core::key::{self, Key};
use crate::core::limits::{MAX_TIMEOUT, TIMEOUT};
use crate::core::metrics;
use crate::core::shell::{self, ShellError, ShellStdin};
use crate::core::state::ServerState;
use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use futures::stream::{FuturesUnordered, StreamExt};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinHandle;
use wildmatch::WildMatch;

#[derive(Deserialize)]
pub struct MapRequest {
    cmd: String,
    indir: String,
    outdir: String,
}

/// Splits `indir` at its first starred path segment into
/// `(base_dir, glob_pattern)`. `glob_pattern` is empty when `indir` has no
/// `*`.
fn parse_glob(indir: &str) -> (String, String) {
    match indir.find('*') {
        Some(star) => {
            let seg_start = indir[..star].rfind('/').map(|i| i + 1).unwrap_or(0);
            (indir[..seg_start].to_string(), indir[seg_start..].to_string())
        }
        None => (indir.to_string(), String::new()),
    }
}

fn validate_dirs(indir: &str, outdir: &str) -> Result<(), S4Error> {
    if !indir.ends_with('/') {
        return Err(S4Error::BadRequest("indir must end with '/'".to_string()));
    }
    if !outdir.ends_with('/') || !outdir.starts_with(key::SCHEME) {
        return Err(S4Error::BadRequest(
            "outdir must be an s4:// key ending with '/'".to_string(),
        ));
    }
    Ok(())
}

/// A command starting with `while read` needs its stdin piped explicitly.
fn adjust_cmd(cmd: &str) -> String {
    if cmd.trim_start().starts_with("while read") {
        format!("cat | {cmd}")
    } else {
        cmd.to_string()
    }
}

fn join_outdir(outdir: &str, rel: &str) -> String {
    format!("{outdir}{}", rel.trim_start_matches('/'))
}

/// Lists every shard-local data file under `indir`, matching the glob if
/// present, returning `(full_key, relative_to_indir)` pairs.
async fn local_inputs(
    state: &ServerState,
    indir: &str,
) -> Result<Vec<(String, String)>, S4Error> {
    let (base_dir, glob_pattern) = parse_glob(indir);
    let base_key = Key::parse(&base_dir)?;
    let bucket_root = state.data_root.join(&base_key.bucket);
    let start = bucket_root.join(&base_key.path);

    let entries = fs_layout::list_recursive(&start, &bucket_root).await?;
    let matcher = if glob_pattern.is_empty() {
        None
    } else {
        Some(WildMatch::new(&glob_pattern))
    };

    let mut out = Vec::new();
    for entry in entries {
        let ListEntry::File { name, .. } = entry else {
            continue;
        };
        let full_key = format!("s4://{}/{name}", base_key.bucket);
        if !state.owns(&full_key)? {
            continue;
        }
        let rel = name
            .strip_prefix(&base_key.path)
            .unwrap_or(&name)
            .trim_start_matches('/')
            .to_string();
        if let Some(m) = &matcher {
            if !m.matches(&rel) {
                continue;
            }
        }
        out.push((full_key, rel));
    }
    Ok(out)
}

/// Drives a set of already-spawned per-item tasks to completion, returning
/// the first error observed or 429 once the whole operator exceeds its
/// outer ceiling. A conflict aborts the run (no partial success) but is
/// never the status the caller sees: `map`/`map_to_n`/`map_from_n` only ever
/// answer 200/400/429/500, so a 409 hit while staging one item's output is
/// downgraded to 500 here before it escapes the operator.
async fn drive(mut futs: FuturesUnordered<JoinHandle<Result<(), S4Error>>>) -> Result<(), S4Error> {
    let deadline = tokio::time::sleep(MAX_TIMEOUT);
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            next = futs.next() => {
                match next {
                    Some(Ok(Ok(()))) => continue,
                    Some(Ok(Err(S4Error::Conflict(msg)))) => return Err(S4Error::Internal(msg)),
                    Some(Ok(Err(e))) => return Err(e),
                    Some(Err(join_err)) => return Err(S4Error::Internal(join_err.to_string())),
                    None => return Ok(()),
                }
            }
            _ = &mut deadline => {
                return Err(S4Error::Throttled("map operator exceeded its max timeout".to_string()));
            }
        }
    }
}

/// `localPut`: validates the key is local and unsealed, checksums
/// the staged file, and seals it into place.
async fn local_put(state: &ServerState, temp_path: &Path, key_str: &str) -> Result<(), S4Error> {
    let parsed = Key::parse(key_str)?;
    if parsed.is_directory() {
        return Err(S4Error::BadRequest(format!(
            "key '{key_str}' is directory-shaped"
        )));
    }
    if !state.owns(key_str)? {
        return Err(S4Error::Internal(format!(
            "key '{key_str}' is not local to this shard"
        )));
    }

    let checksum = {
        let _permit = state.pools.misc.acquire().await;
        let bytes = tokio::fs::read(temp_path).await?;
        checksum::of_bytes(&bytes)
    };

    let final_path = fs_layout::data_path(&state.data_root, &parsed.bucket, &parsed.path);
    let _solo = state.pools.acquire_solo().await;
    fs_layout::seal(temp_path, &final_path, &checksum).await
}

async fn run_command(
    state: &ServerState,
    cmd: &str,
    cwd: &Path,
    env: &[(&str, &str)],
    stdin: ShellStdin,
) -> Result<shell::ShellOutput, S4Error> {
    match shell::run(cmd, cwd, env, stdin, TIMEOUT).await {
        Ok(out) => {
            metrics::MAP_INVOCATIONS_TOTAL
                .with_label_values(&["success"])
                .inc();
            Ok(out)
        }
        Err(ShellError::NonZeroExit(out)) => {
            metrics::MAP_INVOCATIONS_TOTAL
                .with_label_values(&["user_failure"])
                .inc();
            Err(S4Error::BadRequest(format!(
                "{}\n{}",
                String::from_utf8_lossy(&out.stdout),
                String::from_utf8_lossy(&out.stderr)
            )))
        }
        Err(ShellError::Timeout) => {
            metrics::MAP_INVOCATIONS_TOTAL
                .with_label_values(&["timeout"])
                .inc();
            Err(S4Error::Throttled("command exceeded its timeout".to_string()))
        }
        Err(ShellError::Io(e)) => {
            metrics::MAP_INVOCATIONS_TOTAL
                .with_label_values(&["infra_failure"])
                .inc();
            Err(e.into())
        }
    }
}

pub async fn map(
    State(state): State<Arc<ServerState>>,
    Json(req): Json<MapRequest>,
) -> Result<StatusCode, S4Error> {
    validate_dirs(&req.indir, &req.outdir)?;
    let cmd = adjust_cmd(&req.cmd);
    let inputs = local_inputs(&state, &req.indir).await?;

    let mut futs = FuturesUnordered::new();
    for (input_key, rel) in inputs {
        let state = state.clone();
        let cmd = cmd.clone();
        let outdir = req.outdir.clone();
        futs.push(tokio::spawn(async move {
            run_map_one(state, cmd, input_key, rel, outdir).await
        }));
    }
    drive(futs).await?;
    Ok(StatusCode::OK)
}

async fn run_map_one(
    state: Arc<ServerState>,
    cmd: String,
    input_key: String,
    rel: String,
    outdir: String,
) -> Result<(), S4Error> {
    let _cpu = state.pools.cpu.acquire().await;
    let (_id, tempdir) = fs_layout::alloc_temp_dir(&state.data_root).await?;
    let result = async {
        let parsed = Key::parse(&input_key)?;
        let input_path = fs_layout::data_path(&state.data_root, &parsed.bucket, &parsed.path);
        let basename = parsed.basename().to_string();
        let script = format!("{cmd} > output");
        run_command(
            &state,
            &script,
            &tempdir,
            &[("filename", basename.as_str())],
            ShellStdin::File(input_path),
        )
        .await?;
        let output_file = tempdir.join("output");
        let outkey = join_outdir(&outdir, &rel);
        local_put(&state, &output_file, &outkey).await
    }
    .await;
    let _ = tokio::fs::remove_dir_all(&tempdir).await;
    result
}

pub async fn map_to_n(
    State(state): State<Arc<ServerState>>,
    Json(req): Json<MapRequest>,
) -> Result<StatusCode, S4Error> {
    validate_dirs(&req.indir, &req.outdir)?;
    let cmd = adjust_cmd(&req.cmd);
    let inputs = local_inputs(&state, &req.indir).await?;
    let client = ClusterClient::new(state.servers.clone());

    let mut futs = FuturesUnordered::new();
    for (input_key, _rel) in inputs {
        let state = state.clone();
        let cmd = cmd.clone();
        let outdir = req.outdir.clone();
        let client = client.clone();
        futs.push(tokio::spawn(async move {
            run_map_to_n_one(state, client, cmd, input_key, outdir).await
        }));
    }
    drive(futs).await?;
    Ok(StatusCode::OK)
}

async fn run_map_to_n_one(
    state: Arc<ServerState>,
    client: ClusterClient,
    cmd: String,
    input_key: String,
    outdir: String,
) -> Result<(), S4Error> {
    let _cpu = state.pools.cpu.acquire().await;
    let (_id, tempdir) = fs_layout::alloc_temp_dir(&state.data_root).await?;
    let result = async {
        let parsed = Key::parse(&input_key)?;
        let input_path = fs_layout::data_path(&state.data_root, &parsed.bucket, &parsed.path);
        let input_basename = parsed.basename().to_string();
        let out = run_command(
            &state,
            &cmd,
            &tempdir,
            &[("filename", input_basename.as_str())],
            ShellStdin::File(input_path),
        )
        .await?;

        let stdout = String::from_utf8_lossy(&out.stdout);
        for line in stdout.lines().filter(|l| !l.is_empty()) {
            let tempfile = tempdir.join(line);
            let outkey = format!("{outdir}{input_basename}/{line}");
            if state.owns(&outkey)? {
                local_put(&state, &tempfile, &outkey).await?;
            } else {
                let bytes = tokio::fs::read(&tempfile).await?;
                let server = client.server_for(&outkey)?.to_string();
                client
                    .put_bytes(&server, &outkey, bytes)
                    .await
                    .map_err(map_client_error)?;
            }
        }
        Ok(())
    }
    .await;
    let _ = tokio::fs::remove_dir_all(&tempdir).await;
    result
}

fn map_client_error(e: ClientError) -> S4Error {
    match e {
        // A 409 is terminal and aborts the operator.
        ClientError::Conflict(msg) => S4Error::Conflict(msg),
        ClientError::Transport(msg) => S4Error::Internal(msg),
    }
}

pub async fn map_from_n(
    State(state): State<Arc<ServerState>>,
    Json(req): Json<MapRequest>,
) -> Result<StatusCode, S4Error> {
    validate_dirs(&req.indir, &req.outdir)?;
    let cmd = adjust_cmd(&req.cmd);
    let inputs = local_inputs(&state, &req.indir).await?;

    let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (input_key, _rel) in inputs {
        let parsed = Key::parse(&input_key)?;
        let prefix = key::prefix(parsed.basename()).to_string();
        groups.entry(prefix).or_default().push(input_key);
    }

    let mut futs = FuturesUnordered::new();
    for (prefix, keys) in groups {
        let state = state.clone();
        let cmd = cmd.clone();
        let outdir = req.outdir.clone();
        futs.push(tokio::spawn(async move {
            run_map_from_n_one(state, cmd, prefix, keys, outdir).await
        }));
    }
    drive(futs).await?;
    Ok(StatusCode::OK)
}

async fn run_map_from_n_one(
    state: Arc<ServerState>,
    cmd: String,
    prefix: String,
    input_keys: Vec<String>,
    outdir: String,
) -> Result<(), S4Error> {
    let _cpu = state.pools.cpu.acquire().await;
    let (_id, tempdir) = fs_layout::alloc_temp_dir(&state.data_root).await?;
    let result = async {
        let mut basenames = Vec::with_capacity(input_keys.len());
        let mut absolute_paths = Vec::with_capacity(input_keys.len());
        for input_key in &input_keys {
            let parsed = Key::parse(input_key)?;
            let path = fs_layout::data_path(&state.data_root, &parsed.bucket, &parsed.path);
            absolute_paths.push(path.to_string_lossy().into_owned());
            basenames.push(parsed.basename().to_string());
        }
        let stdin_text = absolute_paths.join("\n") + "\n";
        let script = format!("{cmd} > output");
        run_command(
            &state,
            &script,
            &tempdir,
            &[],
            ShellStdin::Bytes(stdin_text.into_bytes()),
        )
        .await?;

        let suffix = key::common_suffix(basenames.iter().map(|s| s.as_str()));
        let outkey = join_outdir(&outdir, &format!("{prefix}{suffix}"));
        local_put(&state, &tempdir.join("output"), &outkey).await
    }
    .await;
    let _ = tokio::fs::remove_dir_all(&tempdir).await;
    result
}
