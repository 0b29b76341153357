// src/core/fs_layout.rs

//! The on-disk object layout rooted at `s4_data/`: data and
//! checksum sidecar files, atomic sealing, and temp staging directories.

use crate::core::errors::S4Error;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::Deserialize;
use serde::ser::SerializeSeq;
use std::path::{Path, PathBuf};
use tokio::fs;
use uuid::Uuid;

pub const TEMPFILES_DIR: &str = "_tempfiles";
pub const TEMPDIRS_DIR: &str = "_tempdirs";
const CHECKSUM_EXT: &str = "xxh";

/// The absolute path of a key's data file under `data_root`.
pub fn data_path(data_root: &Path, bucket: &str, rel_path: &str) -> PathBuf {
    data_root.join(bucket).join(rel_path)
}

/// The checksum sidecar path for a data file.
pub fn checksum_path(data_path: &Path) -> PathBuf {
    let mut name = data_path.as_os_str().to_os_string();
    name.push(".");
    name.push(CHECKSUM_EXT);
    PathBuf::from(name)
}

pub fn is_checksum_file(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(CHECKSUM_EXT)
}

/// True iff both the data file and its checksum sidecar exist.
pub async fn exists(final_path: &Path) -> bool {
    fs::metadata(final_path).await.is_ok() && fs::metadata(checksum_path(final_path)).await.is_ok()
}

/// Allocates a fresh staging path under `_tempfiles/` and ensures the
/// directory exists.
pub async fn alloc_temp_file(data_root: &Path) -> Result<(Uuid, PathBuf), S4Error> {
    let dir = data_root.join(TEMPFILES_DIR);
    fs::create_dir_all(&dir).await?;
    let id = Uuid::new_v4();
    Ok((id, dir.join(id.to_string())))
}

/// Allocates a fresh staging directory under `_tempdirs/<uuid>/`.
pub async fn alloc_temp_dir(data_root: &Path) -> Result<(Uuid, PathBuf), S4Error> {
    let root = data_root.join(TEMPDIRS_DIR);
    let id = Uuid::new_v4();
    let dir = root.join(id.to_string());
    fs::create_dir_all(&dir).await?;
    Ok((id, dir))
}

/// Seals a newly received object: writes the checksum sidecar first, makes
/// both files read-only, then renames the temp file into its final place
/// (spec invariant 1). Returns `Conflict` if the key was sealed by a
/// concurrent writer in the meantime.
pub async fn seal(temp_path: &Path, final_path: &Path, checksum: &str) -> Result<(), S4Error> {
    if exists(final_path).await {
        return Err(S4Error::Conflict(format!(
            "key already exists at {}",
            final_path.display()
        )));
    }
    if let Some(parent) = final_path.parent() {
        fs::create_dir_all(parent).await?;
    }
    if exists(final_path).await {
        return Err(S4Error::Conflict(format!(
            "key already exists at {}",
            final_path.display()
        )));
    }

    let checksum_file = checksum_path(final_path);
    fs::write(&checksum_file, checksum.as_bytes()).await?;
    make_readonly(&checksum_file).await?;
    make_readonly(temp_path).await?;
    fs::rename(temp_path, final_path).await?;
    Ok(())
}

#[cfg(unix)]
async fn make_readonly(path: &Path) -> Result<(), S4Error> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, std::fs::Permissions::from_mode(0o444)).await?;
    Ok(())
}

#[cfg(not(unix))]
async fn make_readonly(path: &Path) -> Result<(), S4Error> {
    let mut perms = fs::metadata(path).await?.permissions();
    perms.set_readonly(true);
    fs::set_permissions(path, perms).await?;
    Ok(())
}

/// Removes a sealed key's data and checksum files; best-effort (ignores
/// `NotFound`).
pub async fn remove_sealed(final_path: &Path) -> Result<(), S4Error> {
    remove_if_present(final_path).await?;
    remove_if_present(&checksum_path(final_path)).await?;
    Ok(())
}

async fn remove_if_present(path: &Path) -> Result<(), S4Error> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// A single row of `list`/`list_buckets` output, serialized as the 4-tuple
/// the route handlers expect.
#[derive(Debug, Clone)]
pub enum ListEntry {
    File {
        date: String,
        time: String,
        size: u64,
        name: String,
    },
    Dir {
        name: String,
    },
}

impl ListEntry {
    pub fn name(&self) -> &str {
        match self {
            ListEntry::File { name, .. } => name,
            ListEntry::Dir { name } => name,
        }
    }
}

/// Merges `list`/`list_buckets` rows collected from every node that answered
/// a broadcast query: drops duplicate names (the same directory or bucket
/// can be reported by more than one shard) and re-sorts using the same
/// convention the server applies to a single node's rows, so the merged view
/// matches what a single-node cluster would have returned.
pub fn merge_listing(mut entries: Vec<ListEntry>, descending: bool) -> Vec<ListEntry> {
    entries.sort_by(|a, b| a.name().cmp(b.name()));
    entries.dedup_by(|a, b| a.name() == b.name());
    if descending {
        entries.reverse();
    }
    entries
}

impl Serialize for ListEntry {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(4))?;
        match self {
            ListEntry::File {
                date,
                time,
                size,
                name,
            } => {
                seq.serialize_element(date)?;
                seq.serialize_element(time)?;
                seq.serialize_element(size)?;
                seq.serialize_element(name)?;
            }
            ListEntry::Dir { name } => {
                seq.serialize_element("")?;
                seq.serialize_element("")?;
                seq.serialize_element("PRE")?;
                seq.serialize_element(name)?;
            }
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for ListEntry {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let values: [serde_json::Value; 4] = Deserialize::deserialize(deserializer)?;
        let name = values[3].as_str().unwrap_or_default().to_string();
        if values[2].as_str() == Some("PRE") {
            Ok(ListEntry::Dir { name })
        } else {
            Ok(ListEntry::File {
                date: values[0].as_str().unwrap_or_default().to_string(),
                time: values[1].as_str().unwrap_or_default().to_string(),
                size: values[2].as_u64().unwrap_or(0),
                name,
            })
        }
    }
}

fn format_mtime(modified: std::time::SystemTime) -> (String, String) {
    let datetime: DateTime<Utc> = modified.into();
    (
        datetime.format("%Y-%m-%d").to_string(),
        datetime.format("%H:%M:%S").to_string(),
    )
}

/// Non-recursive listing: immediate children of `dir` whose name starts with
/// `basename_prefix`, excluding checksum sidecars.
pub async fn list_non_recursive(
    dir: &Path,
    basename_prefix: &str,
) -> Result<Vec<ListEntry>, S4Error> {
    let mut out = Vec::new();
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
        Err(e) => return Err(e.into()),
    };
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.starts_with(basename_prefix) {
            continue;
        }
        let metadata = entry.metadata().await?;
        if metadata.is_dir() {
            out.push(ListEntry::Dir {
                name: format!("{name}/"),
            });
        } else if !is_checksum_file(&entry.path()) {
            let (date, time) = format_mtime(metadata.modified()?);
            out.push(ListEntry::File {
                date,
                time,
                size: metadata.len(),
                name,
            });
        }
    }
    Ok(out)
}

/// Recursive listing: every regular, non-checksum file under `dir`, with
/// paths relative to `strip_root`.
pub async fn list_recursive(dir: &Path, strip_root: &Path) -> Result<Vec<ListEntry>, S4Error> {
    let mut out = Vec::new();
    let mut stack = vec![dir.to_path_buf()];
    while let Some(current) = stack.pop() {
        let mut entries = match fs::read_dir(&current).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let metadata = entry.metadata().await?;
            if metadata.is_dir() {
                if path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.starts_with('_'))
                    .unwrap_or(false)
                {
                    continue;
                }
                stack.push(path);
            } else if !is_checksum_file(&path) {
                let (date, time) = format_mtime(metadata.modified()?);
                let relative = path
                    .strip_prefix(strip_root)
                    .unwrap_or(&path)
                    .to_string_lossy()
                    .into_owned();
                out.push(ListEntry::File {
                    date,
                    time,
                    size: metadata.len(),
                    name: relative,
                });
            }
        }
    }
    Ok(out)
}

/// Enumerates top-level buckets (directories not starting with `_`).
pub async fn list_buckets(data_root: &Path) -> Result<Vec<ListEntry>, S4Error> {
    let mut out = Vec::new();
    let mut entries = match fs::read_dir(data_root).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
        Err(e) => return Err(e.into()),
    };
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('_') {
            continue;
        }
        if entry.metadata().await?.is_dir() {
            out.push(ListEntry::Dir {
                name: format!("{name}/"),
            });
        }
    }
    Ok(out)
}

/// Deletes a single key's files (non-recursive `delete`).
pub async fn delete_one(final_path: &Path) -> Result<(), S4Error> {
    remove_sealed(final_path).await
}

/// Recursively deletes every file (and sidecar) under `dir`, then the
/// directory subtree itself.
pub async fn delete_recursive(dir: &Path) -> Result<(), S4Error> {
    match fs::remove_dir_all(dir).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
