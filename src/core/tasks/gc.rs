// src/core/tasks/gc.rs

//! The garbage collector: expires stranded jobs and sweeps
//! orphaned temp files/dirs on a fixed interval.

use crate::core::fs_layout::{TEMPDIRS_DIR, TEMPFILES_DIR};
use crate::core::jobs::Job;
use crate::core::metrics;
use crate::core::state::ServerState;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::fs;
use tokio::sync::broadcast;
use tracing::{info, warn};

pub struct GcTask {
    state: Arc<ServerState>,
}

impl GcTask {
    pub fn new(state: Arc<ServerState>) -> Self {
        Self { state }
    }

    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!("garbage collector started");
        let mut interval = tokio::time::interval(Duration::from_secs(self.state.config.gc_interval_secs));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.sweep().await {
                        warn!(error = %e, "gc cycle failed");
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("garbage collector shutting down");
                    return;
                }
            }
        }
    }

    async fn sweep(&self) -> anyhow::Result<()> {
        let max_age = Duration::from_secs(self.state.config.job_timeout_secs);
        self.sweep_jobs(max_age).await;
        self.sweep_dir(&self.state.data_root.join(TEMPFILES_DIR), max_age, "tempfile")
            .await?;
        self.sweep_dir(&self.state.data_root.join(TEMPDIRS_DIR), max_age, "tempdir")
            .await?;
        Ok(())
    }

    async fn sweep_jobs(&self, max_age: Duration) {
        let expired: Vec<_> = self
            .state
            .jobs
            .iter()
            .filter(|entry| entry.started_at().elapsed() > max_age)
            .map(|entry| *entry.key())
            .collect();

        for id in expired {
            if let Some((_, job)) = self.state.jobs.remove(&id) {
                metrics::GC_REMOVED_TOTAL.with_label_values(&["job"]).inc();
                if let Job::Put(put_job) = job {
                    let _permit = self.state.pools.misc.acquire().await;
                    let _ = crate::core::fs_layout::remove_sealed(&put_job.final_path).await;
                    let _ = fs::remove_file(&put_job.temp_path).await;
                }
            }
        }
    }

    async fn sweep_dir(&self, dir: &std::path::Path, max_age: Duration, kind: &str) -> anyhow::Result<()> {
        let mut entries = match fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let metadata = entry.metadata().await?;
            let age = metadata
                .modified()
                .ok()
                .and_then(|m| SystemTime::now().duration_since(m).ok())
                .unwrap_or_default();
            if age <= max_age {
                continue;
            }
            let path = entry.path();
            let removed = if metadata.is_dir() {
                fs::remove_dir_all(&path).await
            } else {
                fs::remove_file(&path).await
            };
            match removed {
                Ok(()) => metrics::GC_REMOVED_TOTAL.with_label_values(&[kind]).inc(),
                Err(e) => warn!(path = %path.display(), error = %e, "gc failed to remove stale entry"),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::jobs::{GetJob, Job};
    use std::time::Instant;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn sweep_jobs_evicts_entries_older_than_job_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = crate::config::ServerConfig::default();
        config.data_dir = dir.path().to_string_lossy().into_owned();
        config.job_timeout_secs = 0;
        config.metrics.enabled = false;

        let state = ServerState::initialize(config, vec!["127.0.0.1:1".to_string()], "127.0.0.1:1".to_string())
            .await
            .unwrap();

        let (_tx, rx) = oneshot::channel();
        let id = uuid::Uuid::new_v4();
        state.jobs.insert(
            id,
            Job::Get(GetJob {
                started_at: Instant::now() - Duration::from_secs(1),
                outcome: rx,
                disk_checksum: "deadbeef".to_string(),
                size: 0,
            }),
        );
        assert_eq!(state.jobs.len(), 1);

        let gc = GcTask::new(state.clone());
        gc.sweep().await.unwrap();

        assert_eq!(state.jobs.len(), 0);
        assert!(!state.jobs.contains_key(&id));
    }
}
