// src/core/jobs.rs

//! The job state machine: transient put/get jobs keyed by UUID, stored in a
//! process-wide concurrent map.

use crate::core::errors::S4Error;
use dashmap::DashMap;
use std::path::PathBuf;
use std::time::Instant;
use tokio::sync::oneshot;
use uuid::Uuid;

/// The outcome a background transfer task reports exactly once: the
/// server-computed checksum on success, or the failure it hit.
pub type Outcome = oneshot::Receiver<Result<String, S4Error>>;

pub struct PutJob {
    pub started_at: Instant,
    pub outcome: Outcome,
    pub final_path: PathBuf,
    pub temp_path: PathBuf,
}

pub struct GetJob {
    pub started_at: Instant,
    pub outcome: Outcome,
    pub disk_checksum: String,
    pub size: u64,
}

/// The job map stores two variant shapes keyed by UUID; the GC branches on
/// the tag to reach lifecycle fields.
pub enum Job {
    Put(PutJob),
    Get(GetJob),
}

impl Job {
    pub fn started_at(&self) -> Instant {
        match self {
            Job::Put(job) => job.started_at,
            Job::Get(job) => job.started_at,
        }
    }
}

pub type JobMap = DashMap<Uuid, Job>;

pub fn new_job_map() -> JobMap {
    DashMap::new()
}
