// src/core/pools.rs

//! The five named resource pools gating concurrent work.

use crate::config::PoolConfig;
use std::sync::Arc;
use tokio::sync::{Semaphore, SemaphorePermit};

#[derive(Debug)]
pub struct ResourcePools {
    pub io_send: Semaphore,
    pub io_recv: Semaphore,
    pub cpu: Semaphore,
    pub misc: Semaphore,
    /// Serializes every sequence that inspects `Exists`, allocates a temp
    /// path, or performs the atomic sealing rename.
    pub solo: Semaphore,
}

impl ResourcePools {
    pub fn new(config: &PoolConfig) -> Arc<Self> {
        Arc::new(Self {
            io_send: Semaphore::new(config.io_send),
            io_recv: Semaphore::new(config.io_recv),
            cpu: Semaphore::new(config.cpu),
            misc: Semaphore::new(config.misc),
            solo: Semaphore::new(1),
        })
    }

    pub async fn acquire_solo(&self) -> SemaphorePermit<'_> {
        self.solo
            .acquire()
            .await
            .expect("solo semaphore is never closed")
    }
}
