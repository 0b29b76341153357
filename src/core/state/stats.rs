// src/core/state/stats.rs

//! Contains state definitions and logic for server-wide statistics.

use std::sync::atomic::{AtomicU64, Ordering};

/// Holds all state and logic related to server-wide statistics and
/// monitoring.
#[derive(Debug, Default)]
pub struct StatsState {
    puts_total: AtomicU64,
    gets_total: AtomicU64,
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
}

impl StatsState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_puts(&self) {
        self.puts_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_puts_total(&self) -> u64 {
        self.puts_total.load(Ordering::Relaxed)
    }

    pub fn increment_gets(&self) {
        self.gets_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_gets_total(&self) -> u64 {
        self.gets_total.load(Ordering::Relaxed)
    }

    pub fn add_bytes_sent(&self, n: u64) {
        self.bytes_sent.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_bytes_received(&self, n: u64) {
        self.bytes_received.fetch_add(n, Ordering::Relaxed);
    }
}
