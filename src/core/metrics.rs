// src/core/metrics.rs

//! Defines and registers Prometheus metrics for server monitoring.
//!
//! This module uses `lazy_static` to ensure that metrics are registered only
//! once globally for the entire application lifecycle.

use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Gauge, GaugeVec, Histogram, TextEncoder, register_counter,
    register_counter_vec, register_gauge, register_gauge_vec, register_histogram,
};

lazy_static! {
    // --- Job gauges ---
    /// Number of put/get jobs currently tracked in the job map.
    pub static ref ACTIVE_JOBS: Gauge =
        register_gauge!("s4_active_jobs", "Number of in-flight put/get jobs.").unwrap();
    /// Saturation of the five named resource pools, labeled by pool name.
    pub static ref POOL_IN_USE: GaugeVec =
        register_gauge_vec!("s4_pool_in_use", "Permits currently held per resource pool.", &["pool"]).unwrap();

    // --- Request counters ---
    /// Total number of completed put operations.
    pub static ref PUTS_TOTAL: Counter =
        register_counter!("s4_puts_total", "Total number of completed put operations.").unwrap();
    /// Total number of completed get operations.
    pub static ref GETS_TOTAL: Counter =
        register_counter!("s4_gets_total", "Total number of completed get operations.").unwrap();
    /// Total number of put/get conflicts (409s).
    pub static ref CONFLICTS_TOTAL: Counter =
        register_counter!("s4_conflicts_total", "Total number of 409 conflicts returned.").unwrap();
    /// Total number of jobs reclaimed by the garbage collector, labeled by kind.
    pub static ref GC_REMOVED_TOTAL: CounterVec =
        register_counter_vec!("s4_gc_removed_total", "Total number of stranded jobs and temp entries removed by GC.", &["kind"]).unwrap();
    /// Total bytes transferred over the side-channel, labeled by direction.
    pub static ref BYTES_TRANSFERRED_TOTAL: CounterVec =
        register_counter_vec!("s4_bytes_transferred_total", "Total bytes sent or received over the side channel.", &["direction"]).unwrap();
    /// Total number of map/map-to-n/map-from-n shell invocations, labeled by exit outcome.
    pub static ref MAP_INVOCATIONS_TOTAL: CounterVec =
        register_counter_vec!("s4_map_invocations_total", "Total number of map operator shell invocations.", &["outcome"]).unwrap();

    // --- Histograms ---
    /// Latency of HTTP request handling, labeled by route.
    pub static ref REQUEST_LATENCY_SECONDS: Histogram =
        register_histogram!("s4_request_latency_seconds", "Latency of HTTP request handling in seconds.").unwrap();
}

/// Gathers all registered metrics and encodes them in the Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder.encode_to_string(&metric_families).unwrap()
}
