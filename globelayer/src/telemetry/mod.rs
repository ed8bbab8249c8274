//! Fetch telemetry.
//!
//! Lock-free counters updated by the scheduler and the fetch workers, read as
//! a point-in-time [`MetricsSnapshot`] for logging and the CLI.
//!
//! ```text
//! Scheduler / Workers ─────► FetchMetrics ─────► MetricsSnapshot ─────► CLI, logs
//!                            (atomic counters)   (point-in-time copy)
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Counters for the fetch path.
#[derive(Debug)]
pub struct FetchMetrics {
    requests_queued: AtomicU64,
    tasks_dispatched: AtomicU64,
    store_hits: AtomicU64,
    downloads: AtomicU64,
    bytes_downloaded: AtomicU64,
    failures: AtomicU64,
    corrupt_removed: AtomicU64,
    started: Instant,
}

impl Default for FetchMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl FetchMetrics {
    pub fn new() -> Self {
        Self {
            requests_queued: AtomicU64::new(0),
            tasks_dispatched: AtomicU64::new(0),
            store_hits: AtomicU64::new(0),
            downloads: AtomicU64::new(0),
            bytes_downloaded: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            corrupt_removed: AtomicU64::new(0),
            started: Instant::now(),
        }
    }

    pub fn request_queued(&self) {
        self.requests_queued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn task_dispatched(&self) {
        self.tasks_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn store_hit(&self) {
        self.store_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn downloaded(&self, bytes: u64) {
        self.downloads.fetch_add(1, Ordering::Relaxed);
        self.bytes_downloaded.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn failed(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    /// A store entry that failed to decode was deleted.
    pub fn corrupt_removed(&self) {
        self.corrupt_removed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests_queued: self.requests_queued.load(Ordering::Relaxed),
            tasks_dispatched: self.tasks_dispatched.load(Ordering::Relaxed),
            store_hits: self.store_hits.load(Ordering::Relaxed),
            downloads: self.downloads.load(Ordering::Relaxed),
            bytes_downloaded: self.bytes_downloaded.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            corrupt_removed: self.corrupt_removed.load(Ordering::Relaxed),
            elapsed_secs: self.started.elapsed().as_secs_f64(),
        }
    }
}

/// Point-in-time copy of [`FetchMetrics`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsSnapshot {
    pub requests_queued: u64,
    pub tasks_dispatched: u64,
    pub store_hits: u64,
    pub downloads: u64,
    pub bytes_downloaded: u64,
    pub failures: u64,
    pub corrupt_removed: u64,
    pub elapsed_secs: f64,
}

impl MetricsSnapshot {
    /// Download throughput over the metrics lifetime.
    pub fn bytes_per_second(&self) -> f64 {
        if self.elapsed_secs > 0.0 {
            self.bytes_downloaded as f64 / self.elapsed_secs
        } else {
            0.0
        }
    }
}

impl fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "queued {}, dispatched {}, store hits {}, downloads {} ({:.1} KB, {:.1} KB/s), failures {}, corrupt removed {}",
            self.requests_queued,
            self.tasks_dispatched,
            self.store_hits,
            self.downloads,
            self.bytes_downloaded as f64 / 1024.0,
            self.bytes_per_second() / 1024.0,
            self.failures,
            self.corrupt_removed
        )
    }
}
