//! Statistics for the endpoint pool

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Point-in-time pool statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Endpoints currently registered
    pub entries: usize,
    /// Candidates published as new entries
    pub registered: u64,
    /// Registrations answered with an existing endpoint
    pub reused: u64,
    /// Successful `find` calls
    pub lookup_hits: u64,
    /// `find` calls for unknown fingerprints
    pub lookup_misses: u64,
    /// Publish attempts lost to a concurrent writer and retried
    pub retries: u64,
    /// Entries removed by unregister or sweep
    pub evicted: u64,
    /// Completed sweep cycles
    pub sweeps: u64,
    /// Time since the pool started
    pub uptime: Duration,
}

impl PoolStats {
    /// Fraction of registrations that reused an existing endpoint
    pub fn reuse_ratio(&self) -> f64 {
        let total = self.registered + self.reused;
        if total > 0 {
            self.reused as f64 / total as f64
        } else {
            0.0
        }
    }

    /// Fraction of `find` calls that hit
    pub fn hit_ratio(&self) -> f64 {
        let total = self.lookup_hits + self.lookup_misses;
        if total > 0 {
            self.lookup_hits as f64 / total as f64
        } else {
            0.0
        }
    }
}

/// Lock-free counters updated by the registry and sweeper
#[derive(Debug)]
pub(crate) struct PoolMetrics {
    started_at: Instant,
    registered: AtomicU64,
    reused: AtomicU64,
    lookup_hits: AtomicU64,
    lookup_misses: AtomicU64,
    retries: AtomicU64,
    evicted: AtomicU64,
    sweeps: AtomicU64,
}

impl PoolMetrics {
    pub(crate) fn new() -> Self {
        Self {
            started_at: Instant::now(),
            registered: AtomicU64::new(0),
            reused: AtomicU64::new(0),
            lookup_hits: AtomicU64::new(0),
            lookup_misses: AtomicU64::new(0),
            retries: AtomicU64::new(0),
            evicted: AtomicU64::new(0),
            sweeps: AtomicU64::new(0),
        }
    }

    pub(crate) fn record_registered(&self) {
        self.registered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_reused(&self) {
        self.reused.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_lookup(&self, hit: bool) {
        let counter = if hit { &self.lookup_hits } else { &self.lookup_misses };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_evicted(&self, count: usize) {
        self.evicted.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_sweep(&self) {
        self.sweeps.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, entries: usize) -> PoolStats {
        PoolStats {
            entries,
            registered: self.registered.load(Ordering::Relaxed),
            reused: self.reused.load(Ordering::Relaxed),
            lookup_hits: self.lookup_hits.load(Ordering::Relaxed),
            lookup_misses: self.lookup_misses.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
            sweeps: self.sweeps.load(Ordering::Relaxed),
            uptime: self.started_at.elapsed(),
        }
    }
}
