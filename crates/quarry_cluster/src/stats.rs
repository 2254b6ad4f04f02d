//! Cluster-wide work statistics.
//!
//! Each worker owns one monotonically increasing counter of work units
//! (nodes) processed during the current search. The cluster total is the
//! local count plus the last aggregate learned from the signal channel;
//! it is an advisory snapshot, never a consistent cut, and reading it
//! never blocks the counter from advancing.

use std::sync::atomic::{AtomicU64, Ordering};

/// Per-worker work counter with a cached remote aggregate
#[derive(Debug, Default)]
pub struct WorkCounter {
    local: AtomicU64,
    others: AtomicU64,
}

impl WorkCounter {
    /// Create a zeroed counter
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add processed work units (hot path)
    pub fn add(&self, nodes: u64) {
        self.local.fetch_add(nodes, Ordering::Relaxed);
    }

    /// This worker's count
    pub fn local(&self) -> u64 {
        self.local.load(Ordering::Relaxed)
    }

    /// Cluster-wide total: local count plus the last learned remainder
    ///
    /// In single-node mode the remainder stays zero, so this returns the
    /// local counter verbatim.
    pub fn total(&self) -> u64 {
        self.local() + self.others.load(Ordering::Relaxed)
    }

    /// Record the work done by all other workers, as learned from the
    /// latest signal aggregate
    pub(crate) fn set_others(&self, others: u64) {
        self.others.store(others, Ordering::Relaxed);
    }

    /// Reset both counts at the start of a new search
    pub fn reset(&self) {
        self.local.store(0, Ordering::Relaxed);
        self.others.store(0, Ordering::Relaxed);
    }
}
