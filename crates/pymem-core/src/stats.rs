//! Call counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::error::FailureKind;

/// Relaxed per-operation counters kept by every shim.
#[derive(Debug, Default)]
pub struct ShimStats {
    allocations: AtomicU64,
    zeroed_allocations: AtomicU64,
    reallocations: AtomicU64,
    releases: AtomicU64,
    null_releases: AtomicU64,
    oversized_rejections: AtomicU64,
    overflow_rejections: AtomicU64,
    exhaustion_failures: AtomicU64,
    declined_tracks: AtomicU64,
}

/// Point-in-time copy of [`ShimStats`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub allocations: u64,
    pub zeroed_allocations: u64,
    pub reallocations: u64,
    pub releases: u64,
    pub null_releases: u64,
    pub oversized_rejections: u64,
    pub overflow_rejections: u64,
    pub exhaustion_failures: u64,
    pub declined_tracks: u64,
}

impl StatsSnapshot {
    /// All failed requests, whatever the cause.
    #[must_use]
    pub const fn failures(&self) -> u64 {
        self.oversized_rejections + self.overflow_rejections + self.exhaustion_failures
    }
}

impl ShimStats {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            allocations: AtomicU64::new(0),
            zeroed_allocations: AtomicU64::new(0),
            reallocations: AtomicU64::new(0),
            releases: AtomicU64::new(0),
            null_releases: AtomicU64::new(0),
            oversized_rejections: AtomicU64::new(0),
            overflow_rejections: AtomicU64::new(0),
            exhaustion_failures: AtomicU64::new(0),
            declined_tracks: AtomicU64::new(0),
        }
    }

    pub(crate) fn note_allocation(&self) {
        self.allocations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn note_zeroed_allocation(&self) {
        self.zeroed_allocations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn note_reallocation(&self) {
        self.reallocations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn note_release(&self) {
        self.releases.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn note_null_release(&self) {
        self.null_releases.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn note_declined_track(&self) {
        self.declined_tracks.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn note_failure(&self, kind: FailureKind) {
        let counter = match kind {
            FailureKind::Oversized => &self.oversized_rejections,
            FailureKind::Overflow => &self.overflow_rejections,
            FailureKind::Exhausted => &self.exhaustion_failures,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            allocations: self.allocations.load(Ordering::Relaxed),
            zeroed_allocations: self.zeroed_allocations.load(Ordering::Relaxed),
            reallocations: self.reallocations.load(Ordering::Relaxed),
            releases: self.releases.load(Ordering::Relaxed),
            null_releases: self.null_releases.load(Ordering::Relaxed),
            oversized_rejections: self.oversized_rejections.load(Ordering::Relaxed),
            overflow_rejections: self.overflow_rejections.load(Ordering::Relaxed),
            exhaustion_failures: self.exhaustion_failures.load(Ordering::Relaxed),
            declined_tracks: self.declined_tracks.load(Ordering::Relaxed),
        }
    }
}
