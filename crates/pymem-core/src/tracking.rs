//! Allocation tracking hook.
//!
//! Callers report allocations to a tracker without knowing whether any
//! instrumentation is present. The default tracker declines every report.

use serde::Serialize;

/// Tag distinguishing allocation categories (the C `_PyTraceMalloc_domain_t`).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TraceDomain(pub u32);

/// Outcome of a tracking request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceStatus {
    /// The event was recorded.
    Tracked,
    /// Tracking is unsupported or disabled; nothing was recorded.
    Declined,
}

impl TraceStatus {
    /// Status code returned across the C boundary.
    #[must_use]
    pub const fn as_c_int(self) -> i32 {
        match self {
            Self::Tracked => 0,
            Self::Declined => -2,
        }
    }
}

/// Receives allocation events for diagnostic tooling.
pub trait AllocationTracker: Send + Sync {
    fn track(&self, domain: TraceDomain, address: usize, size: usize) -> TraceStatus;

    fn untrack(&self, domain: TraceDomain, address: usize) -> TraceStatus;
}

/// Tracker that records nothing and always answers [`TraceStatus::Declined`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DecliningTracker;

impl AllocationTracker for DecliningTracker {
    fn track(&self, _domain: TraceDomain, _address: usize, _size: usize) -> TraceStatus {
        TraceStatus::Declined
    }

    fn untrack(&self, _domain: TraceDomain, _address: usize) -> TraceStatus {
        TraceStatus::Declined
    }
}
