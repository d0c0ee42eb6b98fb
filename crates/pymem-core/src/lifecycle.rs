//! Structured lifecycle records.
//!
//! Each shim call can leave one [`LifecycleRecord`] in a bounded in-memory
//! ring. Recording is gated by the configured [`LogLevel`]; at `Off` (the
//! default) nothing is locked or allocated. Records are exported as JSONL.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::Serialize;

use crate::config::{LogLevel, ShimConfig};
use crate::error::FailureKind;

/// One shim call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LifecycleRecord {
    /// Monotonic id within the owning log.
    pub decision_id: u64,
    /// Correlation id, `pymem::<symbol>::<decision id>`.
    pub trace_id: String,
    pub level: LogLevel,
    /// Shim operation (`allocate`, `reallocate_raw`, `release`, ...).
    pub symbol: &'static str,
    /// Event kind (`alloc`, `realloc`, `free`, `track`).
    pub event: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ptr: Option<usize>,
    /// Machine-readable outcome label.
    pub outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
}

/// Fields of a record before the log assigns its ids.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Event {
    pub level: LogLevel,
    pub symbol: &'static str,
    pub event: &'static str,
    pub size: Option<usize>,
    pub ptr: Option<usize>,
    pub outcome: &'static str,
    pub failure: Option<FailureKind>,
}

/// Bounded ring of lifecycle records.
#[derive(Debug)]
pub struct LifecycleLog {
    level: LogLevel,
    capacity: usize,
    next_decision_id: AtomicU64,
    dropped: AtomicU64,
    records: Mutex<VecDeque<LifecycleRecord>>,
}

impl LifecycleLog {
    #[must_use]
    pub fn new(config: &ShimConfig) -> Self {
        Self {
            level: config.log_level,
            capacity: config.log_capacity.max(1),
            next_decision_id: AtomicU64::new(1),
            dropped: AtomicU64::new(0),
            records: Mutex::new(VecDeque::new()),
        }
    }

    #[must_use]
    pub const fn level(&self) -> LogLevel {
        self.level
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether a record at `level` would be kept.
    #[must_use]
    pub fn enabled(&self, level: LogLevel) -> bool {
        self.level.enables(level)
    }

    pub(crate) fn record(&self, event: Event) {
        if !self.enabled(event.level) {
            return;
        }
        let decision_id = self.next_decision_id.fetch_add(1, Ordering::Relaxed);
        let record = LifecycleRecord {
            decision_id,
            trace_id: format!("pymem::{}::{:016x}", event.symbol, decision_id),
            level: event.level,
            symbol: event.symbol,
            event: event.event,
            size: event.size,
            ptr: event.ptr,
            outcome: event.outcome,
            failure: event.failure,
        };
        let mut records = self.records.lock();
        if records.len() == self.capacity {
            records.pop_front();
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        records.push_back(record);
    }

    /// Records evicted because the ring was full.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Copy of the retained records, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<LifecycleRecord> {
        self.records.lock().iter().cloned().collect()
    }

    /// Removes and returns the retained records, oldest first.
    pub fn drain(&self) -> Vec<LifecycleRecord> {
        self.records.lock().drain(..).collect()
    }

    /// Serializes the retained records as JSON lines.
    pub fn to_jsonl(&self) -> Result<String, serde_json::Error> {
        let records = self.records.lock();
        let mut out = String::new();
        for record in records.iter() {
            out.push_str(&serde_json::to_string(record)?);
            out.push('\n');
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alloc_event(level: LogLevel, size: usize) -> Event {
        Event {
            level,
            symbol: "allocate",
            event: "alloc",
            size: Some(size),
            ptr: None,
            outcome: "ok",
            failure: None,
        }
    }

    #[test]
    fn off_level_keeps_nothing() {
        let log = LifecycleLog::new(&ShimConfig::default());
        log.record(alloc_event(LogLevel::Error, 8));
        assert!(log.is_empty());
    }

    #[test]
    fn threshold_filters_verbose_records() {
        let log = LifecycleLog::new(&ShimConfig::with_log_level(LogLevel::Error));
        log.record(alloc_event(LogLevel::Trace, 8));
        log.record(alloc_event(LogLevel::Error, 16));
        let records = log.snapshot();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].size, Some(16));
        assert_eq!(records[0].decision_id, 1);
        assert_eq!(records[0].trace_id, "pymem::allocate::0000000000000001");
    }

    #[test]
    fn ring_evicts_oldest() {
        let config = ShimConfig {
            log_level: LogLevel::Trace,
            log_capacity: 2,
        };
        let log = LifecycleLog::new(&config);
        for size in [1, 2, 3] {
            log.record(alloc_event(LogLevel::Trace, size));
        }
        let sizes: Vec<_> = log.snapshot().iter().map(|r| r.size).collect();
        assert_eq!(sizes, vec![Some(2), Some(3)]);
        assert_eq!(log.dropped(), 1);
        assert_eq!(log.drain().len(), 2);
        assert!(log.is_empty());
    }

    #[test]
    fn jsonl_has_one_object_per_line() {
        let log = LifecycleLog::new(&ShimConfig::with_log_level(LogLevel::Trace));
        log.record(alloc_event(LogLevel::Trace, 4));
        log.record(Event {
            level: LogLevel::Error,
            symbol: "allocate",
            event: "alloc",
            size: Some(usize::MAX),
            ptr: None,
            outcome: "rejected",
            failure: Some(FailureKind::Oversized),
        });
        let jsonl = log.to_jsonl().expect("records serialize");
        let lines: Vec<&str> = jsonl.lines().collect();
        assert_eq!(lines.len(), 2);
        let second: serde_json::Value = serde_json::from_str(lines[1]).expect("valid json");
        assert_eq!(second["failure"], "oversized");
        assert_eq!(second["level"], "error");
        assert!(second.get("ptr").is_none());
    }
}
