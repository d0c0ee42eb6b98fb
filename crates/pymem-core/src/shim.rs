//! The allocation shim.
//!
//! [`MemoryShim`] exposes the `PyMem` allocation family as safe-typed calls
//! over an injected [`RawAllocator`]:
//!
//! | Operation | Guard | C symbol |
//! |---|---|---|
//! | [`allocate`](MemoryShim::allocate) | signed size bound | `PyMem_Malloc` |
//! | [`allocate_zeroed`](MemoryShim::allocate_zeroed) | overflow + signed bound | `PyMem_Calloc` |
//! | [`reallocate`](MemoryShim::reallocate) | signed size bound | `PyMem_Realloc` |
//! | [`release`](MemoryShim::release) | none | `PyMem_Free` |
//! | [`allocate_raw`](MemoryShim::allocate_raw) | none | `PyMem_RawMalloc` |
//! | [`allocate_raw_zeroed`](MemoryShim::allocate_raw_zeroed) | overflow | `PyMem_RawCalloc` |
//! | [`reallocate_raw`](MemoryShim::reallocate_raw) | none | `PyMem_RawRealloc` |
//! | [`release_raw`](MemoryShim::release_raw) | none | `PyMem_RawFree` |
//! | [`track_allocation`](MemoryShim::track_allocation) | n/a | `PyTraceMalloc_Track` |
//!
//! Failures come back as [`AllocError`]; nothing here panics or
//! writes to an output stream.

#![allow(unsafe_code)]

use crate::backend::{RawAllocator, SystemAllocator};
use crate::config::{LogLevel, ShimConfig};
use crate::error::{AllocError, FailureKind, ReallocError};
use crate::handle::Handle;
use crate::lifecycle::{Event, LifecycleLog};
use crate::stats::{ShimStats, StatsSnapshot};
use crate::tracking::{AllocationTracker, DecliningTracker, TraceDomain, TraceStatus};

/// Largest byte count the guarded entry points accept.
///
/// Callers store sizes in a signed pointer-width integer, so anything above
/// `isize::MAX` is rejected before the allocator is consulted. The value
/// follows the target's pointer width.
pub const MAX_SIGNED_SIZE: usize = isize::MAX as usize;

/// Allocation shim over allocator `A` with tracking hook `T`.
#[derive(Debug)]
pub struct MemoryShim<A = SystemAllocator, T = DecliningTracker> {
    allocator: A,
    tracker: T,
    stats: ShimStats,
    log: LifecycleLog,
}

impl MemoryShim {
    /// System allocator, declining tracker, silent configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_parts(SystemAllocator, DecliningTracker, ShimConfig::default())
    }

    /// System allocator and declining tracker, configured from the environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::with_parts(SystemAllocator, DecliningTracker, ShimConfig::from_env())
    }
}

impl Default for MemoryShim {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: RawAllocator> MemoryShim<A> {
    /// Shim over `allocator` with the declining tracker and silent configuration.
    pub fn with_allocator(allocator: A) -> Self {
        Self::with_parts(allocator, DecliningTracker, ShimConfig::default())
    }
}

impl<A: RawAllocator, T: AllocationTracker> MemoryShim<A, T> {
    pub fn with_parts(allocator: A, tracker: T, config: ShimConfig) -> Self {
        Self {
            allocator,
            tracker,
            stats: ShimStats::new(),
            log: LifecycleLog::new(&config),
        }
    }

    pub fn allocator(&self) -> &A {
        &self.allocator
    }

    pub fn tracker(&self) -> &T {
        &self.tracker
    }

    pub fn lifecycle(&self) -> &LifecycleLog {
        &self.log
    }

    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    // -----------------------------------------------------------------------
    // Bookkeeping
    // -----------------------------------------------------------------------

    fn fail(
        &self,
        symbol: &'static str,
        event: &'static str,
        size: Option<usize>,
        err: AllocError,
    ) -> AllocError {
        let kind = err.kind();
        self.stats.note_failure(kind);
        // Argument rejections are caller errors; exhaustion is the allocator's.
        let (level, outcome) = match kind {
            FailureKind::Exhausted => (LogLevel::Error, "exhausted"),
            FailureKind::Oversized | FailureKind::Overflow => (LogLevel::Info, "rejected"),
        };
        self.log.record(Event {
            level,
            symbol,
            event,
            size,
            ptr: None,
            outcome,
            failure: Some(kind),
        });
        err
    }

    fn succeed(&self, symbol: &'static str, event: &'static str, size: usize, handle: &Handle) {
        self.log.record(Event {
            level: LogLevel::Trace,
            symbol,
            event,
            size: Some(size),
            ptr: Some(handle.addr()),
            outcome: "ok",
            failure: None,
        });
    }

    // -----------------------------------------------------------------------
    // Allocation
    // -----------------------------------------------------------------------

    /// Allocates at least `size` bytes, rejecting sizes above [`MAX_SIGNED_SIZE`].
    ///
    /// The bound is checked before the allocator is called, so an oversized
    /// request fails regardless of available memory.
    pub fn allocate(&self, size: usize) -> Result<Handle, AllocError> {
        if size > MAX_SIGNED_SIZE {
            return Err(self.fail(
                "allocate",
                "alloc",
                Some(size),
                AllocError::Oversized {
                    requested: size,
                    limit: MAX_SIGNED_SIZE,
                },
            ));
        }
        self.malloc_unchecked("allocate", size)
    }

    /// Allocates at least `size` bytes with no bound check.
    ///
    /// `size` reaches the allocator unmodified, however large.
    pub fn allocate_raw(&self, size: usize) -> Result<Handle, AllocError> {
        self.malloc_unchecked("allocate_raw", size)
    }

    fn malloc_unchecked(&self, symbol: &'static str, size: usize) -> Result<Handle, AllocError> {
        match self.allocator.malloc(size) {
            Some(ptr) => {
                let handle = Handle::from_non_null(ptr);
                self.stats.note_allocation();
                self.succeed(symbol, "alloc", size, &handle);
                Ok(handle)
            }
            None => Err(self.fail(
                symbol,
                "alloc",
                Some(size),
                AllocError::Exhausted { requested: size },
            )),
        }
    }

    /// Allocates `count * elem_size` zeroed bytes.
    ///
    /// Fails with [`AllocError::Overflow`] when the product does not fit.
    pub fn allocate_raw_zeroed(&self, count: usize, elem_size: usize) -> Result<Handle, AllocError> {
        self.calloc_checked("allocate_raw_zeroed", count, elem_size, None)
    }

    /// Like [`allocate_raw_zeroed`](Self::allocate_raw_zeroed), additionally
    /// rejecting totals above [`MAX_SIGNED_SIZE`].
    pub fn allocate_zeroed(&self, count: usize, elem_size: usize) -> Result<Handle, AllocError> {
        self.calloc_checked("allocate_zeroed", count, elem_size, Some(MAX_SIGNED_SIZE))
    }

    fn calloc_checked(
        &self,
        symbol: &'static str,
        count: usize,
        elem_size: usize,
        limit: Option<usize>,
    ) -> Result<Handle, AllocError> {
        let Some(total) = count.checked_mul(elem_size) else {
            return Err(self.fail(
                symbol,
                "alloc",
                None,
                AllocError::Overflow { count, elem_size },
            ));
        };
        if let Some(limit) = limit
            && total > limit
        {
            return Err(self.fail(
                symbol,
                "alloc",
                Some(total),
                AllocError::Oversized {
                    requested: total,
                    limit,
                },
            ));
        }
        match self.allocator.calloc(count, elem_size) {
            Some(ptr) => {
                let handle = Handle::from_non_null(ptr);
                self.stats.note_zeroed_allocation();
                self.succeed(symbol, "alloc", total, &handle);
                Ok(handle)
            }
            None => Err(self.fail(
                symbol,
                "alloc",
                Some(total),
                AllocError::Exhausted { requested: total },
            )),
        }
    }

    // -----------------------------------------------------------------------
    // Reallocation
    // -----------------------------------------------------------------------

    /// Resizes `handle` to at least `new_size` bytes with no bound check.
    ///
    /// Contents are preserved up to the smaller of the old and new sizes.
    /// `None` behaves as [`allocate_raw`](Self::allocate_raw). On failure the
    /// original handle comes back inside the error, still live and unchanged.
    ///
    /// # Safety
    ///
    /// `handle` must have been allocated through this shim's allocator.
    pub unsafe fn reallocate_raw(
        &self,
        handle: Option<Handle>,
        new_size: usize,
    ) -> Result<Handle, ReallocError> {
        // SAFETY: forwarded caller contract.
        unsafe { self.realloc_unchecked("reallocate_raw", handle, new_size) }
    }

    /// Like [`reallocate_raw`](Self::reallocate_raw), rejecting sizes above
    /// [`MAX_SIGNED_SIZE`] before the allocator is consulted.
    ///
    /// # Safety
    ///
    /// `handle` must have been allocated through this shim's allocator.
    pub unsafe fn reallocate(
        &self,
        handle: Option<Handle>,
        new_size: usize,
    ) -> Result<Handle, ReallocError> {
        if new_size > MAX_SIGNED_SIZE {
            let source = self.fail(
                "reallocate",
                "realloc",
                Some(new_size),
                AllocError::Oversized {
                    requested: new_size,
                    limit: MAX_SIGNED_SIZE,
                },
            );
            return Err(ReallocError {
                original: handle,
                source,
            });
        }
        // SAFETY: forwarded caller contract.
        unsafe { self.realloc_unchecked("reallocate", handle, new_size) }
    }

    unsafe fn realloc_unchecked(
        &self,
        symbol: &'static str,
        handle: Option<Handle>,
        new_size: usize,
    ) -> Result<Handle, ReallocError> {
        let old = handle.as_ref().map(Handle::as_non_null);
        // SAFETY: caller guarantees `old` came from this allocator and is live.
        match unsafe { self.allocator.realloc(old, new_size) } {
            Some(ptr) => {
                // The old handle is now dangling; forget it without releasing.
                if let Some(old) = handle {
                    let _ = old.into_raw();
                }
                let handle = Handle::from_non_null(ptr);
                self.stats.note_reallocation();
                self.succeed(symbol, "realloc", new_size, &handle);
                Ok(handle)
            }
            None => {
                let source = self.fail(
                    symbol,
                    "realloc",
                    Some(new_size),
                    AllocError::Exhausted {
                        requested: new_size,
                    },
                );
                Err(ReallocError {
                    original: handle,
                    source,
                })
            }
        }
    }

    // -----------------------------------------------------------------------
    // Release
    // -----------------------------------------------------------------------

    /// Returns `handle` to the allocator. `None` is a no-op.
    ///
    /// # Safety
    ///
    /// `handle` must have been allocated through this shim's allocator.
    pub unsafe fn release_raw(&self, handle: Option<Handle>) {
        // SAFETY: forwarded caller contract.
        unsafe { self.free("release_raw", handle) }
    }

    /// Returns `handle` to the allocator. `None` is a no-op.
    ///
    /// # Safety
    ///
    /// `handle` must have been allocated through this shim's allocator.
    pub unsafe fn release(&self, handle: Option<Handle>) {
        // SAFETY: forwarded caller contract.
        unsafe { self.free("release", handle) }
    }

    unsafe fn free(&self, symbol: &'static str, handle: Option<Handle>) {
        let Some(handle) = handle else {
            self.stats.note_null_release();
            self.log.record(Event {
                level: LogLevel::Debug,
                symbol,
                event: "free",
                size: None,
                ptr: None,
                outcome: "null_noop",
                failure: None,
            });
            return;
        };
        let addr = handle.addr();
        // SAFETY: caller guarantees the handle came from this allocator; taking
        // it by value means it cannot be released twice through the safe API.
        unsafe { self.allocator.free(handle.as_non_null()) };
        let _ = handle.into_raw();
        self.stats.note_release();
        self.log.record(Event {
            level: LogLevel::Trace,
            symbol,
            event: "free",
            size: None,
            ptr: Some(addr),
            outcome: "ok",
            failure: None,
        });
    }

    // -----------------------------------------------------------------------
    // Tracking
    // -----------------------------------------------------------------------

    /// Reports a region to the tracking hook.
    pub fn track_allocation(&self, domain: TraceDomain, address: usize, size: usize) -> TraceStatus {
        let status = self.tracker.track(domain, address, size);
        self.note_track("track_allocation", status, Some(size), address);
        status
    }

    /// Withdraws a region from the tracking hook.
    pub fn untrack_allocation(&self, domain: TraceDomain, address: usize) -> TraceStatus {
        let status = self.tracker.untrack(domain, address);
        self.note_track("untrack_allocation", status, None, address);
        status
    }

    fn note_track(
        &self,
        symbol: &'static str,
        status: TraceStatus,
        size: Option<usize>,
        address: usize,
    ) {
        if status == TraceStatus::Declined {
            self.stats.note_declined_track();
        }
        self.log.record(Event {
            level: LogLevel::Trace,
            symbol,
            event: "track",
            size,
            ptr: Some(address),
            outcome: match status {
                TraceStatus::Tracked => "tracked",
                TraceStatus::Declined => "declined",
            },
            failure: None,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fault::{FaultInjector, FaultPlan};
    use std::sync::Arc;

    fn fill(handle: &mut Handle, len: usize) {
        // SAFETY: tests only fill regions they allocated with at least `len` bytes.
        let bytes = unsafe { handle.as_mut_slice(len) };
        for (i, b) in bytes.iter_mut().enumerate() {
            *b = (i % 251) as u8;
        }
    }

    fn is_pattern(handle: &Handle, len: usize) -> bool {
        // SAFETY: callers pass a length that was filled by `fill`.
        let bytes = unsafe { handle.as_slice(len) };
        bytes.iter().enumerate().all(|(i, b)| *b == (i % 251) as u8)
    }

    #[test]
    fn signed_bound_follows_pointer_width() {
        assert_eq!(MAX_SIGNED_SIZE, isize::MAX as usize);
        #[cfg(target_pointer_width = "64")]
        assert_eq!(MAX_SIGNED_SIZE, 9_223_372_036_854_775_807);
        #[cfg(target_pointer_width = "32")]
        assert_eq!(MAX_SIGNED_SIZE, 2_147_483_647);
    }

    #[test]
    fn allocate_serves_in_range_sizes() {
        let shim = MemoryShim::new();
        for size in [0usize, 1, 7, 64, 4096, 1 << 20] {
            let mut handle = shim.allocate(size).expect("in-range allocation");
            assert_eq!(handle.addr() % std::mem::align_of::<usize>(), 0);
            fill(&mut handle, size);
            assert!(is_pattern(&handle, size));
            // SAFETY: handle came from this shim.
            unsafe { shim.release(Some(handle)) };
        }
        assert_eq!(shim.stats().allocations, 6);
        assert_eq!(shim.stats().releases, 6);
    }

    #[test]
    fn allocate_rejects_max_u64_without_consulting_allocator() {
        let shim = MemoryShim::with_allocator(FaultInjector::new(SystemAllocator, FaultPlan::Never));
        let err = shim.allocate(usize::MAX).expect_err("usize::MAX must be rejected");
        assert_eq!(
            err,
            AllocError::Oversized {
                requested: usize::MAX,
                limit: MAX_SIGNED_SIZE,
            }
        );
        let err = shim
            .allocate(MAX_SIGNED_SIZE + 1)
            .expect_err("one past the bound must be rejected");
        assert_eq!(err.kind(), FailureKind::Oversized);
        assert_eq!(shim.allocator().requests(), 0);
        assert_eq!(shim.stats().oversized_rejections, 2);
    }

    #[test]
    fn allocate_at_the_bound_reaches_allocator() {
        let shim = MemoryShim::with_allocator(FaultInjector::new(SystemAllocator, FaultPlan::Always));
        let err = shim
            .allocate(MAX_SIGNED_SIZE)
            .expect_err("injected failure");
        assert_eq!(err, AllocError::Exhausted { requested: MAX_SIGNED_SIZE });
        assert_eq!(shim.allocator().last_request(), MAX_SIGNED_SIZE);
    }

    #[test]
    fn allocate_raw_passes_huge_sizes_through() {
        let shim = MemoryShim::with_allocator(FaultInjector::new(SystemAllocator, FaultPlan::Never));
        let err = shim
            .allocate_raw(usize::MAX)
            .expect_err("no allocator can serve usize::MAX");
        assert_eq!(err, AllocError::Exhausted { requested: usize::MAX });
        assert_eq!(shim.allocator().requests(), 1);
        assert_eq!(shim.allocator().last_request(), usize::MAX);
        assert_eq!(shim.stats().exhaustion_failures, 1);
        assert_eq!(shim.stats().oversized_rejections, 0);
    }

    #[test]
    fn exhaustion_is_reported_not_raised() {
        let shim = MemoryShim::with_allocator(FaultInjector::new(SystemAllocator, FaultPlan::Always));
        assert!(matches!(shim.allocate(16), Err(AllocError::Exhausted { requested: 16 })));
        assert!(matches!(shim.allocate_raw(16), Err(AllocError::Exhausted { .. })));
        assert!(matches!(
            shim.allocate_raw_zeroed(4, 4),
            Err(AllocError::Exhausted { requested: 16 })
        ));
    }

    #[test]
    fn raw_zeroed_ten_by_four_is_forty_zero_bytes() {
        let shim = MemoryShim::new();
        let handle = shim.allocate_raw_zeroed(10, 4).expect("40 bytes");
        // SAFETY: calloc initialized 40 bytes.
        let bytes = unsafe { handle.as_slice(40) };
        assert_eq!(bytes.len(), 40);
        assert!(bytes.iter().all(|b| *b == 0));
        // SAFETY: handle came from this shim.
        unsafe { shim.release_raw(Some(handle)) };
        assert_eq!(shim.stats().zeroed_allocations, 1);
    }

    #[test]
    fn raw_zeroed_is_zero_across_sizes() {
        let shim = MemoryShim::new();
        for (count, elem) in [(1usize, 1usize), (3, 17), (256, 8), (1, 65_536)] {
            let total = count * elem;
            let handle = shim.allocate_raw_zeroed(count, elem).expect("zeroed allocation");
            // SAFETY: calloc initialized `total` bytes.
            assert!(unsafe { handle.as_slice(total) }.iter().all(|b| *b == 0));
            // SAFETY: handle came from this shim.
            unsafe { shim.release_raw(Some(handle)) };
        }
    }

    #[test]
    fn zeroed_overflow_is_detected_before_allocation() {
        let shim = MemoryShim::with_allocator(FaultInjector::new(SystemAllocator, FaultPlan::Never));
        let err = shim
            .allocate_raw_zeroed(usize::MAX, 2)
            .expect_err("product overflows");
        assert_eq!(
            err,
            AllocError::Overflow {
                count: usize::MAX,
                elem_size: 2,
            }
        );
        assert_eq!(shim.allocator().requests(), 0);
        assert_eq!(shim.stats().overflow_rejections, 1);
    }

    #[test]
    fn guarded_zeroed_rejects_totals_above_bound() {
        let shim = MemoryShim::with_allocator(FaultInjector::new(SystemAllocator, FaultPlan::Never));
        let err = shim
            .allocate_zeroed(MAX_SIGNED_SIZE / 2 + 1, 2)
            .expect_err("total exceeds signed bound");
        assert_eq!(err.kind(), FailureKind::Oversized);
        assert_eq!(shim.allocator().requests(), 0);

        let handle = shim.allocate_zeroed(8, 8).expect("64 zeroed bytes");
        // SAFETY: calloc initialized 64 bytes.
        assert!(unsafe { handle.as_slice(64) }.iter().all(|b| *b == 0));
        // SAFETY: handle came from this shim.
        unsafe { shim.release(Some(handle)) };
    }

    #[test]
    fn growing_preserves_low_bytes() {
        let shim = MemoryShim::new();
        let mut handle = shim.allocate_raw(32).expect("32 bytes");
        fill(&mut handle, 32);
        // SAFETY: handle came from this shim.
        let grown = unsafe { shim.reallocate_raw(Some(handle), 4096) }.expect("grow to 4096");
        assert!(is_pattern(&grown, 32));
        // SAFETY: handle came from this shim.
        unsafe { shim.release_raw(Some(grown)) };
        assert_eq!(shim.stats().reallocations, 1);
    }

    #[test]
    fn shrinking_preserves_prefix() {
        let shim = MemoryShim::new();
        let mut handle = shim.allocate_raw(1024).expect("1024 bytes");
        fill(&mut handle, 1024);
        // SAFETY: handle came from this shim.
        let shrunk = unsafe { shim.reallocate_raw(Some(handle), 100) }.expect("shrink to 100");
        assert!(is_pattern(&shrunk, 100));
        // SAFETY: handle came from this shim.
        unsafe { shim.release_raw(Some(shrunk)) };
    }

    #[test]
    fn reallocating_none_allocates() {
        let shim = MemoryShim::new();
        // SAFETY: None is always valid.
        let mut handle = unsafe { shim.reallocate_raw(None, 48) }.expect("fresh 48 bytes");
        fill(&mut handle, 48);
        assert!(is_pattern(&handle, 48));
        // SAFETY: handle came from this shim.
        unsafe { shim.release_raw(Some(handle)) };
    }

    #[test]
    fn failed_realloc_hands_back_original_intact() {
        let shim = MemoryShim::with_allocator(FaultInjector::new(SystemAllocator, FaultPlan::AfterSuccesses(1)));
        let mut handle = shim.allocate_raw(64).expect("first request is served");
        fill(&mut handle, 64);
        let addr = handle.addr();

        // SAFETY: handle came from this shim.
        let err = unsafe { shim.reallocate_raw(Some(handle), 1 << 16) }.expect_err("injected failure");
        let (original, source) = err.into_parts();
        assert_eq!(source, AllocError::Exhausted { requested: 1 << 16 });
        let original = original.expect("original handle is handed back");
        assert_eq!(original.addr(), addr);
        assert!(is_pattern(&original, 64));

        // SAFETY: the original is still live and came from this shim.
        unsafe { shim.release_raw(Some(original)) };
        assert_eq!(shim.allocator().frees(), 1);
    }

    #[test]
    fn failed_realloc_of_none_has_no_original() {
        let shim = MemoryShim::with_allocator(FaultInjector::new(SystemAllocator, FaultPlan::Always));
        // SAFETY: None is always valid.
        let err = unsafe { shim.reallocate_raw(None, 8) }.expect_err("injected failure");
        assert!(err.original.is_none());
    }

    #[test]
    fn guarded_realloc_rejects_oversize_and_returns_original() {
        let shim = MemoryShim::with_allocator(FaultInjector::new(SystemAllocator, FaultPlan::Never));
        let handle = shim.allocate(16).expect("16 bytes");
        // SAFETY: handle came from this shim.
        let err = unsafe { shim.reallocate(Some(handle), usize::MAX) }.expect_err("oversized");
        assert_eq!(err.source.kind(), FailureKind::Oversized);
        assert_eq!(shim.allocator().requests(), 1);
        // SAFETY: the original is still live and came from this shim.
        unsafe { shim.release(err.original) };
        assert_eq!(shim.allocator().frees(), 1);
    }

    #[test]
    fn null_release_is_a_noop_for_live_handles() {
        let shim = MemoryShim::with_allocator(FaultInjector::new(SystemAllocator, FaultPlan::Never));
        let mut live = shim.allocate(32).expect("32 bytes");
        fill(&mut live, 32);
        // SAFETY: None is always valid.
        unsafe {
            shim.release_raw(None);
            shim.release(None);
        }
        assert!(is_pattern(&live, 32));
        assert_eq!(shim.allocator().frees(), 0);
        assert_eq!(shim.stats().null_releases, 2);
        // SAFETY: handle came from this shim.
        unsafe { shim.release(Some(live)) };
    }

    #[test]
    fn tracking_always_declines() {
        let shim = MemoryShim::new();
        let inputs = [
            (TraceDomain(0), 0usize, 0usize),
            (TraceDomain(0), 0x1000, 0),
            (TraceDomain(7), 0xdead_beef, 4096),
            (TraceDomain(u32::MAX), usize::MAX, usize::MAX),
        ];
        for (domain, address, size) in inputs {
            assert_eq!(shim.track_allocation(domain, address, size), TraceStatus::Declined);
            assert_eq!(shim.untrack_allocation(domain, address), TraceStatus::Declined);
        }
        assert_eq!(shim.stats().declined_tracks, 8);
    }

    #[derive(Default)]
    struct CountingTracker {
        tracked: std::sync::atomic::AtomicUsize,
        untracked: std::sync::atomic::AtomicUsize,
    }

    impl AllocationTracker for CountingTracker {
        fn track(&self, _domain: TraceDomain, _address: usize, _size: usize) -> TraceStatus {
            self.tracked.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            TraceStatus::Tracked
        }

        fn untrack(&self, _domain: TraceDomain, _address: usize) -> TraceStatus {
            self.untracked.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            TraceStatus::Tracked
        }
    }

    #[test]
    fn injected_tracker_sees_every_call() {
        let shim = MemoryShim::with_parts(
            SystemAllocator,
            CountingTracker::default(),
            ShimConfig::default(),
        );
        assert_eq!(shim.track_allocation(TraceDomain(1), 0x10, 8), TraceStatus::Tracked);
        assert_eq!(shim.track_allocation(TraceDomain(1), 0x20, 8), TraceStatus::Tracked);
        assert_eq!(shim.untrack_allocation(TraceDomain(1), 0x10), TraceStatus::Tracked);

        let tracker = shim.tracker();
        assert_eq!(tracker.tracked.load(std::sync::atomic::Ordering::Relaxed), 2);
        assert_eq!(tracker.untracked.load(std::sync::atomic::Ordering::Relaxed), 1);
        assert_eq!(shim.stats().declined_tracks, 0);
    }

    #[test]
    fn lifecycle_records_when_enabled() {
        let shim = MemoryShim::with_parts(
            SystemAllocator,
            DecliningTracker,
            ShimConfig::with_log_level(LogLevel::Trace),
        );
        let handle = shim.allocate(24).expect("24 bytes");
        let addr = handle.addr();
        // SAFETY: handle came from this shim.
        unsafe { shim.release(Some(handle)) };
        let _ = shim.allocate(usize::MAX);

        let records = shim.lifecycle().snapshot();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].symbol, "allocate");
        assert_eq!(records[0].size, Some(24));
        assert_eq!(records[0].ptr, Some(addr));
        assert_eq!(records[1].event, "free");
        assert_eq!(records[2].outcome, "rejected");
        assert_eq!(records[2].failure, Some(FailureKind::Oversized));
        assert_eq!(records[2].level, LogLevel::Info);
    }

    #[test]
    fn error_level_keeps_exhaustion_and_info_adds_rejections() {
        let at = |level| {
            let shim = MemoryShim::with_parts(
                FaultInjector::new(SystemAllocator, FaultPlan::Always),
                DecliningTracker,
                ShimConfig::with_log_level(level),
            );
            let _ = shim.allocate(usize::MAX);
            let _ = shim.allocate_raw_zeroed(usize::MAX, 2);
            let _ = shim.allocate(8);
            shim.lifecycle()
                .snapshot()
                .into_iter()
                .map(|r| r.failure)
                .collect::<Vec<_>>()
        };

        assert_eq!(at(LogLevel::Error), [Some(FailureKind::Exhausted)]);
        assert_eq!(
            at(LogLevel::Info),
            [
                Some(FailureKind::Oversized),
                Some(FailureKind::Overflow),
                Some(FailureKind::Exhausted),
            ]
        );
    }

    #[test]
    fn undersized_ring_drops_oldest_records() {
        let shim = MemoryShim::with_parts(
            SystemAllocator,
            DecliningTracker,
            ShimConfig {
                log_level: LogLevel::Debug,
                log_capacity: 2,
            },
        );
        for _ in 0..3 {
            // SAFETY: releasing nothing is always sound.
            unsafe { shim.release(None) };
        }
        assert_eq!(shim.lifecycle().len(), 2);
        assert_eq!(shim.lifecycle().dropped(), 1);
        assert_eq!(shim.stats().null_releases, 3);
    }

    #[test]
    fn default_shim_keeps_no_records() {
        let shim = MemoryShim::default();
        let handle = shim.allocate(8).expect("8 bytes");
        // SAFETY: handle came from this shim.
        unsafe { shim.release(Some(handle)) };
        assert!(shim.lifecycle().is_empty());
    }

    #[test]
    fn concurrent_callers_share_one_shim() {
        let shim = Arc::new(MemoryShim::new());
        let workers: Vec<_> = (0..4)
            .map(|t| {
                let shim = Arc::clone(&shim);
                std::thread::spawn(move || {
                    for i in 0..256usize {
                        let size = 1 + (i * 13 + t) % 512;
                        let mut handle = shim.allocate_raw(size).expect("in-range allocation");
                        fill(&mut handle, size);
                        // SAFETY: handle came from this shim.
                        let handle = unsafe { shim.reallocate_raw(Some(handle), size * 2) }
                            .expect("grow");
                        assert!(is_pattern(&handle, size));
                        // SAFETY: handle came from this shim.
                        unsafe { shim.release_raw(Some(handle)) };
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().expect("worker thread panicked");
        }
        let stats = shim.stats();
        assert_eq!(stats.allocations, 1024);
        assert_eq!(stats.reallocations, 1024);
        assert_eq!(stats.releases, 1024);
    }
}
