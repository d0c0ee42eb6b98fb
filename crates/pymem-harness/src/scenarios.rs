//! Allocation contracts as named, runnable scenarios.
//!
//! Each scenario builds its own shim (system allocator, optionally wrapped in
//! a [`FaultInjector`]) so scenarios are independent of each other and of the
//! process-wide shim exported by `pymem-abi`.

#![allow(unsafe_code)]

use pymem_core::{
    AllocError, FailureKind, FaultInjector, FaultPlan, Handle, MAX_SIGNED_SIZE, MemoryShim,
    SystemAllocator, TraceDomain, TraceStatus,
};
use thiserror::Error;

/// Why a scenario failed.
#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("{0}")]
    Mismatch(String),
    #[error("unexpected allocation failure: {0}")]
    Alloc(#[from] AllocError),
}

pub type CheckResult = Result<(), ScenarioError>;

/// One named contract check.
#[derive(Debug, Clone, Copy)]
pub struct Scenario {
    pub name: &'static str,
    /// Shim operation the scenario exercises.
    pub symbol: &'static str,
    /// One-line statement of the checked property.
    pub property: &'static str,
    pub run: fn() -> CheckResult,
}

macro_rules! ensure {
    ($cond:expr, $($msg:tt)+) => {
        if !$cond {
            return Err(ScenarioError::Mismatch(format!($($msg)+)));
        }
    };
}

/// Every scenario, in execution order.
#[must_use]
pub fn all_scenarios() -> Vec<Scenario> {
    vec![
        Scenario {
            name: "allocate_serves_in_range_sizes",
            symbol: "allocate",
            property: "in-range sizes yield writable regions of at least the requested size",
            run: allocate_serves_in_range_sizes,
        },
        Scenario {
            name: "allocate_rejects_above_signed_max",
            symbol: "allocate",
            property: "sizes above the signed maximum fail without consulting the allocator",
            run: allocate_rejects_above_signed_max,
        },
        Scenario {
            name: "allocate_reports_exhaustion",
            symbol: "allocate",
            property: "allocator exhaustion surfaces as an error value",
            run: allocate_reports_exhaustion,
        },
        Scenario {
            name: "allocate_raw_passes_max_through",
            symbol: "allocate_raw",
            property: "the raw path hands usize::MAX to the allocator unmodified",
            run: allocate_raw_passes_max_through,
        },
        Scenario {
            name: "allocate_raw_zeroed_ten_by_four",
            symbol: "allocate_raw_zeroed",
            property: "10 x 4 yields 40 zero bytes",
            run: allocate_raw_zeroed_ten_by_four,
        },
        Scenario {
            name: "allocate_raw_zeroed_overflow",
            symbol: "allocate_raw_zeroed",
            property: "an overflowing element product fails before allocation",
            run: allocate_raw_zeroed_overflow,
        },
        Scenario {
            name: "allocate_zeroed_applies_signed_bound",
            symbol: "allocate_zeroed",
            property: "the guarded zeroed path rejects totals above the signed maximum",
            run: allocate_zeroed_applies_signed_bound,
        },
        Scenario {
            name: "reallocate_raw_grow_preserves",
            symbol: "reallocate_raw",
            property: "growing keeps the original bytes in the low-order region",
            run: reallocate_raw_grow_preserves,
        },
        Scenario {
            name: "reallocate_raw_shrink_preserves",
            symbol: "reallocate_raw",
            property: "shrinking keeps the first new_size bytes",
            run: reallocate_raw_shrink_preserves,
        },
        Scenario {
            name: "reallocate_raw_none_allocates",
            symbol: "reallocate_raw",
            property: "reallocating nothing behaves as a raw allocation",
            run: reallocate_raw_none_allocates,
        },
        Scenario {
            name: "reallocate_raw_failure_keeps_original",
            symbol: "reallocate_raw",
            property: "a failed reallocation hands back the original handle intact",
            run: reallocate_raw_failure_keeps_original,
        },
        Scenario {
            name: "reallocate_applies_signed_bound",
            symbol: "reallocate",
            property: "the guarded reallocation rejects oversized requests and keeps the original",
            run: reallocate_applies_signed_bound,
        },
        Scenario {
            name: "release_none_is_noop",
            symbol: "release",
            property: "releasing nothing leaves live handles untouched",
            run: release_none_is_noop,
        },
        Scenario {
            name: "track_allocation_declines",
            symbol: "track_allocation",
            property: "tracking declines for every input",
            run: track_allocation_declines,
        },
    ]
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn injected(plan: FaultPlan) -> MemoryShim<FaultInjector<SystemAllocator>> {
    MemoryShim::with_allocator(FaultInjector::new(SystemAllocator, plan))
}

fn fill(handle: &mut Handle, len: usize) {
    // SAFETY: scenarios only fill regions they allocated with at least `len` bytes.
    for (i, b) in unsafe { handle.as_mut_slice(len) }.iter_mut().enumerate() {
        *b = (i % 253) as u8;
    }
}

fn has_pattern(handle: &Handle, len: usize) -> bool {
    // SAFETY: callers only check lengths they filled.
    unsafe { handle.as_slice(len) }
        .iter()
        .enumerate()
        .all(|(i, b)| *b == (i % 253) as u8)
}

fn all_zero(handle: &Handle, len: usize) -> bool {
    // SAFETY: zeroed allocations initialize `len` bytes.
    unsafe { handle.as_slice(len) }.iter().all(|b| *b == 0)
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

fn allocate_serves_in_range_sizes() -> CheckResult {
    let shim = MemoryShim::new();
    for size in [0usize, 1, 15, 256, 4096, 1 << 20] {
        let mut handle = shim.allocate(size)?;
        let misaligned = handle.addr() % std::mem::align_of::<usize>() != 0;
        fill(&mut handle, size);
        let intact = has_pattern(&handle, size);
        // SAFETY: handle came from this shim.
        unsafe { shim.release(Some(handle)) };
        ensure!(!misaligned, "allocate({size}) returned a misaligned region");
        ensure!(intact, "allocate({size}) region did not hold its contents");
    }
    Ok(())
}

fn allocate_rejects_above_signed_max() -> CheckResult {
    let shim = injected(FaultPlan::Never);
    for size in [usize::MAX, MAX_SIGNED_SIZE + 1] {
        match shim.allocate(size) {
            Err(AllocError::Oversized { requested, limit }) => {
                ensure!(requested == size, "rejection reported {requested}, asked {size}");
                ensure!(limit == MAX_SIGNED_SIZE, "rejection limit was {limit}");
            }
            Err(other) => return Err(ScenarioError::Mismatch(format!("allocate({size}): {other}"))),
            Ok(handle) => {
                // SAFETY: handle came from this shim.
                unsafe { shim.release(Some(handle)) };
                return Err(ScenarioError::Mismatch(format!("allocate({size}) succeeded")));
            }
        }
    }
    let requests = shim.allocator().requests();
    ensure!(requests == 0, "allocator saw {requests} requests");
    Ok(())
}

fn allocate_reports_exhaustion() -> CheckResult {
    let shim = injected(FaultPlan::Always);
    match shim.allocate(64) {
        Err(AllocError::Exhausted { requested: 64 }) => Ok(()),
        Err(other) => Err(ScenarioError::Mismatch(format!("wrong failure: {other}"))),
        Ok(handle) => {
            // SAFETY: handle came from this shim.
            unsafe { shim.release(Some(handle)) };
            Err(ScenarioError::Mismatch("allocation succeeded".into()))
        }
    }
}

fn allocate_raw_passes_max_through() -> CheckResult {
    let shim = injected(FaultPlan::Never);
    if let Ok(handle) = shim.allocate_raw(usize::MAX) {
        // SAFETY: handle came from this shim.
        unsafe { shim.release_raw(Some(handle)) };
    }
    let seen = shim.allocator().last_request();
    ensure!(shim.allocator().requests() == 1, "allocator was not consulted");
    ensure!(seen == usize::MAX, "allocator saw {seen}, not usize::MAX");
    let oversized = shim.stats().oversized_rejections;
    ensure!(oversized == 0, "raw path applied the signed bound");
    Ok(())
}

fn allocate_raw_zeroed_ten_by_four() -> CheckResult {
    let shim = MemoryShim::new();
    let handle = shim.allocate_raw_zeroed(10, 4)?;
    let zero = all_zero(&handle, 40);
    // SAFETY: handle came from this shim.
    unsafe { shim.release_raw(Some(handle)) };
    ensure!(zero, "40-byte zeroed region had a non-zero byte");
    Ok(())
}

fn allocate_raw_zeroed_overflow() -> CheckResult {
    let shim = injected(FaultPlan::Never);
    let result = shim.allocate_raw_zeroed(usize::MAX / 2 + 1, 2);
    match result {
        Err(err) if err.kind() == FailureKind::Overflow => {}
        Err(other) => return Err(ScenarioError::Mismatch(format!("wrong failure: {other}"))),
        Ok(handle) => {
            // SAFETY: handle came from this shim.
            unsafe { shim.release_raw(Some(handle)) };
            return Err(ScenarioError::Mismatch("overflowing product succeeded".into()));
        }
    }
    ensure!(shim.allocator().requests() == 0, "allocator was consulted");
    Ok(())
}

fn allocate_zeroed_applies_signed_bound() -> CheckResult {
    let shim = injected(FaultPlan::Never);
    match shim.allocate_zeroed(MAX_SIGNED_SIZE / 4 + 1, 4) {
        Err(err) if err.kind() == FailureKind::Oversized => {}
        Err(other) => return Err(ScenarioError::Mismatch(format!("wrong failure: {other}"))),
        Ok(handle) => {
            // SAFETY: handle came from this shim.
            unsafe { shim.release(Some(handle)) };
            return Err(ScenarioError::Mismatch("oversized total succeeded".into()));
        }
    }
    let handle = shim.allocate_zeroed(32, 2)?;
    let zero = all_zero(&handle, 64);
    // SAFETY: handle came from this shim.
    unsafe { shim.release(Some(handle)) };
    ensure!(zero, "guarded zeroed region had a non-zero byte");
    Ok(())
}

fn reallocate_raw_grow_preserves() -> CheckResult {
    let shim = MemoryShim::new();
    let mut handle = shim.allocate_raw(100)?;
    fill(&mut handle, 100);
    // SAFETY: handle came from this shim.
    let grown = unsafe { shim.reallocate_raw(Some(handle), 1 << 16) }.map_err(|e| {
        // SAFETY: the original is still live and came from this shim.
        unsafe { shim.release_raw(e.original) };
        ScenarioError::Alloc(e.source)
    })?;
    let intact = has_pattern(&grown, 100);
    // SAFETY: handle came from this shim.
    unsafe { shim.release_raw(Some(grown)) };
    ensure!(intact, "grown region lost its low-order bytes");
    Ok(())
}

fn reallocate_raw_shrink_preserves() -> CheckResult {
    let shim = MemoryShim::new();
    let mut handle = shim.allocate_raw(4096)?;
    fill(&mut handle, 4096);
    // SAFETY: handle came from this shim.
    let shrunk = unsafe { shim.reallocate_raw(Some(handle), 10) }.map_err(|e| {
        // SAFETY: the original is still live and came from this shim.
        unsafe { shim.release_raw(e.original) };
        ScenarioError::Alloc(e.source)
    })?;
    let intact = has_pattern(&shrunk, 10);
    // SAFETY: handle came from this shim.
    unsafe { shim.release_raw(Some(shrunk)) };
    ensure!(intact, "shrunk region lost its prefix");
    Ok(())
}

fn reallocate_raw_none_allocates() -> CheckResult {
    let shim = MemoryShim::new();
    // SAFETY: None is always valid.
    let mut handle = unsafe { shim.reallocate_raw(None, 77) }.map_err(|e| e.source)?;
    fill(&mut handle, 77);
    let intact = has_pattern(&handle, 77);
    // SAFETY: handle came from this shim.
    unsafe { shim.release_raw(Some(handle)) };
    ensure!(intact, "fresh region did not hold its contents");
    Ok(())
}

fn reallocate_raw_failure_keeps_original() -> CheckResult {
    let shim = injected(FaultPlan::AfterSuccesses(1));
    let mut handle = shim.allocate_raw(64)?;
    fill(&mut handle, 64);
    let addr = handle.addr();
    // SAFETY: handle came from this shim.
    match unsafe { shim.reallocate_raw(Some(handle), 1 << 20) } {
        Ok(moved) => {
            // SAFETY: handle came from this shim.
            unsafe { shim.release_raw(Some(moved)) };
            Err(ScenarioError::Mismatch("injected failure was not reported".into()))
        }
        Err(err) => {
            let (original, _) = err.into_parts();
            let Some(original) = original else {
                return Err(ScenarioError::Mismatch("original handle was not returned".into()));
            };
            let same = original.addr() == addr;
            let intact = has_pattern(&original, 64);
            // SAFETY: the original is still live and came from this shim.
            unsafe { shim.release_raw(Some(original)) };
            ensure!(same, "original handle moved");
            ensure!(intact, "original contents changed");
            Ok(())
        }
    }
}

fn reallocate_applies_signed_bound() -> CheckResult {
    let shim = injected(FaultPlan::Never);
    let mut handle = shim.allocate(16)?;
    fill(&mut handle, 16);
    // SAFETY: handle came from this shim.
    match unsafe { shim.reallocate(Some(handle), usize::MAX) } {
        Ok(moved) => {
            // SAFETY: handle came from this shim.
            unsafe { shim.release(Some(moved)) };
            Err(ScenarioError::Mismatch("oversized reallocation succeeded".into()))
        }
        Err(err) => {
            let kind = err.source.kind();
            let intact = err.original.as_ref().is_some_and(|h| has_pattern(h, 16));
            // SAFETY: the original is still live and came from this shim.
            unsafe { shim.release(err.original) };
            ensure!(kind == FailureKind::Oversized, "wrong failure kind {kind:?}");
            ensure!(intact, "original handle lost or changed");
            let requests = shim.allocator().requests();
            ensure!(requests == 1, "allocator saw {requests} requests");
            Ok(())
        }
    }
}

fn release_none_is_noop() -> CheckResult {
    let shim = injected(FaultPlan::Never);
    let mut live = shim.allocate(40)?;
    fill(&mut live, 40);
    // SAFETY: None is always valid.
    unsafe {
        shim.release(None);
        shim.release_raw(None);
    }
    let intact = has_pattern(&live, 40);
    let frees = shim.allocator().frees();
    // SAFETY: handle came from this shim.
    unsafe { shim.release(Some(live)) };
    ensure!(intact, "live handle changed");
    ensure!(frees == 0, "null release reached the allocator");
    Ok(())
}

fn track_allocation_declines() -> CheckResult {
    let shim = MemoryShim::new();
    let inputs = [
        (TraceDomain(0), 0usize, 0usize),
        (TraceDomain(0), 0x1000, 0),
        (TraceDomain(3), 0xdead_beef, 128),
        (TraceDomain(u32::MAX), usize::MAX, usize::MAX),
    ];
    for (domain, address, size) in inputs {
        let status = shim.track_allocation(domain, address, size);
        ensure!(
            status == TraceStatus::Declined,
            "track({domain:?}, {address:#x}, {size}) returned {status:?}"
        );
        ensure!(status.as_c_int() == -2, "decline code was {}", status.as_c_int());
    }
    Ok(())
}
