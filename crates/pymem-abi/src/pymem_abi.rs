//! ABI layer for the `PyMem_*` allocation family and the `PyTraceMalloc_*`
//! tracking hooks.
//!
//! Every symbol forwards to the process-wide shim. Failures never abort or
//! set an error indicator: they surface as a null pointer, and the caller is
//! expected to check it.

#![allow(non_snake_case)]

use std::ffi::{c_int, c_uint, c_void};

use libc::{size_t, uintptr_t};
use pymem_core::{Handle, StatsSnapshot, TraceDomain};

use crate::shim_state::global_shim;

#[inline]
fn into_c(result: Result<Handle, impl Sized>) -> *mut c_void {
    match result {
        Ok(handle) => handle.into_raw().cast(),
        Err(_) => std::ptr::null_mut(),
    }
}

#[inline]
unsafe fn from_c(ptr: *mut c_void) -> Option<Handle> {
    // SAFETY: caller passes null or a live pointer from this allocator family.
    unsafe { Handle::from_raw(ptr.cast()) }
}

// ---------------------------------------------------------------------------
// Guarded family
// ---------------------------------------------------------------------------

/// `PyMem_Malloc` -- allocates `size` bytes, refusing sizes above `PY_SSIZE_T_MAX`.
///
/// Returns null when the request is oversized or cannot be satisfied.
///
/// # Safety
///
/// Caller must eventually release the returned pointer exactly once.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn PyMem_Malloc(size: size_t) -> *mut c_void {
    into_c(global_shim().allocate(size))
}

/// `PyMem_Calloc` -- allocates `nelem * elsize` zeroed bytes, refusing
/// overflowing products and totals above `PY_SSIZE_T_MAX`.
///
/// # Safety
///
/// Caller must eventually release the returned pointer exactly once.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn PyMem_Calloc(nelem: size_t, elsize: size_t) -> *mut c_void {
    into_c(global_shim().allocate_zeroed(nelem, elsize))
}

/// `PyMem_Realloc` -- resizes `ptr` to `new_size` bytes, refusing sizes above
/// `PY_SSIZE_T_MAX`.
///
/// On failure returns null and `ptr` stays valid.
///
/// # Safety
///
/// `ptr` must be null or a live pointer from this allocator family.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn PyMem_Realloc(ptr: *mut c_void, new_size: size_t) -> *mut c_void {
    // SAFETY: caller contract.
    let handle = unsafe { from_c(ptr) };
    // SAFETY: caller contract; the handle wraps a pointer from the same allocator.
    match unsafe { global_shim().reallocate(handle, new_size) } {
        Ok(handle) => handle.into_raw().cast(),
        Err(err) => {
            // The caller still owns the original pointer.
            let _ = err.original.map(Handle::into_raw);
            std::ptr::null_mut()
        }
    }
}

/// `PyMem_Free` -- releases `ptr`. Null is a no-op.
///
/// # Safety
///
/// `ptr` must be null or a live pointer from this allocator family, not
/// already released.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn PyMem_Free(ptr: *mut c_void) {
    // SAFETY: caller contract.
    unsafe { global_shim().release(from_c(ptr)) }
}

// ---------------------------------------------------------------------------
// Raw family
// ---------------------------------------------------------------------------

/// `PyMem_RawMalloc` -- allocates `size` bytes with no bound check.
///
/// # Safety
///
/// Caller must eventually release the returned pointer exactly once.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn PyMem_RawMalloc(size: size_t) -> *mut c_void {
    into_c(global_shim().allocate_raw(size))
}

/// `PyMem_RawCalloc` -- allocates `nelem * elsize` zeroed bytes.
///
/// Returns null if the product overflows or allocation fails.
///
/// # Safety
///
/// Caller must eventually release the returned pointer exactly once.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn PyMem_RawCalloc(nelem: size_t, elsize: size_t) -> *mut c_void {
    into_c(global_shim().allocate_raw_zeroed(nelem, elsize))
}

/// `PyMem_RawRealloc` -- resizes `ptr` to `new_size` bytes.
///
/// - If `ptr` is null, behaves like `PyMem_RawMalloc(new_size)`.
/// - On failure returns null and `ptr` stays valid; the caller must still free it.
///
/// # Safety
///
/// `ptr` must be null or a live pointer from this allocator family.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn PyMem_RawRealloc(ptr: *mut c_void, new_size: size_t) -> *mut c_void {
    // SAFETY: caller contract.
    let handle = unsafe { from_c(ptr) };
    // SAFETY: caller contract; the handle wraps a pointer from the same allocator.
    match unsafe { global_shim().reallocate_raw(handle, new_size) } {
        Ok(handle) => handle.into_raw().cast(),
        Err(err) => {
            let _ = err.original.map(Handle::into_raw);
            std::ptr::null_mut()
        }
    }
}

/// `PyMem_RawFree` -- releases `ptr`. Null is a no-op.
///
/// # Safety
///
/// `ptr` must be null or a live pointer from this allocator family, not
/// already released.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn PyMem_RawFree(ptr: *mut c_void) {
    // SAFETY: caller contract.
    unsafe { global_shim().release_raw(from_c(ptr)) }
}

// ---------------------------------------------------------------------------
// Tracking hooks
// ---------------------------------------------------------------------------

/// `PyTraceMalloc_Track` -- always declines with `-2`; allocations are not traced.
#[unsafe(no_mangle)]
pub extern "C" fn PyTraceMalloc_Track(domain: c_uint, ptr: uintptr_t, size: size_t) -> c_int {
    global_shim()
        .track_allocation(TraceDomain(domain), ptr, size)
        .as_c_int()
}

/// `PyTraceMalloc_Untrack` -- always declines with `-2`.
#[unsafe(no_mangle)]
pub extern "C" fn PyTraceMalloc_Untrack(domain: c_uint, ptr: uintptr_t) -> c_int {
    global_shim()
        .untrack_allocation(TraceDomain(domain), ptr)
        .as_c_int()
}

// ---------------------------------------------------------------------------
// Diagnostics
// ---------------------------------------------------------------------------

/// C view of the shim's call counters.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PyMemShimStats {
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

impl From<StatsSnapshot> for PyMemShimStats {
    fn from(s: StatsSnapshot) -> Self {
        Self {
            allocations: s.allocations,
            zeroed_allocations: s.zeroed_allocations,
            reallocations: s.reallocations,
            releases: s.releases,
            null_releases: s.null_releases,
            oversized_rejections: s.oversized_rejections,
            overflow_rejections: s.overflow_rejections,
            exhaustion_failures: s.exhaustion_failures,
            declined_tracks: s.declined_tracks,
        }
    }
}

/// Copies the process-wide counters into `*out`.
///
/// Returns 0 on success, -1 if `out` is null.
///
/// # Safety
///
/// `out` must be null or valid for writing one `PyMemShimStats`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pymem_shim_stats(out: *mut PyMemShimStats) -> c_int {
    if out.is_null() {
        return -1;
    }
    // SAFETY: caller guarantees `out` points to writable storage.
    unsafe { out.write(global_shim().stats().into()) };
    0
}
