//! Allocator capability.
//!
//! The shim never calls a global allocator directly: it is generic over a
//! [`RawAllocator`], so embedders and tests can substitute a fault-injecting
//! or instrumented allocator. [`SystemAllocator`] is the production choice and
//! delegates to the platform `malloc` family.

#![allow(unsafe_code)]

use std::ffi::c_void;
use std::ptr::NonNull;
use std::sync::Arc;

/// A general-purpose byte allocator with C `malloc` semantics.
///
/// Implementations must be safe to call concurrently from any thread.
/// Every successful result must be aligned for any fundamental type.
pub trait RawAllocator: Send + Sync {
    /// Short identifier used in logs and reports.
    fn name(&self) -> &'static str;

    /// Allocates at least `size` uninitialized bytes.
    fn malloc(&self, size: usize) -> Option<NonNull<u8>>;

    /// Allocates `count * elem_size` zeroed bytes.
    ///
    /// Implementations must fail rather than wrap when the product overflows.
    fn calloc(&self, count: usize, elem_size: usize) -> Option<NonNull<u8>>;

    /// Resizes `ptr` to at least `new_size` bytes, preserving contents up to the
    /// smaller of the old and new sizes. `None` behaves as [`malloc`](Self::malloc).
    ///
    /// On failure `ptr` must remain live and unchanged.
    ///
    /// # Safety
    ///
    /// `ptr` must be `None` or a live pointer previously returned by this
    /// allocator. On success the old pointer must no longer be used.
    unsafe fn realloc(&self, ptr: Option<NonNull<u8>>, new_size: usize) -> Option<NonNull<u8>>;

    /// Returns `ptr` to the allocator.
    ///
    /// # Safety
    ///
    /// `ptr` must be a live pointer previously returned by this allocator and
    /// must not be used afterwards.
    unsafe fn free(&self, ptr: NonNull<u8>);
}

impl<A: RawAllocator + ?Sized> RawAllocator for &A {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn malloc(&self, size: usize) -> Option<NonNull<u8>> {
        (**self).malloc(size)
    }

    fn calloc(&self, count: usize, elem_size: usize) -> Option<NonNull<u8>> {
        (**self).calloc(count, elem_size)
    }

    unsafe fn realloc(&self, ptr: Option<NonNull<u8>>, new_size: usize) -> Option<NonNull<u8>> {
        // SAFETY: forwarded caller contract.
        unsafe { (**self).realloc(ptr, new_size) }
    }

    unsafe fn free(&self, ptr: NonNull<u8>) {
        // SAFETY: forwarded caller contract.
        unsafe { (**self).free(ptr) }
    }
}

impl<A: RawAllocator + ?Sized> RawAllocator for Arc<A> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn malloc(&self, size: usize) -> Option<NonNull<u8>> {
        (**self).malloc(size)
    }

    fn calloc(&self, count: usize, elem_size: usize) -> Option<NonNull<u8>> {
        (**self).calloc(count, elem_size)
    }

    unsafe fn realloc(&self, ptr: Option<NonNull<u8>>, new_size: usize) -> Option<NonNull<u8>> {
        // SAFETY: forwarded caller contract.
        unsafe { (**self).realloc(ptr, new_size) }
    }

    unsafe fn free(&self, ptr: NonNull<u8>) {
        // SAFETY: forwarded caller contract.
        unsafe { (**self).free(ptr) }
    }
}

// ---------------------------------------------------------------------------
// SystemAllocator
// ---------------------------------------------------------------------------

/// The platform C allocator (`malloc`, `calloc`, `realloc`, `free`).
///
/// Zero-byte requests are served as one byte, so a successful call never
/// yields null and `realloc(p, 0)` never frees `p` behind the caller's back.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SystemAllocator;

impl RawAllocator for SystemAllocator {
    fn name(&self) -> &'static str {
        "system"
    }

    fn malloc(&self, size: usize) -> Option<NonNull<u8>> {
        // SAFETY: libc malloc accepts any size and returns null on failure.
        let raw = unsafe { libc::malloc(size.max(1)) };
        NonNull::new(raw.cast())
    }

    fn calloc(&self, count: usize, elem_size: usize) -> Option<NonNull<u8>> {
        let (count, elem_size) = if count == 0 || elem_size == 0 {
            (1, 1)
        } else {
            (count, elem_size)
        };
        // SAFETY: libc calloc checks the product for overflow and returns null.
        let raw = unsafe { libc::calloc(count, elem_size) };
        NonNull::new(raw.cast())
    }

    unsafe fn realloc(&self, ptr: Option<NonNull<u8>>, new_size: usize) -> Option<NonNull<u8>> {
        let old: *mut c_void = ptr.map_or(std::ptr::null_mut(), |p| p.as_ptr().cast());
        // SAFETY: caller guarantees `old` is null or live from this allocator. The
        // size is at least one byte, so libc never takes the free-on-zero path.
        let raw = unsafe { libc::realloc(old, new_size.max(1)) };
        NonNull::new(raw.cast())
    }

    unsafe fn free(&self, ptr: NonNull<u8>) {
        // SAFETY: caller guarantees `ptr` is live and from this allocator.
        unsafe { libc::free(ptr.as_ptr().cast()) }
    }
}
