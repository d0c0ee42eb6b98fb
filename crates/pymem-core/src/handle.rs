//! Owned reference to an allocated byte region.

#![allow(unsafe_code)]

use std::fmt;
use std::ptr::NonNull;

/// Opaque, non-null reference to a contiguous region obtained from a
/// [`RawAllocator`](crate::RawAllocator).
///
/// A `Handle` is the unique owner of its region: it is neither `Clone` nor
/// `Copy`, and the release/reallocate operations consume it. Dropping a
/// handle without releasing it leaks the region, exactly like losing a
/// pointer returned by `malloc`.
#[must_use = "dropping a Handle leaks its region; release it through the shim"]
pub struct Handle {
    ptr: NonNull<u8>,
}

// SAFETY: a Handle is the unique owner of a heap region; moving that ownership
// across threads is sound as long as the allocator itself is thread-safe, which
// RawAllocator requires (Send + Sync).
unsafe impl Send for Handle {}

impl Handle {
    /// Wraps a pointer freshly returned by an allocator.
    pub(crate) const fn from_non_null(ptr: NonNull<u8>) -> Self {
        Self { ptr }
    }

    /// Takes ownership of a raw pointer handed in across the C boundary.
    ///
    /// Returns `None` for null.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or a live pointer obtained from the same allocator the
    /// handle will be released through, and no other owner may release it.
    pub unsafe fn from_raw(ptr: *mut u8) -> Option<Self> {
        NonNull::new(ptr).map(Self::from_non_null)
    }

    /// Gives up ownership and returns the raw pointer.
    #[must_use]
    pub fn into_raw(self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    #[must_use]
    pub const fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    #[must_use]
    pub const fn as_non_null(&self) -> NonNull<u8> {
        self.ptr
    }

    /// Address of the region, for tracking hooks and diagnostics.
    #[must_use]
    pub fn addr(&self) -> usize {
        self.ptr.as_ptr().addr()
    }

    /// Views the first `len` bytes of the region.
    ///
    /// # Safety
    ///
    /// The region must be at least `len` bytes long and those bytes must have
    /// been initialized.
    #[must_use]
    pub unsafe fn as_slice(&self, len: usize) -> &[u8] {
        // SAFETY: caller guarantees `len` initialized bytes behind a live pointer.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), len) }
    }

    /// Mutable view of the first `len` bytes of the region.
    ///
    /// # Safety
    ///
    /// The region must be at least `len` bytes long. The bytes need not be
    /// initialized for writing, but must be before they are read.
    #[must_use]
    pub unsafe fn as_mut_slice(&mut self, len: usize) -> &mut [u8] {
        // SAFETY: caller guarantees `len` bytes behind a live, uniquely owned pointer.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), len) }
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({:p})", self.ptr)
    }
}

impl fmt::Pointer for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Pointer::fmt(&self.ptr, f)
    }
}
