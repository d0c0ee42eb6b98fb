//! Fault-injecting allocator wrapper.
//!
//! Wraps any [`RawAllocator`] and declines requests according to a
//! [`FaultPlan`], so exhaustion paths can be exercised deterministically.
//! Releases always pass through.

#![allow(unsafe_code)]

use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use crate::backend::RawAllocator;

/// When to decline a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultPlan {
    /// Forward everything.
    Never,
    /// Decline every request.
    Always,
    /// Serve the first `n` requests, decline the rest.
    AfterSuccesses(u64),
    /// Decline any request larger than the given byte count.
    AboveSize(usize),
}

/// Allocator wrapper that injects failures and records what it was asked for.
#[derive(Debug)]
pub struct FaultInjector<A> {
    inner: A,
    plan: FaultPlan,
    /// Requests seen (malloc, calloc and realloc).
    requests: AtomicU64,
    /// Requests declined by the plan.
    injected: AtomicU64,
    /// Releases forwarded to the inner allocator.
    frees: AtomicU64,
    /// Byte count of the most recent request, as received.
    last_request: AtomicUsize,
}

impl<A: RawAllocator> FaultInjector<A> {
    pub const fn new(inner: A, plan: FaultPlan) -> Self {
        Self {
            inner,
            plan,
            requests: AtomicU64::new(0),
            injected: AtomicU64::new(0),
            frees: AtomicU64::new(0),
            last_request: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub const fn plan(&self) -> FaultPlan {
        self.plan
    }

    #[must_use]
    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn injected_failures(&self) -> u64 {
        self.injected.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn frees(&self) -> u64 {
        self.frees.load(Ordering::Relaxed)
    }

    /// Size of the last request exactly as the shim passed it down.
    #[must_use]
    pub fn last_request(&self) -> usize {
        self.last_request.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn inner(&self) -> &A {
        &self.inner
    }

    /// Records a request and decides whether it is declined.
    fn admit(&self, size: usize) -> bool {
        let seen = self.requests.fetch_add(1, Ordering::Relaxed);
        self.last_request.store(size, Ordering::Relaxed);
        let declined = match self.plan {
            FaultPlan::Never => false,
            FaultPlan::Always => true,
            FaultPlan::AfterSuccesses(n) => seen >= n,
            FaultPlan::AboveSize(limit) => size > limit,
        };
        if declined {
            self.injected.fetch_add(1, Ordering::Relaxed);
        }
        !declined
    }
}

impl<A: RawAllocator> RawAllocator for FaultInjector<A> {
    fn name(&self) -> &'static str {
        "fault-injector"
    }

    fn malloc(&self, size: usize) -> Option<NonNull<u8>> {
        if !self.admit(size) {
            return None;
        }
        self.inner.malloc(size)
    }

    fn calloc(&self, count: usize, elem_size: usize) -> Option<NonNull<u8>> {
        if !self.admit(count.saturating_mul(elem_size)) {
            return None;
        }
        self.inner.calloc(count, elem_size)
    }

    unsafe fn realloc(&self, ptr: Option<NonNull<u8>>, new_size: usize) -> Option<NonNull<u8>> {
        if !self.admit(new_size) {
            return None;
        }
        // SAFETY: forwarded caller contract.
        unsafe { self.inner.realloc(ptr, new_size) }
    }

    unsafe fn free(&self, ptr: NonNull<u8>) {
        self.frees.fetch_add(1, Ordering::Relaxed);
        // SAFETY: forwarded caller contract.
        unsafe { self.inner.free(ptr) }
    }
}
