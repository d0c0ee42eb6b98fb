//! # pymem-core
//!
//! Allocation shim behind the `PyMem_*` C-API entry points.
//!
//! Every operation is a straight delegation to an injected [`RawAllocator`]
//! (the platform `malloc` family by default). The only policy layered on top
//! is the signed-size bound applied by the non-raw entry points. Failures are
//! values ([`AllocError`]), never panics or aborts; the `extern "C"` boundary
//! in `pymem-abi` collapses them back to null pointers.
//!
//! ```text
//! C caller -> PyMem_* (pymem-abi) -> MemoryShim -> RawAllocator -> libc
//! ```

#![deny(unsafe_code)]

pub mod backend;
pub mod config;
pub mod error;
pub mod fault;
pub mod handle;
pub mod lifecycle;
pub mod shim;
pub mod stats;
pub mod tracking;

pub use backend::{RawAllocator, SystemAllocator};
pub use config::{LogLevel, ShimConfig};
pub use error::{AllocError, FailureKind, ReallocError};
pub use fault::{FaultInjector, FaultPlan};
pub use handle::Handle;
pub use lifecycle::{LifecycleLog, LifecycleRecord};
pub use shim::{MAX_SIGNED_SIZE, MemoryShim};
pub use stats::{ShimStats, StatsSnapshot};
pub use tracking::{AllocationTracker, DecliningTracker, TraceDomain, TraceStatus};
