// All extern "C" exports accept raw pointers from C callers and forward them
// unchanged; the contracts are the C-API's own.
#![allow(clippy::missing_safety_doc)]
//! # pymem-abi
//!
//! `extern "C"` boundary for the `PyMem_*` allocation family.
//!
//! This crate produces a `cdylib` (`libpymem_abi.so`) exporting the allocation
//! entry points a C-API compatibility layer links against. Each symbol maps
//! a C call onto the process-wide [`MemoryShim`](pymem_core::MemoryShim) and
//! collapses any failure to a null pointer.
//!
//! ```text
//! C caller -> PyMem_* (this crate) -> MemoryShim -> libc malloc family
//! ```

mod shim_state;

pub mod pymem_abi;

pub use shim_state::global_shim;
