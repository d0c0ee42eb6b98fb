//! Allocation failure taxonomy.

use thiserror::Error;

use crate::handle::Handle;

/// Why a request for storage could not be satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AllocError {
    /// The size bound rejected the request before the allocator was consulted.
    #[error("requested {requested} bytes exceeds the signed size limit of {limit}")]
    Oversized { requested: usize, limit: usize },
    /// `count * elem_size` does not fit in a `usize`.
    #[error("element count {count} times element size {elem_size} overflows")]
    Overflow { count: usize, elem_size: usize },
    /// The underlying allocator declined the request.
    #[error("allocator could not provide {requested} bytes")]
    Exhausted { requested: usize },
}

/// Fieldless classification of an [`AllocError`], used for counters and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Oversized,
    Overflow,
    Exhausted,
}

impl AllocError {
    #[must_use]
    pub const fn kind(&self) -> FailureKind {
        match self {
            Self::Oversized { .. } => FailureKind::Oversized,
            Self::Overflow { .. } => FailureKind::Overflow,
            Self::Exhausted { .. } => FailureKind::Exhausted,
        }
    }

    /// Bytes the caller asked for, when the request had a single size.
    #[must_use]
    pub const fn requested(&self) -> Option<usize> {
        match self {
            Self::Oversized { requested, .. } | Self::Exhausted { requested } => Some(*requested),
            Self::Overflow { .. } => None,
        }
    }
}

impl FailureKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Oversized => "oversized",
            Self::Overflow => "overflow",
            Self::Exhausted => "exhausted",
        }
    }
}

/// A failed reallocation.
///
/// The original handle is handed back untouched: it is still live and the
/// caller still owns releasing it. It is `None` only when the reallocation
/// was itself a fresh allocation.
#[derive(Debug, Error)]
#[error("reallocation failed: {source}")]
pub struct ReallocError {
    pub original: Option<Handle>,
    #[source]
    pub source: AllocError,
}

impl ReallocError {
    /// Splits the error into the still-live original handle and the cause.
    #[must_use]
    pub fn into_parts(self) -> (Option<Handle>, AllocError) {
        (self.original, self.source)
    }
}
