//! Build generation stamps.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic stamp assigned to every build when it starts.
///
/// A build identifier's context records the generation of the build that
/// currently owns it. Every continuation carries the generation it was
/// started with, and the engine compares the two before applying a
/// transition: a mismatch means a newer build has superseded this one and
/// the continuation is dropped. This comparison is the only cancellation
/// signal the engine uses.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct BuildGeneration(u64);

impl BuildGeneration {
    /// Wraps a raw generation value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// Returns true if a continuation stamped `self` may still act on a
    /// context currently owned by `owner`.
    #[must_use]
    pub fn is_current_for(self, owner: Self) -> bool {
        self == owner
    }

    /// Returns true if `self` was issued after `other`.
    #[must_use]
    pub fn supersedes(self, other: Self) -> bool {
        self > other
    }
}

impl fmt::Display for BuildGeneration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Issues strictly increasing generations.
#[derive(Debug, Default)]
pub(crate) struct GenerationCounter {
    last: AtomicU64,
}

impl GenerationCounter {
    pub(crate) fn next(&self) -> BuildGeneration {
        BuildGeneration(self.last.fetch_add(1, Ordering::SeqCst) + 1)
    }
}
