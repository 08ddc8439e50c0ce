//! Request versioning for stale-result suppression.
//!
//! Every user-driven action that changes what should be displayed bumps a
//! monotonically increasing counter. Asynchronous continuations capture the
//! counter at submission time and compare against the live value before any
//! externally observable presentation side effect. A captured value that no
//! longer matches is stale, no matter how far the counter has advanced.

use std::sync::atomic::{AtomicU64, Ordering};

/// A captured generation value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Generation(u64);

/// Monotonically increasing generation counter.
#[derive(Debug, Default)]
pub struct GenerationCounter {
    current: AtomicU64,
}

impl GenerationCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture the current generation without advancing it.
    pub fn capture(&self) -> Generation {
        Generation(self.current.load(Ordering::SeqCst))
    }

    /// Advance the counter and return the new generation.
    pub fn bump(&self) -> Generation {
        Generation(self.current.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Whether a captured generation has been superseded by a later bump.
    pub fn is_stale(&self, captured: Generation) -> bool {
        self.current.load(Ordering::SeqCst) != captured.0
    }

    /// Whether a captured generation still matches the live counter.
    pub fn is_current(&self, captured: Generation) -> bool {
        !self.is_stale(captured)
    }
}
