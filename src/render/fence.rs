//! Render fences.
//!
//! Every published batch gets a sequence number. The render context stores
//! the number of the last batch it applied; a fence for batch `n` is
//! complete once that counter reaches `n`.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Shared "last applied batch" counter.
#[derive(Debug, Clone, Default)]
pub struct FenceCounter(Arc<AtomicU64>);

impl FenceCounter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    #[must_use]
    pub fn completed(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }

    /// Called by the render context after applying batch `sequence`.
    #[inline]
    pub fn advance(&self, sequence: u64) {
        self.0.fetch_max(sequence, Ordering::Release);
    }
}

/// Completion marker for one published batch.
#[derive(Debug, Clone)]
pub struct RenderFence {
    sequence: u64,
    counter: FenceCounter,
}

impl RenderFence {
    pub(crate) fn new(sequence: u64, counter: FenceCounter) -> Self {
        Self { sequence, counter }
    }

    #[inline]
    #[must_use]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    #[inline]
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.counter.completed() >= self.sequence
    }
}
