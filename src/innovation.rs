//! Run-wide innovation tracking.
//!
//! Every newly created link claims the next value of a single counter shared
//! by the whole population. The counter is the only mutable state shared
//! between individuals, so it is an atomic that parallel mutation tasks bump
//! without further coordination. Values are unique at creation time and only
//! ever used to align homologous links during crossover.

use std::sync::atomic::{AtomicU32, Ordering};

/// Atomically incremented source of innovation numbers.
#[derive(Debug, Default)]
pub struct InnovationCounter {
    next: AtomicU32,
}

impl InnovationCounter {
    /// Create a counter for a fresh run.
    #[must_use]
    pub const fn new() -> Self {
        Self::starting_at(0)
    }

    /// Create a counter whose first claimed value is `value`.
    #[must_use]
    pub const fn starting_at(value: u32) -> Self {
        Self {
            next: AtomicU32::new(value),
        }
    }

    /// Claim the next innovation number.
    #[inline]
    pub fn claim(&self) -> u32 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    /// The value the next [`claim`](Self::claim) will return.
    ///
    /// Every innovation handed out so far is strictly below this value.
    #[inline]
    #[must_use]
    pub fn peek(&self) -> u32 {
        self.next.load(Ordering::Relaxed)
    }

    /// Make sure future claims are strictly greater than `innovation`.
    pub fn advance_past(&self, innovation: u32) {
        self.next
            .fetch_max(innovation.saturating_add(1), Ordering::Relaxed);
    }

    /// Start over for a new run.
    pub fn reset(&self) {
        self.next.store(0, Ordering::Relaxed);
    }
}

impl Clone for InnovationCounter {
    fn clone(&self) -> Self {
        Self::starting_at(self.peek())
    }
}
