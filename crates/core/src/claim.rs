//! Exactly-once execution claim
//!
//! Several triggers race to execute the same logical occurrence; the claim
//! is the single atomic flag that decides the winner. Losing the race is
//! expected and silent, never an error.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Single-writer flag guaranteeing at-most-one execution per occurrence.
///
/// Initialized pending; exactly one caller observes the pending→claimed
/// transition. Cloning shares the underlying flag.
#[derive(Debug, Clone, Default)]
pub struct ExecutionClaim {
    claimed: Arc<AtomicBool>,
}

impl ExecutionClaim {
    /// Create a fresh, unclaimed flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempt the pending→claimed transition.
    ///
    /// Returns true for exactly one caller across all clones; every other
    /// caller, concurrent or later, gets false.
    pub fn try_claim(&self) -> bool {
        self.claimed.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_ok()
    }

    /// Whether the claim has been taken.
    pub fn is_claimed(&self) -> bool {
        self.claimed.load(Ordering::SeqCst)
    }
}
