//! Wake guard: bounded sleep prevention around payload execution
//!
//! The trigger that wins the execution claim holds the guard while the
//! payload runs. The hold is generation-counted so redundant triggers racing
//! to fire never double-acquire or double-release, and a watchdog forces
//! release at a hard ceiling even if the payload is still running, so the
//! resource is never retained indefinitely.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::ports::WakeSource;

/// Wake guard tuning.
#[derive(Debug, Clone)]
pub struct WakeGuardConfig {
    /// Hard ceiling on how long the guard may stay held.
    pub hard_ceiling: Duration,
}

impl Default for WakeGuardConfig {
    fn default() -> Self {
        Self { hard_ceiling: Duration::from_millis(rewake_domain::constants::WAKE_GUARD_CEILING_MS) }
    }
}

struct GuardInner {
    source: Arc<dyn WakeSource>,
    // Generation of the current hold, 0 when not held. Generations make a
    // stale watchdog unable to release a newer acquisition.
    held_generation: AtomicU64,
    next_generation: AtomicU64,
    hard_ceiling: Duration,
}

/// Scoped, reference-checked wrapper around the host's sleep-prevention
/// primitive.
#[derive(Clone)]
pub struct WakeGuard {
    inner: Arc<GuardInner>,
}

impl WakeGuard {
    /// Create a guard over the given wake source.
    pub fn new(source: Arc<dyn WakeSource>, config: WakeGuardConfig) -> Self {
        Self {
            inner: Arc::new(GuardInner {
                source,
                held_generation: AtomicU64::new(0),
                next_generation: AtomicU64::new(0),
                hard_ceiling: config.hard_ceiling,
            }),
        }
    }

    /// Acquire the guard for the duration of one payload execution.
    ///
    /// Idempotent under races: if the guard is already held the returned
    /// handle is a non-owning no-op, so a redundant trigger can call this
    /// unconditionally. Must be called from within a tokio runtime (the
    /// ceiling watchdog is a spawned task).
    pub fn acquire(&self) -> WakeGuardHandle {
        let generation = self.inner.next_generation.fetch_add(1, Ordering::SeqCst) + 1;
        if self
            .inner
            .held_generation
            .compare_exchange(0, generation, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Wake guard already held; returning non-owning handle");
            return WakeGuardHandle { inner: self.inner.clone(), generation: 0 };
        }

        if let Err(err) = self.inner.source.acquire(self.inner.hard_ceiling) {
            // Losing the wake source is survivable; the triggers still run.
            warn!(error = %err, "Wake source acquire failed; continuing unguarded");
        } else {
            debug!(ceiling_secs = self.inner.hard_ceiling.as_secs(), "Wake guard acquired");
        }

        let inner = self.inner.clone();
        tokio::spawn(async move {
            tokio::time::sleep(inner.hard_ceiling).await;
            if release_generation(&inner, generation) {
                warn!(
                    ceiling_secs = inner.hard_ceiling.as_secs(),
                    "Wake guard hit its hard ceiling; forcing release"
                );
            }
        });

        WakeGuardHandle { inner: self.inner.clone(), generation }
    }

    /// Whether the guard is currently held.
    pub fn is_held(&self) -> bool {
        self.inner.held_generation.load(Ordering::SeqCst) != 0
    }

    /// Ask the host to stay awake ahead of an imminent trigger.
    pub fn keep_awake(&self, duration: Duration) {
        if let Err(err) = self.inner.source.keep_awake(duration) {
            warn!(error = %err, "Wake source keep-awake failed");
        }
    }
}

fn release_generation(inner: &GuardInner, generation: u64) -> bool {
    if generation == 0 {
        return false;
    }
    let released = inner
        .held_generation
        .compare_exchange(generation, 0, Ordering::SeqCst, Ordering::SeqCst)
        .is_ok();
    if released {
        if let Err(err) = inner.source.release() {
            warn!(error = %err, "Wake source release failed");
        }
    }
    released
}

/// Handle releasing the guard on every exit path, including drop.
pub struct WakeGuardHandle {
    inner: Arc<GuardInner>,
    // 0 marks a non-owning handle from a lost acquire race.
    generation: u64,
}

impl WakeGuardHandle {
    /// Whether this handle owns the hold.
    pub fn is_owner(&self) -> bool {
        self.generation != 0
    }

    /// Release explicitly. Equivalent to dropping the handle.
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if release_generation(&self.inner, self.generation) {
            debug!("Wake guard released");
        }
        self.generation = 0;
    }
}

impl Drop for WakeGuardHandle {
    fn drop(&mut self) {
        self.release_inner();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use rewake_domain::Result;

    use super::*;

    #[derive(Default)]
    struct CountingSource {
        acquires: AtomicUsize,
        releases: AtomicUsize,
    }

    impl WakeSource for CountingSource {
        fn acquire(&self, _timeout: Duration) -> Result<()> {
            self.acquires.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn release(&self) -> Result<()> {
            self.releases.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn guard_with(ceiling: Duration) -> (WakeGuard, Arc<CountingSource>) {
        let source = Arc::new(CountingSource::default());
        let guard =
            WakeGuard::new(source.clone(), WakeGuardConfig { hard_ceiling: ceiling });
        (guard, source)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn acquire_and_release_balance() {
        let (guard, source) = guard_with(Duration::from_secs(60));
        let handle = guard.acquire();
        assert!(handle.is_owner());
        assert!(guard.is_held());
        handle.release();
        assert!(!guard.is_held());
        assert_eq!(source.acquires.load(Ordering::SeqCst), 1);
        assert_eq!(source.releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn second_acquire_while_held_is_a_noop() {
        let (guard, source) = guard_with(Duration::from_secs(60));
        let first = guard.acquire();
        let second = guard.acquire();
        assert!(!second.is_owner());
        drop(second);
        assert!(guard.is_held(), "non-owning drop must not release");
        drop(first);
        assert!(!guard.is_held());
        assert_eq!(source.acquires.load(Ordering::SeqCst), 1);
        assert_eq!(source.releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn ceiling_forces_release_and_allows_reacquire() {
        let (guard, source) = guard_with(Duration::from_millis(50));
        let handle = guard.acquire();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!guard.is_held(), "watchdog must have released the hold");

        // The payload outliving the ceiling must not double-release.
        drop(handle);
        assert_eq!(source.releases.load(Ordering::SeqCst), 1);

        let again = guard.acquire();
        assert!(again.is_owner(), "guard must not be stuck held");
        drop(again);
        assert_eq!(source.releases.load(Ordering::SeqCst), 2);
    }
}
