//! Clock trigger backend over a host wake timer

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rewake_core::{BackendError, FireCallback, TriggerBackend, TriggerHandle};
use rewake_domain::BackendKind;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Host primitive for waking the process at an absolute instant.
///
/// Real hosts back this with an OS alarm or wake timer that survives deep
/// sleep. Arming must be quick and non-blocking; the callback is invoked
/// from whatever context the host wakes.
pub trait WakeTimer: Send + Sync {
    /// Arm a one-shot wake at `fire_at`, cancellable through `token`.
    fn arm(
        &self,
        fire_at: DateTime<Utc>,
        token: CancellationToken,
        on_fire: FireCallback,
    ) -> Result<(), BackendError>;
}

/// Wake timer backed by a plain runtime timer.
///
/// Cannot wake the process from sleep; stands in for the real host timer
/// in tests and on platforms without one.
#[derive(Debug, Default, Clone, Copy)]
pub struct InProcessWakeTimer;

impl WakeTimer for InProcessWakeTimer {
    fn arm(
        &self,
        fire_at: DateTime<Utc>,
        token: CancellationToken,
        on_fire: FireCallback,
    ) -> Result<(), BackendError> {
        let delay = (fire_at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    on_fire().await;
                }
            }
        });
        Ok(())
    }
}

/// The most durable trigger backend: an absolute-time host wake timer.
///
/// Hosts may refuse the exact-wake capability (permission models on mobile
/// platforms do). Refusal degrades this backend to an in-process timer for
/// the life of the process; the degradation is logged once, not per arm.
pub struct ClockBackend {
    timer: Arc<dyn WakeTimer>,
    degraded: AtomicBool,
}

impl ClockBackend {
    pub fn new(timer: Arc<dyn WakeTimer>) -> Self {
        Self { timer, degraded: AtomicBool::new(false) }
    }

    /// True once the host has denied the exact-wake capability.
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Relaxed)
    }

    fn arm_in_process(&self, fire_at: DateTime<Utc>, token: CancellationToken, on_fire: FireCallback) {
        let delay = (fire_at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    on_fire().await;
                }
            }
        });
    }
}

#[async_trait]
impl TriggerBackend for ClockBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Clock
    }

    async fn schedule(
        &self,
        fire_at: DateTime<Utc>,
        on_fire: FireCallback,
    ) -> Result<TriggerHandle, BackendError> {
        let handle = TriggerHandle::new(BackendKind::Clock);
        let token = handle.token().clone();

        if self.is_degraded() {
            self.arm_in_process(fire_at, token, on_fire);
            return Ok(handle);
        }

        match self.timer.arm(fire_at, token.clone(), on_fire.clone()) {
            Ok(()) => {
                debug!(%fire_at, "Armed host wake timer");
                Ok(handle)
            }
            Err(BackendError::PermissionDenied(reason)) => {
                if !self.degraded.swap(true, Ordering::Relaxed) {
                    warn!(%reason, "Exact wake capability denied; degrading clock backend to in-process timers");
                }
                self.arm_in_process(fire_at, token, on_fire);
                Ok(handle)
            }
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    struct DenyingTimer;

    impl WakeTimer for DenyingTimer {
        fn arm(
            &self,
            _fire_at: DateTime<Utc>,
            _token: CancellationToken,
            _on_fire: FireCallback,
        ) -> Result<(), BackendError> {
            Err(BackendError::PermissionDenied("exact wakes disabled".into()))
        }
    }

    fn counting_callback() -> (FireCallback, Arc<AtomicUsize>) {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        let callback: FireCallback = Arc::new(move || {
            let counter = counter.clone();
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            })
        });
        (callback, fired)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn fires_through_the_wake_timer() {
        let backend = ClockBackend::new(Arc::new(InProcessWakeTimer));
        let (callback, fired) = counting_callback();

        backend
            .schedule(Utc::now() + chrono::Duration::milliseconds(30), callback)
            .await
            .expect("armed");

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!backend.is_degraded());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn permission_denial_degrades_but_still_fires() {
        let backend = ClockBackend::new(Arc::new(DenyingTimer));
        let (callback, fired) = counting_callback();

        backend
            .schedule(Utc::now() + chrono::Duration::milliseconds(30), callback.clone())
            .await
            .expect("degraded arm still succeeds");
        assert!(backend.is_degraded());

        // Subsequent arms skip the denied timer entirely.
        backend
            .schedule(Utc::now() + chrono::Duration::milliseconds(30), callback)
            .await
            .expect("armed in-process");

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }
}
