//! Queued window-based trigger backend

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rewake_core::{BackendError, FireCallback, TriggerBackend, TriggerHandle};
use rewake_domain::{constants, BackendKind};
use tracing::{debug, trace};

/// Queued backend tuning.
#[derive(Debug, Clone)]
pub struct QueuedBackendConfig {
    /// Width of the execution window past the requested instant (ms).
    pub window_slack_ms: i64,
}

impl Default for QueuedBackendConfig {
    fn default() -> Self {
        Self { window_slack_ms: constants::QUEUED_WINDOW_SLACK_MS }
    }
}

/// Trigger backend modelled after persisted job queues.
///
/// Queue-style hosts accept an execution window rather than an exact
/// instant: the trigger requests `[fire_at, fire_at + slack]` and the
/// queue runs it somewhere inside. This in-process rendition always runs
/// at the earliest window point so the redundancy offsets stay meaningful.
#[derive(Debug, Default)]
pub struct QueuedBackend {
    config: QueuedBackendConfig,
}

impl QueuedBackend {
    pub fn new(config: QueuedBackendConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl TriggerBackend for QueuedBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Queued
    }

    async fn schedule(
        &self,
        fire_at: DateTime<Utc>,
        on_fire: FireCallback,
    ) -> Result<TriggerHandle, BackendError> {
        let handle = TriggerHandle::new(BackendKind::Queued);
        let token = handle.token().clone();
        let deadline = fire_at + chrono::Duration::milliseconds(self.config.window_slack_ms);
        let delay = (fire_at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        trace!(window_start = %fire_at, window_end = %deadline, "Enqueuing windowed trigger");

        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!(window_start = %fire_at, "Queued trigger cancelled");
                }
                _ = tokio::time::sleep(delay) => {
                    on_fire().await;
                }
            }
        });

        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    #[tokio::test(flavor = "multi_thread")]
    async fn fires_at_the_earliest_window_point() {
        let backend = QueuedBackend::new(QueuedBackendConfig { window_slack_ms: 60_000 });
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        let callback: FireCallback = Arc::new(move || {
            let counter = counter.clone();
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            })
        });

        backend
            .schedule(Utc::now() + chrono::Duration::milliseconds(40), callback)
            .await
            .expect("enqueued");

        // Well before the window deadline the trigger must already have run.
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
