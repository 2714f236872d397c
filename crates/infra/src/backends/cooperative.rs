//! Cooperative in-process trigger backend

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rewake_core::{BackendError, FireCallback, TriggerBackend, TriggerHandle};
use rewake_domain::BackendKind;
use tracing::{debug, trace};

/// Trigger backend backed by a plain timer task.
///
/// Cheapest of the three kinds and the least durable: the armed trigger
/// lives only as long as the process and runtime do. A `fire_at` in the
/// past fires immediately.
#[derive(Debug, Default)]
pub struct CooperativeBackend;

impl CooperativeBackend {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TriggerBackend for CooperativeBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Cooperative
    }

    async fn schedule(
        &self,
        fire_at: DateTime<Utc>,
        on_fire: FireCallback,
    ) -> Result<TriggerHandle, BackendError> {
        let handle = TriggerHandle::new(BackendKind::Cooperative);
        let token = handle.token().clone();
        let delay = (fire_at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        trace!(%fire_at, delay_ms = delay.as_millis() as u64, "Arming cooperative trigger");

        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!(%fire_at, "Cooperative trigger cancelled");
                }
                _ = tokio::time::sleep(delay) => {
                    on_fire().await;
                }
            }
        });

        Ok(handle)
    }
}
