//! Trigger backend implementations
//!
//! Three interchangeable mechanisms for firing a one-shot callback at a
//! future instant, ordered by durability:
//! - [`CooperativeBackend`]: a plain in-process timer task; cheapest, dies
//!   with the process
//! - [`QueuedBackend`]: a window-based deferred task modelled after
//!   persisted job queues; fires at the earliest point of its window
//! - [`ClockBackend`]: delegates to a host wake timer that can wake the
//!   process from deep sleep, degrading to an in-process timer when the
//!   host denies the capability

mod clock;
mod cooperative;
mod queued;

use std::sync::Arc;

pub use clock::{ClockBackend, InProcessWakeTimer, WakeTimer};
pub use cooperative::CooperativeBackend;
pub use queued::{QueuedBackend, QueuedBackendConfig};
use rewake_core::BackendSet;

/// Backend set for hosts without a real wake timer.
///
/// All three kinds are armed in-process; the durability ladder still
/// applies to selection but every trigger dies with the process.
pub fn default_backend_set() -> BackendSet {
    BackendSet {
        cooperative: Arc::new(CooperativeBackend::new()),
        queued: Arc::new(QueuedBackend::new(QueuedBackendConfig::default())),
        clock: Arc::new(ClockBackend::new(Arc::new(InProcessWakeTimer))),
    }
}
