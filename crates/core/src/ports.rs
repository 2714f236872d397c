//! Port interfaces for the scheduling core
//!
//! These traits define the boundaries between the scheduling logic and the
//! host environment. Every OS primitive the scheduler leans on (one-shot
//! trigger mechanisms, the sleep-prevention resource, persisted schedule
//! state, wall-clock time, and the payload itself) enters through one of
//! these seams so the core stays testable and host-agnostic.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use rewake_domain::{BackendKind, PersistedSchedule, Result};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::BackendError;

/// Callback invoked when a trigger fires.
///
/// Backends call it at most once per armed trigger; the execution claim
/// downstream decides whether the invocation actually runs the payload.
pub type FireCallback = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Cancellation token for one armed trigger.
///
/// Cancelling is idempotent and racing a cancel against an in-flight fire
/// is safe: the execution claim, not the token, is the authoritative
/// race-breaker.
#[derive(Debug, Clone)]
pub struct TriggerHandle {
    id: Uuid,
    kind: BackendKind,
    token: CancellationToken,
}

impl TriggerHandle {
    /// Create a fresh handle for a trigger of the given kind.
    pub fn new(kind: BackendKind) -> Self {
        Self { id: Uuid::new_v4(), kind, token: CancellationToken::new() }
    }

    /// Unique id of the armed trigger.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Which backend kind armed this trigger.
    pub fn kind(&self) -> BackendKind {
        self.kind
    }

    /// Token the backend's waiting task selects on.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Cancel the trigger. A no-op for triggers that already fired.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether the trigger has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// One concrete mechanism for scheduling a future one-shot callback.
///
/// Implementations must not block the caller of `schedule`; all waiting
/// happens inside the backend's own suspension point. A `schedule` error is
/// non-fatal to the occurrence; redundancy from the other armed triggers
/// covers it.
#[async_trait]
pub trait TriggerBackend: Send + Sync {
    /// The kind this backend implements.
    fn kind(&self) -> BackendKind;

    /// Arm a one-shot trigger that invokes `on_fire` at `fire_at`.
    ///
    /// Returns a handle whose cancellation stops the trigger from firing.
    /// Cancelling an already-fired trigger is a no-op.
    async fn schedule(
        &self,
        fire_at: DateTime<Utc>,
        on_fire: FireCallback,
    ) -> std::result::Result<TriggerHandle, BackendError>;
}

/// The business payload executed once per logical occurrence.
///
/// Injected at construction (dependency inversion); errors it returns are
/// caught and logged by the claim-winning trigger and never retried here;
/// retry is the payload's own business.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    /// Run the payload for one occurrence.
    async fn run_payload(&self) -> Result<()>;
}

/// Host primitive that prevents the device from sleeping.
///
/// `acquire` must be bounded by `timeout`; the wake guard additionally
/// enforces its own hard ceiling on top of whatever the host honors.
pub trait WakeSource: Send + Sync {
    /// Acquire the sleep-prevention resource for at most `timeout`.
    fn acquire(&self, timeout: Duration) -> Result<()>;

    /// Release the resource. Must tolerate release-without-acquire.
    fn release(&self) -> Result<()>;

    /// Hint that the process should stay awake for the given duration.
    ///
    /// Used ahead of an imminent trigger; hosts without a distinct
    /// keep-alive primitive can ignore it.
    fn keep_awake(&self, _duration: Duration) -> Result<()> {
        Ok(())
    }
}

/// Wake source for hosts without a sleep-prevention primitive.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopWakeSource;

impl WakeSource for NoopWakeSource {
    fn acquire(&self, _timeout: Duration) -> Result<()> {
        Ok(())
    }

    fn release(&self) -> Result<()> {
        Ok(())
    }
}

/// Persistence for the minimal schedule state that survives restarts.
#[async_trait]
pub trait ScheduleStore: Send + Sync {
    /// Persist the current schedule, replacing any previous one.
    async fn save(&self, schedule: &PersistedSchedule) -> Result<()>;

    /// Load the persisted schedule, if any.
    async fn load(&self) -> Result<Option<PersistedSchedule>>;

    /// Remove the persisted schedule.
    async fn clear(&self) -> Result<()>;
}

/// Wall-clock source, injectable so tests can steer time.
pub trait Clock: Send + Sync {
    /// Current wall-clock time.
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock backed by the system time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
