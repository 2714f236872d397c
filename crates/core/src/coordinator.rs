//! Redundancy coordinator
//!
//! Given one logical "run at T" request, arms the selected primary trigger
//! plus two time-shifted secondaries and guarantees that exactly one of
//! them executes the payload. The execution claim inside the fire path is
//! the authoritative race-breaker; cancellation only stops triggers that
//! have not fired yet.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rewake_domain::{constants, BackendKind, ClaimState, ScheduleRequest};
use tracing::{debug, error, info, warn};

use crate::claim::ExecutionClaim;
use crate::error::{SchedulerError, SchedulerResult};
use crate::guard::WakeGuard;
use crate::ports::{FireCallback, TaskExecutor, TriggerBackend, TriggerHandle};

/// Observer notified after a claim-winning trigger finished the payload.
///
/// The facade implements this to feed the delay monitor and the
/// compensation controller without a circular dependency on the
/// coordinator.
pub trait ExecutionListener: Send + Sync {
    /// Called once per realized occurrence, after the payload returned.
    fn on_executed(&self, task_id: &str);
}

/// Shared trigger counters surfaced through `status()`.
#[derive(Debug, Default)]
pub struct TriggerCounters {
    triggers_fired: AtomicU64,
    races_lost: AtomicU64,
    payload_failures: AtomicU64,
    missed_occurrences: AtomicU64,
}

impl TriggerCounters {
    /// Triggers that have fired, winners and losers alike.
    pub fn triggers_fired(&self) -> u64 {
        self.triggers_fired.load(Ordering::Relaxed)
    }

    /// Triggers that fired after the claim was already taken.
    pub fn races_lost(&self) -> u64 {
        self.races_lost.load(Ordering::Relaxed)
    }

    /// Payload executions that returned an error.
    pub fn payload_failures(&self) -> u64 {
        self.payload_failures.load(Ordering::Relaxed)
    }

    /// Occurrences the sweep declared missed.
    pub fn missed_occurrences(&self) -> u64 {
        self.missed_occurrences.load(Ordering::Relaxed)
    }

    /// Count one missed occurrence.
    pub fn record_missed(&self) {
        self.missed_occurrences.fetch_add(1, Ordering::Relaxed);
    }
}

/// Coordinator tuning.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Offset of the first secondary trigger past the intended time (ms).
    pub secondary_offset_first_ms: i64,
    /// Offset of the second secondary trigger past the intended time (ms).
    pub secondary_offset_second_ms: i64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            secondary_offset_first_ms: constants::SECONDARY_OFFSET_FIRST_MS,
            secondary_offset_second_ms: constants::SECONDARY_OFFSET_SECOND_MS,
        }
    }
}

struct FireContext {
    task_id: String,
    claim: ExecutionClaim,
    executor: Arc<dyn TaskExecutor>,
    guard: WakeGuard,
    listener: Arc<dyn ExecutionListener>,
    counters: Arc<TriggerCounters>,
}

impl FireContext {
    async fn fire(&self, origin: BackendKind) {
        self.counters.triggers_fired.fetch_add(1, Ordering::Relaxed);

        if !self.claim.try_claim() {
            // Expected under redundancy; not an error.
            self.counters.races_lost.fetch_add(1, Ordering::Relaxed);
            debug!(task_id = %self.task_id, %origin, "Claim already taken; trigger no-op");
            return;
        }

        info!(task_id = %self.task_id, %origin, "Trigger won the claim; executing payload");
        let guard_handle = self.guard.acquire();

        if let Err(err) = self.executor.run_payload().await {
            // One occurrence, one attempt: retry is the payload's business.
            self.counters.payload_failures.fetch_add(1, Ordering::Relaxed);
            error!(task_id = %self.task_id, error = %err, "Payload failed");
        }

        guard_handle.release();
        self.listener.on_executed(&self.task_id);
    }
}

struct ArmedOccurrence {
    context: Arc<FireContext>,
    handles: Vec<TriggerHandle>,
}

/// Arms redundant triggers for one logical occurrence and guarantees
/// at-most-one payload execution across them.
pub struct RedundancyCoordinator {
    executor: Arc<dyn TaskExecutor>,
    guard: WakeGuard,
    listener: Arc<dyn ExecutionListener>,
    counters: Arc<TriggerCounters>,
    config: CoordinatorConfig,
    armed: Mutex<HashMap<String, ArmedOccurrence>>,
}

impl RedundancyCoordinator {
    /// Create a coordinator around the injected payload executor.
    pub fn new(
        executor: Arc<dyn TaskExecutor>,
        guard: WakeGuard,
        listener: Arc<dyn ExecutionListener>,
        counters: Arc<TriggerCounters>,
        config: CoordinatorConfig,
    ) -> Self {
        Self { executor, guard, listener, counters, config, armed: Mutex::new(HashMap::new()) }
    }

    /// Arm one primary and two secondary triggers for the request.
    ///
    /// The primary fires at `intended_time - compensation` on the selected
    /// backend; the secondaries fire at fixed offsets past the intended
    /// time, the second on a more durable kind as degradation fallback.
    /// Re-arming a task id cancels its outstanding triggers first so stale
    /// requests cannot produce duplicate claims.
    pub async fn arm(
        &self,
        request: &ScheduleRequest,
        compensation_ms: i64,
        primary: Arc<dyn TriggerBackend>,
        secondary: Arc<dyn TriggerBackend>,
        fallback: Arc<dyn TriggerBackend>,
    ) -> SchedulerResult<()> {
        self.cancel_all(&request.task_id);

        let context = Arc::new(FireContext {
            task_id: request.task_id.clone(),
            claim: ExecutionClaim::new(),
            executor: self.executor.clone(),
            guard: self.guard.clone(),
            listener: self.listener.clone(),
            counters: self.counters.clone(),
        });

        let primary_at = request.intended_time - chrono::Duration::milliseconds(compensation_ms);
        let first_at = request.intended_time
            + chrono::Duration::milliseconds(self.config.secondary_offset_first_ms);
        let second_at = request.intended_time
            + chrono::Duration::milliseconds(self.config.secondary_offset_second_ms);

        let plan: [(Arc<dyn TriggerBackend>, DateTime<Utc>); 3] =
            [(primary, primary_at), (secondary, first_at), (fallback, second_at)];

        let mut handles = Vec::with_capacity(plan.len());
        for (backend, fire_at) in plan {
            let kind = backend.kind();
            match backend.schedule(fire_at, fire_callback(context.clone(), kind)).await {
                Ok(handle) => {
                    debug!(task_id = %request.task_id, %kind, %fire_at, "Armed trigger");
                    handles.push(handle);
                }
                Err(err) => {
                    // Non-fatal: the remaining triggers cover the occurrence.
                    warn!(task_id = %request.task_id, %kind, error = %err, "Backend failed to arm");
                }
            }
        }

        if handles.is_empty() {
            return Err(SchedulerError::AllBackendsFailed { task_id: request.task_id.clone() });
        }

        self.armed
            .lock()
            .insert(request.task_id.clone(), ArmedOccurrence { context, handles });
        Ok(())
    }

    /// Cancel every still-pending trigger for the task.
    ///
    /// Already-fired triggers are unaffected; safe to call concurrently
    /// with an in-flight fire (the claim decides that race, not us).
    pub fn cancel_all(&self, task_id: &str) {
        if let Some(occurrence) = self.armed.lock().remove(task_id) {
            let pending = occurrence.handles.iter().filter(|h| !h.is_cancelled()).count();
            for handle in &occurrence.handles {
                handle.cancel();
            }
            if pending > 0 {
                debug!(task_id, cancelled = pending, "Cancelled outstanding triggers");
            }
        }
    }

    /// Fire path for host-delivered callbacks (OS alarm or job queue
    /// calling back into the process).
    pub async fn fire_external(&self, task_id: &str, origin: BackendKind) -> SchedulerResult<()> {
        let context = {
            let armed = self.armed.lock();
            armed
                .get(task_id)
                .map(|occurrence| occurrence.context.clone())
                .ok_or_else(|| SchedulerError::UnknownTask { task_id: task_id.to_string() })?
        };
        context.fire(origin).await;
        Ok(())
    }

    /// Claim state of the task's current occurrence.
    pub fn claim_state(&self, task_id: &str) -> ClaimState {
        let armed = self.armed.lock();
        match armed.get(task_id) {
            None => ClaimState::Idle,
            Some(occurrence) if occurrence.context.claim.is_claimed() => ClaimState::Resolved,
            Some(_) => ClaimState::Pending,
        }
    }
}

fn fire_callback(context: Arc<FireContext>, origin: BackendKind) -> FireCallback {
    Arc::new(move || {
        let context = context.clone();
        Box::pin(async move { context.fire(origin).await })
    })
}
