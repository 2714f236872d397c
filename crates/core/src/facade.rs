//! Scheduler facade
//!
//! The only entry point callers use. Owns the backend selection and the
//! compensation value, forwards schedule/cancel requests to the redundancy
//! coordinator, registers executions with the delay monitor, and runs the
//! periodic sweep that catches silently missed occurrences.
//!
//! Lifecycle follows the workspace runtime rules: explicit `start`/`stop`,
//! tracked join handle for the sweep task, cancellation token, timeout
//! around the join, and a `Drop` that warns if the scheduler is still
//! running.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rewake_domain::{
    constants, BackendKind, PersistedSchedule, ScheduleRequest, SchedulerStatus,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::compensation::{CompensationController, ControlDecision, ControlPolicy};
use crate::coordinator::{
    CoordinatorConfig, ExecutionListener, RedundancyCoordinator, TriggerCounters,
};
use crate::delay::{DelayMonitor, DelayMonitorConfig};
use crate::error::{SchedulerError, SchedulerResult};
use crate::guard::{WakeGuard, WakeGuardConfig};
use crate::ports::{Clock, ScheduleStore, TaskExecutor, TriggerBackend, WakeSource};

/// One backend instance per kind, injected at construction.
#[derive(Clone)]
pub struct BackendSet {
    /// In-process deferred triggers.
    pub cooperative: Arc<dyn TriggerBackend>,
    /// Persisted job-queue triggers.
    pub queued: Arc<dyn TriggerBackend>,
    /// OS wake-timer triggers.
    pub clock: Arc<dyn TriggerBackend>,
}

impl BackendSet {
    fn get(&self, kind: BackendKind) -> Arc<dyn TriggerBackend> {
        match kind {
            BackendKind::Cooperative => self.cooperative.clone(),
            BackendKind::Queued => self.queued.clone(),
            BackendKind::Clock => self.clock.clone(),
        }
    }
}

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Identifier of the single logical recurring task.
    pub task_id: String,
    /// Backend preferred before any samples arrive.
    pub initial_backend: BackendKind,
    /// Compensation control policy.
    pub policy: ControlPolicy,
    /// Delay monitor tuning.
    pub monitor: DelayMonitorConfig,
    /// Redundant trigger offsets.
    pub coordinator: CoordinatorConfig,
    /// Wake guard tuning.
    pub guard: WakeGuardConfig,
    /// Interval between delay-monitor sweeps.
    pub sweep_interval: Duration,
    /// Consecutive misses before compensation state is reset.
    pub miss_streak_for_reset: u32,
    /// Optional pre-fire wake window (ms): when an occurrence is due within
    /// this window, the wake source is asked to keep the process awake.
    pub wake_ahead_ms: Option<i64>,
    /// Timeout for awaiting the sweep task join handle on stop.
    pub join_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            task_id: "rewake.recurring".into(),
            initial_backend: BackendKind::Cooperative,
            policy: ControlPolicy::default(),
            monitor: DelayMonitorConfig::default(),
            coordinator: CoordinatorConfig::default(),
            guard: WakeGuardConfig::default(),
            sweep_interval: Duration::from_millis(constants::SWEEP_INTERVAL_MS),
            miss_streak_for_reset: constants::MISS_STREAK_FOR_RESET,
            wake_ahead_ms: None,
            join_timeout: Duration::from_secs(5),
        }
    }
}

/// Feeds realized executions from the coordinator into the delay monitor
/// and the compensation controller.
struct ExecutionPipeline {
    monitor: Arc<DelayMonitor>,
    controller: Arc<CompensationController>,
    clock: Arc<dyn Clock>,
}

impl ExecutionListener for ExecutionPipeline {
    fn on_executed(&self, task_id: &str) {
        let now = self.clock.now();
        let Some(record) = self.monitor.record_execution(task_id, now) else {
            return;
        };
        let average = self.monitor.average_delay_ms();
        let decision = self.controller.observe(&record, average);
        log_decision(task_id, &decision);
    }
}

fn log_decision(task_id: &str, decision: &ControlDecision) {
    if !decision.changed() {
        return;
    }
    if let Some((from, to)) = decision.transition {
        info!(task_id, %from, %to, "Backend preference switched");
    }
    if decision.previous_compensation_ms != decision.compensation_ms {
        info!(
            task_id,
            from_secs = decision.previous_compensation_ms / 1000,
            to_secs = decision.compensation_ms / 1000,
            "Compensation adjusted"
        );
    }
}

/// The adaptive multi-backend scheduler.
pub struct Scheduler {
    config: SchedulerConfig,
    backends: BackendSet,
    coordinator: Arc<RedundancyCoordinator>,
    monitor: Arc<DelayMonitor>,
    controller: Arc<CompensationController>,
    counters: Arc<TriggerCounters>,
    guard: WakeGuard,
    store: Arc<dyn ScheduleStore>,
    clock: Arc<dyn Clock>,
    sweep_handle: Option<JoinHandle<()>>,
    cancellation: CancellationToken,
}

impl Scheduler {
    /// Wire up a scheduler from its collaborators.
    ///
    /// Nothing is armed and no task is spawned until [`start`] runs;
    /// construction is side-effect free.
    ///
    /// [`start`]: Scheduler::start
    pub fn new(
        config: SchedulerConfig,
        backends: BackendSet,
        executor: Arc<dyn TaskExecutor>,
        wake_source: Arc<dyn WakeSource>,
        store: Arc<dyn ScheduleStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        // Misses must read as maximal samples under whatever policy is in
        // force, not just the default thresholds.
        let mut monitor_config = config.monitor.clone();
        monitor_config.miss_delay_floor_ms =
            monitor_config.miss_delay_floor_ms.max(config.policy.severe_threshold_ms);
        let monitor = Arc::new(DelayMonitor::new(monitor_config));
        let controller = Arc::new(CompensationController::new(
            config.policy.clone(),
            config.initial_backend,
        ));
        let counters = Arc::new(TriggerCounters::default());
        let guard = WakeGuard::new(wake_source, config.guard.clone());
        let pipeline = Arc::new(ExecutionPipeline {
            monitor: monitor.clone(),
            controller: controller.clone(),
            clock: clock.clone(),
        });
        let coordinator = Arc::new(RedundancyCoordinator::new(
            executor,
            guard.clone(),
            pipeline,
            counters.clone(),
            config.coordinator.clone(),
        ));

        Self {
            config,
            backends,
            coordinator,
            monitor,
            controller,
            counters,
            guard,
            store,
            clock,
            sweep_handle: None,
            cancellation: CancellationToken::new(),
        }
    }

    /// Start the sweep task and re-arm any schedule that survived a
    /// restart.
    #[instrument(skip(self))]
    pub async fn start(&mut self) -> SchedulerResult<()> {
        if self.is_running() {
            return Err(SchedulerError::AlreadyRunning);
        }

        self.rearm_from_store().await;

        self.cancellation = CancellationToken::new();
        let cancel = self.cancellation.clone();
        let monitor = self.monitor.clone();
        let controller = self.controller.clone();
        let counters = self.counters.clone();
        let guard = self.guard.clone();
        let clock = self.clock.clone();
        let sweep_interval = self.config.sweep_interval;
        let miss_streak = self.config.miss_streak_for_reset;
        let wake_ahead = self.config.wake_ahead_ms;
        let task_id = self.config.task_id.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(sweep_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("Sweep task cancelled");
                        break;
                    }
                    _ = ticker.tick() => {
                        run_sweep(
                            &task_id,
                            &monitor,
                            &controller,
                            &counters,
                            &guard,
                            clock.as_ref(),
                            miss_streak,
                            wake_ahead,
                        );
                    }
                }
            }
        });

        self.sweep_handle = Some(handle);
        info!("Scheduler started");
        Ok(())
    }

    /// Stop the sweep task.
    #[instrument(skip(self))]
    pub async fn stop(&mut self) -> SchedulerResult<()> {
        if !self.is_running() {
            return Err(SchedulerError::NotRunning);
        }

        self.cancellation.cancel();
        if let Some(handle) = self.sweep_handle.take() {
            let join_timeout = self.config.join_timeout;
            tokio::time::timeout(join_timeout, handle)
                .await
                .map_err(|_| SchedulerError::Timeout { seconds: join_timeout.as_secs() })?
                .map_err(|err| SchedulerError::TaskJoinFailed(err.to_string()))?;
        }

        info!("Scheduler stopped");
        Ok(())
    }

    /// Returns true while the sweep task is active.
    pub fn is_running(&self) -> bool {
        self.sweep_handle.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    /// Schedule the next occurrence of the recurring task.
    ///
    /// Never blocks: triggers are armed and all waiting happens inside the
    /// backends. The primary trigger fires at `intended_time` minus the
    /// compensation currently in effect.
    #[instrument(skip(self), fields(task_id = %self.config.task_id))]
    pub async fn schedule_recurring(&self, intended_time: DateTime<Utc>) -> SchedulerResult<()> {
        let request = ScheduleRequest::new(self.config.task_id.clone(), intended_time);

        // Persist first so a crash between here and arming still re-arms
        // after restart. Persistence failure is not fatal to scheduling.
        if let Err(err) = self.store.save(&PersistedSchedule::from(&request)).await {
            warn!(error = %err, "Failed to persist schedule state");
        }

        self.monitor.record_schedule(&request.task_id, request.intended_time);
        self.arm(&request).await
    }

    /// Cancel the outstanding occurrence, if any.
    #[instrument(skip(self), fields(task_id = %self.config.task_id))]
    pub async fn cancel(&self) -> SchedulerResult<()> {
        self.coordinator.cancel_all(&self.config.task_id);
        self.monitor.forget(&self.config.task_id);
        if let Err(err) = self.store.clear().await {
            warn!(error = %err, "Failed to clear persisted schedule state");
        }
        Ok(())
    }

    /// Entry point for host-delivered callbacks (OS alarm or persisted job
    /// queue calling back into the process).
    pub async fn on_trigger_fired(
        &self,
        task_id: &str,
        origin: BackendKind,
    ) -> SchedulerResult<()> {
        self.coordinator.fire_external(task_id, origin).await
    }

    /// Human-readable scheduler summary.
    pub fn status(&self) -> SchedulerStatus {
        let (consecutive_normal, consecutive_delayed) = self.controller.streaks();
        SchedulerStatus {
            selected_backend: self.controller.selected_backend(),
            compensation_ms: self.controller.compensation_ms(),
            average_delay_ms: self.monitor.average_delay_ms().unwrap_or(0),
            sample_count: self.monitor.sample_count(),
            consecutive_normal,
            consecutive_delayed,
            claim: self.coordinator.claim_state(&self.config.task_id),
            triggers_fired: self.counters.triggers_fired(),
            races_lost: self.counters.races_lost(),
            payload_failures: self.counters.payload_failures(),
            missed_occurrences: self.counters.missed_occurrences(),
        }
    }

    async fn arm(&self, request: &ScheduleRequest) -> SchedulerResult<()> {
        let selected = self.controller.selected_backend();
        let fallback_kind = selected.escalated().unwrap_or(selected);
        self.coordinator
            .arm(
                request,
                self.controller.compensation_ms(),
                self.backends.get(selected),
                self.backends.get(selected),
                self.backends.get(fallback_kind),
            )
            .await
    }

    /// Re-arm from persisted state after an unexpected restart.
    ///
    /// Uses the cooperative backend for the primary so a cold start always
    /// has at least an in-process trigger, with the durable fallback armed
    /// as usual.
    async fn rearm_from_store(&self) {
        let persisted = match self.store.load().await {
            Ok(Some(persisted)) => persisted,
            Ok(None) => return,
            Err(err) => {
                warn!(error = %err, "Failed to load persisted schedule state");
                return;
            }
        };

        if persisted.task_id != self.config.task_id {
            debug!(
                persisted_task = %persisted.task_id,
                "Ignoring persisted schedule for a different task"
            );
            return;
        }

        let request = ScheduleRequest {
            task_id: persisted.task_id,
            intended_time: persisted.intended_time,
            created_at: persisted.created_at,
        };
        info!(intended_time = %request.intended_time, "Re-arming persisted schedule after restart");

        self.monitor.record_schedule(&request.task_id, request.intended_time);
        let selected = self.controller.selected_backend();
        let fallback_kind = selected.escalated().unwrap_or(selected);
        let result = self
            .coordinator
            .arm(
                &request,
                self.controller.compensation_ms(),
                self.backends.get(BackendKind::Cooperative),
                self.backends.get(selected),
                self.backends.get(fallback_kind),
            )
            .await;
        if let Err(err) = result {
            warn!(error = %err, "Failed to re-arm persisted schedule");
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn run_sweep(
    task_id: &str,
    monitor: &DelayMonitor,
    controller: &CompensationController,
    counters: &TriggerCounters,
    guard: &WakeGuard,
    clock: &dyn Clock,
    miss_streak_for_reset: u32,
    wake_ahead_ms: Option<i64>,
) {
    let now = clock.now();

    for record in monitor.sweep(now) {
        counters.record_missed();
        let average = monitor.average_delay_ms();
        let decision = controller.observe(&record, average);
        log_decision(task_id, &decision);
    }

    // A long silent streak means the learned state describes a world that
    // no longer exists; relearn from scratch.
    if monitor.consecutive_missed() >= miss_streak_for_reset {
        warn!(
            misses = monitor.consecutive_missed(),
            "Consecutive misses exceeded threshold; resetting compensation state"
        );
        controller.reset();
        monitor.clear();
    }

    if let Some(window_ms) = wake_ahead_ms {
        if let Some(intended) = monitor.upcoming_within(now, window_ms) {
            let until = (intended - now).num_milliseconds().max(0) as u64;
            debug!(until_secs = until / 1000, "Occurrence imminent; requesting wakefulness");
            guard.keep_awake(Duration::from_millis(until));
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if self.is_running() {
            warn!("Scheduler dropped while running; cancelling sweep task");
            self.cancellation.cancel();
        }
    }
}
