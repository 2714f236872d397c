//! Integration tests for the scheduler over real backend implementations
//!
//! Exercises the full path: facade, redundancy coordinator, execution
//! claim, delay monitor, compensation controller, and file persistence.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rewake_core::{
    BackendError, BackendSet, FireCallback, NoopWakeSource, ScheduleStore, Scheduler,
    SchedulerConfig, SystemClock, TaskExecutor, TriggerBackend, TriggerHandle,
};
use rewake_domain::{BackendKind, ClaimState, Result};
use rewake_infra::{default_backend_set, JsonScheduleStore};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

struct CountingExecutor {
    runs: AtomicUsize,
}

impl CountingExecutor {
    fn new() -> Arc<Self> {
        Arc::new(Self { runs: AtomicUsize::new(0) })
    }

    fn run_count(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaskExecutor for CountingExecutor {
    async fn run_payload(&self) -> Result<()> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Backend that records every requested fire instant and never fires.
struct RecordingBackend {
    kind: BackendKind,
    armed_at: Mutex<Vec<DateTime<Utc>>>,
}

impl RecordingBackend {
    fn new(kind: BackendKind) -> Arc<Self> {
        Arc::new(Self { kind, armed_at: Mutex::new(Vec::new()) })
    }
}

#[async_trait]
impl TriggerBackend for RecordingBackend {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    async fn schedule(
        &self,
        fire_at: DateTime<Utc>,
        _on_fire: FireCallback,
    ) -> std::result::Result<TriggerHandle, BackendError> {
        self.armed_at.lock().push(fire_at);
        Ok(TriggerHandle::new(self.kind))
    }
}

fn scheduler_with(
    backends: BackendSet,
    store: Arc<JsonScheduleStore>,
) -> (Scheduler, Arc<CountingExecutor>) {
    let executor = CountingExecutor::new();
    let scheduler = Scheduler::new(
        SchedulerConfig::default(),
        backends,
        executor.clone(),
        Arc::new(NoopWakeSource),
        store,
        Arc::new(SystemClock),
    );
    (scheduler, executor)
}

fn temp_store(dir: &tempfile::TempDir) -> Arc<JsonScheduleStore> {
    Arc::new(JsonScheduleStore::new(dir.path().join("schedule.json")))
}

#[tokio::test(flavor = "multi_thread")]
async fn payload_runs_exactly_once_despite_redundant_triggers() {
    init_tracing();
    let dir = tempfile::tempdir().expect("tempdir");
    let (scheduler, executor) = scheduler_with(default_backend_set(), temp_store(&dir));

    // The primary fires immediately (intended minus initial compensation is
    // in the past); the offset secondaries stay outside the test window.
    scheduler
        .schedule_recurring(Utc::now() + chrono::Duration::milliseconds(100))
        .await
        .expect("scheduled");
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(executor.run_count(), 1);
    let status = scheduler.status();
    assert_eq!(status.claim, ClaimState::Resolved);
    assert_eq!(status.sample_count, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn cancellation_stops_all_armed_triggers() {
    init_tracing();
    let dir = tempfile::tempdir().expect("tempdir");
    let store = temp_store(&dir);
    let (scheduler, executor) = scheduler_with(default_backend_set(), store.clone());

    scheduler
        .schedule_recurring(Utc::now() + chrono::Duration::hours(1))
        .await
        .expect("scheduled");
    assert_eq!(scheduler.status().claim, ClaimState::Pending);

    scheduler.cancel().await.expect("cancelled");
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(executor.run_count(), 0);
    assert_eq!(scheduler.status().claim, ClaimState::Idle);
    assert!(store.load().await.expect("loaded").is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn repeated_severe_delays_escalate_to_a_durable_backend() {
    init_tracing();
    let dir = tempfile::tempdir().expect("tempdir");
    let (scheduler, executor) = scheduler_with(default_backend_set(), temp_store(&dir));

    // An intended time far in the past makes each realized execution a
    // severe delay sample (~200s against a 180s threshold).
    for _ in 0..2 {
        scheduler
            .schedule_recurring(Utc::now() - chrono::Duration::seconds(200))
            .await
            .expect("scheduled");
        tokio::time::sleep(Duration::from_millis(200)).await;
    }

    assert_eq!(executor.run_count(), 2);
    let status = scheduler.status();
    assert_eq!(status.selected_backend, BackendKind::Queued, "escalated off cooperative");
    assert_eq!(status.compensation_ms, 0, "escalation resets compensation to its baseline");
}

#[tokio::test(flavor = "multi_thread")]
async fn restart_rearms_from_the_persisted_schedule() {
    init_tracing();
    let dir = tempfile::tempdir().expect("tempdir");
    let store = temp_store(&dir);
    let intended = Utc::now() + chrono::Duration::hours(2);

    {
        let recording = RecordingBackend::new(BackendKind::Cooperative);
        let backends = BackendSet {
            cooperative: recording.clone(),
            queued: RecordingBackend::new(BackendKind::Queued),
            clock: RecordingBackend::new(BackendKind::Clock),
        };
        let (scheduler, _) = scheduler_with(backends, store.clone());
        scheduler.schedule_recurring(intended).await.expect("scheduled");
    }

    // A fresh process with the same store picks the schedule back up.
    let recording = RecordingBackend::new(BackendKind::Cooperative);
    let backends = BackendSet {
        cooperative: recording.clone(),
        queued: RecordingBackend::new(BackendKind::Queued),
        clock: RecordingBackend::new(BackendKind::Clock),
    };
    let (mut scheduler, _) = scheduler_with(backends, store);
    scheduler.start().await.expect("started");

    assert_eq!(scheduler.status().claim, ClaimState::Pending);
    let armed = recording.armed_at.lock().clone();
    let expected_primary = intended - chrono::Duration::seconds(120);
    assert!(
        armed.contains(&expected_primary),
        "primary re-armed at intended minus the compensation in effect, got {:?}",
        armed
    );

    scheduler.stop().await.expect("stopped");
}

#[tokio::test(flavor = "multi_thread")]
async fn fresh_scheduler_reports_baseline_status() {
    init_tracing();
    let dir = tempfile::tempdir().expect("tempdir");
    let (scheduler, _) = scheduler_with(default_backend_set(), temp_store(&dir));

    let status = scheduler.status();
    assert_eq!(status.selected_backend, BackendKind::Cooperative);
    assert_eq!(status.compensation_ms, 120_000);
    assert_eq!(status.sample_count, 0);
    assert_eq!(status.claim, ClaimState::Idle);
    assert_eq!(status.triggers_fired, 0);
    assert_eq!(status.missed_occurrences, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn host_delivered_callbacks_share_the_execution_claim() {
    init_tracing();
    let dir = tempfile::tempdir().expect("tempdir");
    let recording = RecordingBackend::new(BackendKind::Cooperative);
    let backends = BackendSet {
        cooperative: recording,
        queued: RecordingBackend::new(BackendKind::Queued),
        clock: RecordingBackend::new(BackendKind::Clock),
    };
    let (scheduler, executor) = scheduler_with(backends, temp_store(&dir));

    scheduler
        .schedule_recurring(Utc::now() + chrono::Duration::hours(1))
        .await
        .expect("scheduled");

    let task_id = SchedulerConfig::default().task_id;
    scheduler.on_trigger_fired(&task_id, BackendKind::Clock).await.expect("first callback");
    scheduler.on_trigger_fired(&task_id, BackendKind::Queued).await.expect("second callback");

    assert_eq!(executor.run_count(), 1, "the claim admits exactly one execution");
    let status = scheduler.status();
    assert_eq!(status.claim, ClaimState::Resolved);
    assert_eq!(status.races_lost, 1);
}
