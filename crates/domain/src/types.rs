//! Common data types used throughout the scheduler

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One logical "run at T" request issued by the caller.
///
/// Immutable once issued; re-scheduling the same task id replaces the
/// outstanding triggers rather than mutating the request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleRequest {
    /// Opaque identifier for the logical recurring task.
    pub task_id: String,
    /// The time the payload is supposed to run.
    pub intended_time: DateTime<Utc>,
    /// When the request was issued.
    pub created_at: DateTime<Utc>,
}

impl ScheduleRequest {
    /// Create a request stamped with the current time.
    pub fn new(task_id: impl Into<String>, intended_time: DateTime<Utc>) -> Self {
        Self { task_id: task_id.into(), intended_time, created_at: Utc::now() }
    }
}

/// One concrete mechanism for scheduling a future one-shot callback.
///
/// Ordered by durability: a cooperative timer dies with the process, a
/// queued job survives restarts but is batched, a clock trigger fires even
/// while the device is idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// In-process deferred task; cheapest, lost if the process dies.
    Cooperative,
    /// Persisted OS-managed job queue; survives restarts, batched.
    Queued,
    /// OS wake-timer; fires even when idle, subject to permissions.
    Clock,
}

impl BackendKind {
    /// The next more durable kind, or `None` when already at the top.
    pub fn escalated(self) -> Option<Self> {
        match self {
            Self::Cooperative => Some(Self::Queued),
            Self::Queued => Some(Self::Clock),
            Self::Clock => None,
        }
    }

    /// The next cheaper kind, or `None` when already at the bottom.
    pub fn deescalated(self) -> Option<Self> {
        match self {
            Self::Clock => Some(Self::Queued),
            Self::Queued => Some(Self::Cooperative),
            Self::Cooperative => None,
        }
    }

    /// Whether this kind survives process death.
    pub fn is_durable(self) -> bool {
        !matches!(self, Self::Cooperative)
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Cooperative => "cooperative",
            Self::Queued => "queued",
            Self::Clock => "clock",
        };
        f.write_str(name)
    }
}

/// How a delay sample came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DelayOutcome {
    /// A trigger fired and the payload ran.
    Executed,
    /// No trigger fired within the grace window; recorded at maximal delay.
    Missed,
}

/// Gap between an occurrence's intended and actual execution time.
///
/// Created once per realized (or missed) occurrence and read-only after
/// creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelayRecord {
    /// The time the payload was supposed to run.
    pub intended_time: DateTime<Utc>,
    /// When it actually ran (or when the miss was detected).
    pub actual_time: DateTime<Utc>,
    /// `actual_time - intended_time` in milliseconds. Negative means early.
    pub delay_ms: i64,
    /// Whether the sample is a real execution or a detected miss.
    pub outcome: DelayOutcome,
}

impl DelayRecord {
    /// Build a record for a realized execution.
    pub fn executed(intended_time: DateTime<Utc>, actual_time: DateTime<Utc>) -> Self {
        Self {
            intended_time,
            actual_time,
            delay_ms: (actual_time - intended_time).num_milliseconds(),
            outcome: DelayOutcome::Executed,
        }
    }

    /// Build a maximal-delay sample for a missed occurrence.
    pub fn missed(intended_time: DateTime<Utc>, detected_at: DateTime<Utc>, delay_ms: i64) -> Self {
        Self { intended_time, actual_time: detected_at, delay_ms, outcome: DelayOutcome::Missed }
    }
}

/// The minimal schedule state that survives a process restart.
///
/// Persisted as a single JSON object so the facade can re-arm a trigger
/// after a cold start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedSchedule {
    pub task_id: String,
    pub intended_time: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl From<&ScheduleRequest> for PersistedSchedule {
    fn from(request: &ScheduleRequest) -> Self {
        Self {
            task_id: request.task_id.clone(),
            intended_time: request.intended_time,
            created_at: request.created_at,
        }
    }
}

/// State of the current occurrence's execution claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimState {
    /// No occurrence is armed.
    Idle,
    /// Triggers are armed and racing for the claim.
    Pending,
    /// A trigger won the claim and the occurrence is resolved.
    Resolved,
}

/// Human-readable scheduler summary returned by `status()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerStatus {
    /// Backend currently preferred for primary triggers.
    pub selected_backend: BackendKind,
    /// Lead time subtracted from future scheduling delays (ms).
    pub compensation_ms: i64,
    /// Rolling average delay across the recent history window (ms).
    pub average_delay_ms: i64,
    /// Number of samples currently in the history window.
    pub sample_count: usize,
    /// Consecutive on-time executions observed.
    pub consecutive_normal: u32,
    /// Consecutive severe delays observed.
    pub consecutive_delayed: u32,
    /// Claim state of the current occurrence.
    pub claim: ClaimState,
    /// Triggers that have fired (winners and losers alike).
    pub triggers_fired: u64,
    /// Triggers that fired after the claim was already taken.
    pub races_lost: u64,
    /// Payload executions that returned an error.
    pub payload_failures: u64,
    /// Occurrences that never fired within the grace window.
    pub missed_occurrences: u64,
}

impl std::fmt::Display for SchedulerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "backend={} compensation={}s avg_delay={}s samples={} claim={:?} \
             fired={} races_lost={} payload_failures={} missed={}",
            self.selected_backend,
            self.compensation_ms / 1000,
            self.average_delay_ms / 1000,
            self.sample_count,
            self.claim,
            self.triggers_fired,
            self.races_lost,
            self.payload_failures,
            self.missed_occurrences,
        )
    }
}
