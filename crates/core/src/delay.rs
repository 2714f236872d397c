//! Delay monitor
//!
//! Records each occurrence's intended time and, on execution, the actual
//! time, keeping a bounded recent-history window of delay samples. A
//! periodic sweep (driven by the facade) catches occurrences that never
//! executed: silent total failure still has to move the controller toward
//! more reliable backends, so a miss becomes a maximal-delay sample.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rewake_domain::{constants, DelayRecord};
use tracing::{debug, warn};

/// Delay monitor tuning.
#[derive(Debug, Clone)]
pub struct DelayMonitorConfig {
    /// Capacity of the delay history ring buffer.
    pub history_capacity: usize,
    /// How far past the intended time an unexecuted occurrence may drift
    /// before it counts as missed (ms).
    pub grace_window_ms: i64,
    /// Samples required before the rolling average is meaningful.
    pub min_samples_for_average: usize,
    /// Lower bound on the delay recorded for a missed occurrence (ms).
    ///
    /// A miss must register as a maximal sample even when the grace window
    /// is shorter than the controller's severe threshold, so silent total
    /// failure always pushes toward more durable backends.
    pub miss_delay_floor_ms: i64,
}

impl Default for DelayMonitorConfig {
    fn default() -> Self {
        Self {
            history_capacity: constants::DELAY_HISTORY_CAPACITY,
            grace_window_ms: constants::MISS_GRACE_WINDOW_MS,
            min_samples_for_average: constants::MIN_SAMPLES_FOR_AVERAGE,
            miss_delay_floor_ms: constants::DELAY_THRESHOLD_SEVERE_MS,
        }
    }
}

#[derive(Debug, Clone)]
struct PendingSchedule {
    intended_time: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct MonitorState {
    pending: HashMap<String, PendingSchedule>,
    history: VecDeque<DelayRecord>,
    consecutive_missed: u32,
}

/// Tracks intended-vs-actual execution times over a bounded window.
pub struct DelayMonitor {
    config: DelayMonitorConfig,
    state: Mutex<MonitorState>,
}

impl DelayMonitor {
    /// Create a monitor with the given tuning.
    pub fn new(config: DelayMonitorConfig) -> Self {
        Self { config, state: Mutex::new(MonitorState::default()) }
    }

    /// Register an occurrence's intended execution time.
    ///
    /// Re-registering the same task id replaces the pending entry, matching
    /// the coordinator's replace semantics.
    pub fn record_schedule(&self, task_id: &str, intended_time: DateTime<Utc>) {
        let mut state = self.state.lock();
        state.pending.insert(task_id.to_string(), PendingSchedule { intended_time });
        debug!(task_id, %intended_time, "Recorded scheduled occurrence");
    }

    /// Record the realized execution of a pending occurrence.
    ///
    /// Returns the created sample for the caller to forward to the
    /// compensation controller, or `None` when no occurrence was pending
    /// under that id (a stale or external callback).
    pub fn record_execution(&self, task_id: &str, now: DateTime<Utc>) -> Option<DelayRecord> {
        let mut state = self.state.lock();
        let Some(pending) = state.pending.remove(task_id) else {
            debug!(task_id, "Execution recorded for unknown occurrence");
            return None;
        };

        let record = DelayRecord::executed(pending.intended_time, now);
        debug!(task_id, delay_secs = record.delay_ms / 1000, "Recorded executed occurrence");
        state.consecutive_missed = 0;
        push_bounded(&mut state.history, record.clone(), self.config.history_capacity);
        Some(record)
    }

    /// Sweep pending occurrences whose intended time is more than the grace
    /// window in the past, converting each into a maximal-delay sample.
    pub fn sweep(&self, now: DateTime<Utc>) -> Vec<DelayRecord> {
        let mut state = self.state.lock();
        let grace = self.config.grace_window_ms;

        let expired: Vec<String> = state
            .pending
            .iter()
            .filter(|(_, pending)| {
                (now - pending.intended_time).num_milliseconds() > grace
            })
            .map(|(task_id, _)| task_id.clone())
            .collect();

        let mut missed = Vec::with_capacity(expired.len());
        for task_id in expired {
            if let Some(pending) = state.pending.remove(&task_id) {
                let overdue_ms = (now - pending.intended_time).num_milliseconds();
                warn!(
                    task_id,
                    overdue_secs = overdue_ms / 1000,
                    "Occurrence missed: no trigger fired within the grace window"
                );
                let delay_ms = overdue_ms.max(self.config.miss_delay_floor_ms);
                let record = DelayRecord::missed(pending.intended_time, now, delay_ms);
                state.consecutive_missed = state.consecutive_missed.saturating_add(1);
                push_bounded(&mut state.history, record.clone(), self.config.history_capacity);
                missed.push(record);
            }
        }
        missed
    }

    /// Rolling average delay, once enough samples are in the window.
    pub fn average_delay_ms(&self) -> Option<i64> {
        let state = self.state.lock();
        if state.history.len() < self.config.min_samples_for_average {
            return None;
        }
        let sum: i64 = state.history.iter().map(|record| record.delay_ms).sum();
        Some(sum / state.history.len() as i64)
    }

    /// Number of samples currently in the history window.
    pub fn sample_count(&self) -> usize {
        self.state.lock().history.len()
    }

    /// Consecutive sweeps that found a missed occurrence without an
    /// intervening successful execution.
    pub fn consecutive_missed(&self) -> u32 {
        self.state.lock().consecutive_missed
    }

    /// Nearest pending intended time within `window_ms` of `now`, if any.
    ///
    /// Used for the optional pre-fire wake window.
    pub fn upcoming_within(&self, now: DateTime<Utc>, window_ms: i64) -> Option<DateTime<Utc>> {
        let state = self.state.lock();
        state
            .pending
            .values()
            .map(|pending| pending.intended_time)
            .filter(|intended| {
                let until = (*intended - now).num_milliseconds();
                until > 0 && until <= window_ms
            })
            .min()
    }

    /// Drop all history and pending records.
    ///
    /// Part of the consecutive-miss recovery path: after a reset the
    /// controller should relearn from fresh samples.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.pending.clear();
        state.history.clear();
        state.consecutive_missed = 0;
    }

    /// Forget a pending occurrence without producing a sample.
    pub fn forget(&self, task_id: &str) {
        self.state.lock().pending.remove(task_id);
    }
}

fn push_bounded(history: &mut VecDeque<DelayRecord>, record: DelayRecord, capacity: usize) {
    while history.len() >= capacity {
        history.pop_front();
    }
    history.push_back(record);
}
