//! Compensation feedback controller
//!
//! Consumes delay samples and maintains the lead-time compensation value
//! plus the backend-preference state machine. The policy is hysteretic and
//! threshold-banded: single samples may nudge the compensation, but
//! state-changing decisions (escalation, de-escalation) only ever follow
//! consecutive-count or averaged evidence, never one outlier.

use parking_lot::Mutex;
use rewake_domain::{constants, BackendKind, DelayRecord};
use tracing::{debug, info, warn};

/// Tunable parameters of the control policy.
///
/// The defaults are the empirically tuned values; treat them as starting
/// points for a specific host, not contracts.
#[derive(Debug, Clone)]
pub struct ControlPolicy {
    /// Delay below this is a normal execution (ms).
    pub normal_threshold_ms: i64,
    /// Upper bound of the proportional-control band (ms).
    pub moderate_threshold_ms: i64,
    /// Delay at or above this counts toward escalation (ms).
    pub severe_threshold_ms: i64,
    /// Fixed adjustment step (ms).
    pub step_ms: i64,
    /// Compensation for a freshly constructed scheduler (ms).
    pub initial_compensation_ms: i64,
    /// Hard upper bound on compensation (ms).
    pub max_compensation_ms: i64,
    /// Compensation after escalating to a more durable backend (ms).
    pub escalation_baseline_ms: i64,
    /// Compensation after de-escalating to a cheaper backend (ms).
    pub deescalation_baseline_ms: i64,
    /// Safety margin for the proportional band.
    pub proportional_margin: f64,
    /// Consecutive normals required before decreasing compensation.
    pub normal_streak: u32,
    /// Consecutive severe delays required before escalating.
    pub delay_streak: u32,
    /// Samples required (since the last transition) before averaged
    /// decisions apply.
    pub min_samples_for_average: u32,
}

impl Default for ControlPolicy {
    fn default() -> Self {
        Self {
            normal_threshold_ms: constants::DELAY_THRESHOLD_NORMAL_MS,
            moderate_threshold_ms: constants::DELAY_THRESHOLD_MODERATE_MS,
            severe_threshold_ms: constants::DELAY_THRESHOLD_SEVERE_MS,
            step_ms: constants::COMPENSATION_STEP_MS,
            initial_compensation_ms: constants::INITIAL_COMPENSATION_MS,
            max_compensation_ms: constants::MAX_COMPENSATION_MS,
            escalation_baseline_ms: 0,
            deescalation_baseline_ms: constants::DEESCALATION_BASELINE_MS,
            proportional_margin: constants::PROPORTIONAL_MARGIN,
            normal_streak: constants::NORMAL_STREAK_FOR_DECREASE,
            delay_streak: constants::DELAY_STREAK_FOR_ESCALATION,
            min_samples_for_average: constants::MIN_SAMPLES_FOR_AVERAGE as u32,
        }
    }
}

#[derive(Debug)]
struct ControlState {
    compensation_ms: i64,
    consecutive_normal: u32,
    consecutive_delayed: u32,
    selected_backend: BackendKind,
    samples_since_transition: u32,
}

/// What one observed sample changed.
#[derive(Debug, Clone)]
pub struct ControlDecision {
    /// Compensation before the sample was applied (ms).
    pub previous_compensation_ms: i64,
    /// Compensation after the sample was applied (ms).
    pub compensation_ms: i64,
    /// Backend preferred after the sample was applied.
    pub selected_backend: BackendKind,
    /// Present when the sample caused a backend switch.
    pub transition: Option<(BackendKind, BackendKind)>,
}

impl ControlDecision {
    /// Whether the sample changed anything worth logging.
    pub fn changed(&self) -> bool {
        self.transition.is_some() || self.previous_compensation_ms != self.compensation_ms
    }
}

/// Serializes all compensation-state mutation behind one mutex; delay
/// samples may arrive concurrently from different backend callbacks.
pub struct CompensationController {
    policy: ControlPolicy,
    state: Mutex<ControlState>,
}

impl CompensationController {
    /// Create a controller starting on the given backend.
    pub fn new(policy: ControlPolicy, initial_backend: BackendKind) -> Self {
        let state = ControlState {
            compensation_ms: policy.initial_compensation_ms,
            consecutive_normal: 0,
            consecutive_delayed: 0,
            selected_backend: initial_backend,
            // A fresh controller is not inside a post-transition settling
            // window, so seed the counter past the gate.
            samples_since_transition: policy.min_samples_for_average,
        };
        Self { policy, state: Mutex::new(state) }
    }

    /// Current lead-time compensation in milliseconds.
    pub fn compensation_ms(&self) -> i64 {
        self.state.lock().compensation_ms
    }

    /// Backend currently preferred for primary triggers.
    pub fn selected_backend(&self) -> BackendKind {
        self.state.lock().selected_backend
    }

    /// Consecutive counters, for the status surface.
    pub fn streaks(&self) -> (u32, u32) {
        let state = self.state.lock();
        (state.consecutive_normal, state.consecutive_delayed)
    }

    /// Apply one delay sample.
    ///
    /// `rolling_average_ms` is the averaged delay across the recent history
    /// window when at least the policy's minimum sample count is available;
    /// it drives de-escalation only.
    pub fn observe(&self, record: &DelayRecord, rolling_average_ms: Option<i64>) -> ControlDecision {
        let policy = &self.policy;
        let mut state = self.state.lock();
        state.samples_since_transition = state.samples_since_transition.saturating_add(1);

        let previous = state.compensation_ms;
        let delay = record.delay_ms;
        let mut transition = None;

        if delay < policy.normal_threshold_ms {
            state.consecutive_delayed = 0;
            state.consecutive_normal += 1;
            if state.consecutive_normal >= policy.normal_streak {
                state.compensation_ms = (state.compensation_ms - policy.step_ms).max(0);
                state.consecutive_normal = 0;
                if state.compensation_ms != previous {
                    debug!(
                        from_secs = previous / 1000,
                        to_secs = state.compensation_ms / 1000,
                        "Sustained on-time execution; reducing compensation"
                    );
                }
            }

            transition = self.maybe_deescalate(&mut state, rolling_average_ms);
        } else if delay < policy.moderate_threshold_ms {
            state.consecutive_normal = 0;
            state.consecutive_delayed = 0;

            // Proportional control with a safety margin; move one step
            // toward the target instead of jumping, to avoid oscillation.
            let target = ((delay as f64) * policy.proportional_margin) as i64;
            let target = target.clamp(0, policy.max_compensation_ms);
            state.compensation_ms = if state.compensation_ms < target {
                (state.compensation_ms + policy.step_ms).min(target)
            } else {
                (state.compensation_ms - policy.step_ms).max(target)
            };
            if state.compensation_ms != previous {
                debug!(
                    target_secs = target / 1000,
                    to_secs = state.compensation_ms / 1000,
                    "Moderate delay; stepping compensation toward target"
                );
            }
        } else if delay < policy.severe_threshold_ms {
            state.consecutive_normal = 0;
            state.consecutive_delayed += 1;
            state.compensation_ms =
                (state.compensation_ms + policy.step_ms * 2).min(policy.max_compensation_ms);
            if state.compensation_ms != previous {
                warn!(
                    delay_secs = delay / 1000,
                    to_secs = state.compensation_ms / 1000,
                    "Large delay; increasing compensation fast"
                );
            }
        } else {
            state.consecutive_normal = 0;
            state.consecutive_delayed += 1;
            if state.compensation_ms < policy.max_compensation_ms {
                state.compensation_ms = policy.max_compensation_ms;
                warn!(
                    delay_secs = delay / 1000,
                    max_secs = policy.max_compensation_ms / 1000,
                    "Severe delay; clamping compensation to maximum"
                );
            }

            if state.consecutive_delayed >= policy.delay_streak
                && state.samples_since_transition >= policy.min_samples_for_average
            {
                transition = self.escalate(&mut state);
            }
        }

        ControlDecision {
            previous_compensation_ms: previous,
            compensation_ms: state.compensation_ms,
            selected_backend: state.selected_backend,
            transition,
        }
    }

    /// Reset compensation and counters to the initial baseline.
    ///
    /// Used by the consecutive-miss recovery path after the scheduler has
    /// been silent long enough that the learned state is stale.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.compensation_ms = self.policy.initial_compensation_ms;
        state.consecutive_normal = 0;
        state.consecutive_delayed = 0;
        state.samples_since_transition = 0;
        info!(
            compensation_secs = state.compensation_ms / 1000,
            "Compensation state reset to initial baseline"
        );
    }

    fn escalate(&self, state: &mut ControlState) -> Option<(BackendKind, BackendKind)> {
        let from = state.selected_backend;
        let to = from.escalated()?;
        state.selected_backend = to;
        // The new backend has different error characteristics; learned
        // compensation does not carry over.
        state.compensation_ms = self.policy.escalation_baseline_ms;
        state.consecutive_normal = 0;
        state.consecutive_delayed = 0;
        state.samples_since_transition = 0;
        info!(%from, %to, "Escalating to a more durable backend");
        Some((from, to))
    }

    fn maybe_deescalate(
        &self,
        state: &mut ControlState,
        rolling_average_ms: Option<i64>,
    ) -> Option<(BackendKind, BackendKind)> {
        if !state.selected_backend.is_durable() {
            return None;
        }
        if state.samples_since_transition < self.policy.min_samples_for_average {
            return None;
        }
        let average = rolling_average_ms?;
        if average >= self.policy.normal_threshold_ms {
            return None;
        }

        let from = state.selected_backend;
        let to = from.deescalated()?;
        state.selected_backend = to;
        // Conservative baseline, not zero, to avoid flapping straight back.
        state.compensation_ms = self.policy.deescalation_baseline_ms;
        state.consecutive_normal = 0;
        state.consecutive_delayed = 0;
        state.samples_since_transition = 0;
        info!(%from, %to, avg_delay_secs = average / 1000, "De-escalating to a cheaper backend");
        Some((from, to))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rewake_domain::DelayRecord;

    use super::*;

    fn sample(delay_ms: i64) -> DelayRecord {
        let intended = Utc::now();
        DelayRecord::executed(intended, intended + chrono::Duration::milliseconds(delay_ms))
    }

    fn controller() -> CompensationController {
        CompensationController::new(ControlPolicy::default(), BackendKind::Cooperative)
    }

    #[test]
    fn three_consecutive_normals_decrease_compensation() {
        let ctl = controller();
        let start = ctl.compensation_ms();

        let first = ctl.observe(&sample(5_000), None);
        let second = ctl.observe(&sample(8_000), None);
        assert_eq!(first.compensation_ms, start, "no decrease before the streak completes");
        assert_eq!(second.compensation_ms, start);

        let third = ctl.observe(&sample(3_000), None);
        assert_eq!(third.compensation_ms, start - ControlPolicy::default().step_ms);
        assert!(third.compensation_ms < start, "strictly decreases, never increases");
    }

    #[test]
    fn compensation_floor_is_zero() {
        let policy = ControlPolicy { initial_compensation_ms: 10_000, ..Default::default() };
        let ctl = CompensationController::new(policy, BackendKind::Cooperative);
        for _ in 0..12 {
            ctl.observe(&sample(1_000), None);
        }
        assert_eq!(ctl.compensation_ms(), 0);
    }

    #[test]
    fn moderate_band_steps_toward_target_without_jumping() {
        let policy = ControlPolicy { initial_compensation_ms: 0, ..Default::default() };
        let step = policy.step_ms;
        let ctl = CompensationController::new(policy, BackendKind::Cooperative);

        // Target is 60s * 1.2 = 72s; one observation moves a single step.
        let decision = ctl.observe(&sample(60_000), None);
        assert_eq!(decision.compensation_ms, step);

        let decision = ctl.observe(&sample(60_000), None);
        assert_eq!(decision.compensation_ms, step * 2);
    }

    #[test]
    fn fast_band_applies_double_step_capped() {
        let policy = ControlPolicy { initial_compensation_ms: 0, ..Default::default() };
        let step = policy.step_ms;
        let max = policy.max_compensation_ms;
        let ctl = CompensationController::new(policy, BackendKind::Cooperative);

        let decision = ctl.observe(&sample(120_000), None);
        assert_eq!(decision.compensation_ms, step * 2);

        for _ in 0..100 {
            ctl.observe(&sample(120_000), None);
        }
        assert_eq!(ctl.compensation_ms(), max);
    }

    #[test]
    fn two_severe_delays_escalate_exactly_once() {
        let ctl = controller();

        let first = ctl.observe(&sample(200_000), None);
        assert!(first.transition.is_none(), "a single outlier must not switch backends");
        assert_eq!(first.selected_backend, BackendKind::Cooperative);
        assert_eq!(first.compensation_ms, ControlPolicy::default().max_compensation_ms);

        let second = ctl.observe(&sample(200_000), None);
        assert_eq!(
            second.transition,
            Some((BackendKind::Cooperative, BackendKind::Queued))
        );
        // Fresh baseline, not the max carried over.
        assert_eq!(second.compensation_ms, ControlPolicy::default().escalation_baseline_ms);

        // No flapping right after the switch: the next two samples, severe
        // or not, must leave the selection alone while the new backend
        // settles.
        for _ in 0..2 {
            let next = ctl.observe(&sample(200_000), None);
            assert!(next.transition.is_none());
            assert_eq!(next.selected_backend, BackendKind::Queued);
        }
    }

    #[test]
    fn sustained_quiet_on_durable_backend_deescalates() {
        let ctl = CompensationController::new(ControlPolicy::default(), BackendKind::Queued);

        // First two quiet samples: the history window is still too small
        // for an averaged decision, so the caller passes no average.
        assert!(ctl.observe(&sample(2_000), None).transition.is_none());
        assert!(ctl.observe(&sample(2_000), None).transition.is_none());

        let third = ctl.observe(&sample(2_000), Some(2_000));
        assert_eq!(third.transition, Some((BackendKind::Queued, BackendKind::Cooperative)));
        assert_eq!(third.compensation_ms, ControlPolicy::default().deescalation_baseline_ms);
    }

    #[test]
    fn deescalation_requires_a_quiet_average() {
        let ctl = CompensationController::new(ControlPolicy::default(), BackendKind::Queued);
        for _ in 0..5 {
            let decision = ctl.observe(&sample(2_000), Some(45_000));
            assert!(decision.transition.is_none(), "noisy average must hold the backend");
        }
        assert_eq!(ctl.selected_backend(), BackendKind::Queued);
    }

    #[test]
    fn reset_restores_the_initial_baseline() {
        let ctl = controller();
        ctl.observe(&sample(120_000), None);
        assert_ne!(ctl.compensation_ms(), ControlPolicy::default().initial_compensation_ms);
        ctl.reset();
        assert_eq!(ctl.compensation_ms(), ControlPolicy::default().initial_compensation_ms);
        assert_eq!(ctl.streaks(), (0, 0));
    }
}
