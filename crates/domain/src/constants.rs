//! Domain constants
//!
//! Centralized defaults for the adaptive scheduling policy. These are the
//! empirically tuned starting points; every one of them is overridable
//! through the configuration structs that carry them.

/// Delay below this is considered a normal, on-time execution (ms).
pub const DELAY_THRESHOLD_NORMAL_MS: i64 = 30_000;
/// Delay between normal and this is handled by proportional control (ms).
pub const DELAY_THRESHOLD_MODERATE_MS: i64 = 90_000;
/// Delay at or above this counts toward backend escalation (ms).
pub const DELAY_THRESHOLD_SEVERE_MS: i64 = 180_000;

/// Step applied when nudging the compensation value (ms).
pub const COMPENSATION_STEP_MS: i64 = 15_000;
/// Initial lead-time compensation applied to new schedulers (ms).
pub const INITIAL_COMPENSATION_MS: i64 = 120_000;
/// Hard upper bound on the compensation value (ms).
pub const MAX_COMPENSATION_MS: i64 = 600_000;
/// Compensation restored when de-escalating to a cheaper backend (ms).
pub const DEESCALATION_BASELINE_MS: i64 = 60_000;

/// Safety margin used by the proportional band (target = delay * 1.2).
pub const PROPORTIONAL_MARGIN: f64 = 1.2;

/// Consecutive normal executions required before reducing compensation.
pub const NORMAL_STREAK_FOR_DECREASE: u32 = 3;
/// Consecutive severe delays required before escalating the backend.
pub const DELAY_STREAK_FOR_ESCALATION: u32 = 2;
/// Consecutive misses that trigger a full compensation reset.
pub const MISS_STREAK_FOR_RESET: u32 = 3;
/// Minimum samples before averaged decisions (de-escalation) apply.
pub const MIN_SAMPLES_FOR_AVERAGE: usize = 3;

/// First secondary trigger offset past the intended time (ms).
pub const SECONDARY_OFFSET_FIRST_MS: i64 = 15_000;
/// Second secondary trigger offset past the intended time (ms).
pub const SECONDARY_OFFSET_SECOND_MS: i64 = 35_000;

/// Capacity of the delay history ring buffer.
pub const DELAY_HISTORY_CAPACITY: usize = 10;
/// Interval between delay-monitor sweeps (ms).
pub const SWEEP_INTERVAL_MS: u64 = 10_000;
/// Grace window before an unexecuted occurrence counts as missed (ms).
pub const MISS_GRACE_WINDOW_MS: i64 = 300_000;

/// Slack added to the queued backend's minimum latency (ms).
pub const QUEUED_WINDOW_SLACK_MS: i64 = 45_000;

/// Hard ceiling on how long the wake guard may stay held (ms).
pub const WAKE_GUARD_CEILING_MS: u64 = 900_000;
