//! Configuration management

use serde::{Deserialize, Serialize};

use crate::constants;

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub scheduler: SchedulingConfig,
    pub control: ControlTuning,
    pub store: StoreConfig,
}

/// Scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulingConfig {
    /// Identifier of the recurring task.
    pub task_id: String,
    /// Seconds between delay-monitor sweeps.
    pub sweep_interval_seconds: u64,
    /// Optional pre-fire wake window in seconds. `None` disables it.
    #[serde(default)]
    pub wake_ahead_seconds: Option<u64>,
}

/// Compensation control tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlTuning {
    pub step_seconds: u64,
    pub initial_compensation_seconds: u64,
    pub max_compensation_seconds: u64,
}

/// Schedule persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path of the persisted schedule file.
    pub path: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scheduler: SchedulingConfig {
                task_id: "rewake.recurring".to_string(),
                sweep_interval_seconds: constants::SWEEP_INTERVAL_MS / 1000,
                wake_ahead_seconds: None,
            },
            control: ControlTuning {
                step_seconds: (constants::COMPENSATION_STEP_MS / 1000) as u64,
                initial_compensation_seconds: (constants::INITIAL_COMPENSATION_MS / 1000) as u64,
                max_compensation_seconds: (constants::MAX_COMPENSATION_MS / 1000) as u64,
            },
            store: StoreConfig { path: "rewake-schedule.json".to_string() },
        }
    }
}
