//! Configuration loader
//!
//! Loads application configuration from environment variables or files.
//!
//! ## Loading Strategy
//! 1. First, attempts to load from environment variables
//! 2. If incomplete, falls back to loading from file
//! 3. Probes multiple paths for config files
//! 4. Supports JSON and TOML formats
//!
//! ## Environment Variables
//! - `REWAKE_TASK_ID`: Identifier of the recurring task
//! - `REWAKE_SWEEP_INTERVAL`: Delay-monitor sweep interval in seconds
//! - `REWAKE_WAKE_AHEAD`: Optional pre-fire wake window in seconds
//! - `REWAKE_COMPENSATION_STEP`: Compensation adjustment step in seconds
//! - `REWAKE_COMPENSATION_INITIAL`: Initial compensation in seconds
//! - `REWAKE_COMPENSATION_MAX`: Compensation ceiling in seconds
//! - `REWAKE_STORE_PATH`: Path of the persisted schedule file
//!
//! ## File Locations
//! The loader probes the following paths (in order):
//! 1. `./config.json` or `./config.toml` (current working directory)
//! 2. `./rewake.json` or `./rewake.toml` (current working directory)
//! 3. `../config.json` or `../config.toml` (parent directory)
//! 4. Relative to executable location

use std::path::{Path, PathBuf};
use std::time::Duration;

use rewake_core::{ControlPolicy, SchedulerConfig};
use rewake_domain::{
    Config, ControlTuning, Result, RewakeError, SchedulingConfig, StoreConfig,
};

/// Load configuration with automatic fallback strategy
///
/// First attempts to load from environment variables. If any required
/// variables are missing, falls back to loading from a config file.
///
/// # Errors
/// Returns `RewakeError::Config` if configuration cannot be loaded from
/// either source.
pub fn load() -> Result<Config> {
    match load_from_env() {
        Ok(config) => {
            tracing::info!("Configuration loaded from environment variables");
            Ok(config)
        }
        Err(e) => {
            tracing::debug!(error = ?e, "Failed to load from environment, trying file");
            load_from_file(None)
        }
    }
}

/// Load configuration from environment variables
///
/// All required environment variables must be present. Returns an error
/// if any are missing.
///
/// # Errors
/// Returns `RewakeError::Config` if required variables are missing or
/// have invalid values.
pub fn load_from_env() -> Result<Config> {
    let task_id = env_var("REWAKE_TASK_ID")?;
    let sweep_interval_seconds = env_u64("REWAKE_SWEEP_INTERVAL")?;
    let wake_ahead_seconds = match std::env::var("REWAKE_WAKE_AHEAD") {
        Ok(raw) => Some(raw.parse::<u64>().map_err(|e| {
            RewakeError::Config(format!("Invalid wake-ahead window: {}", e))
        })?),
        Err(_) => None,
    };

    let step_seconds = env_u64("REWAKE_COMPENSATION_STEP")?;
    let initial_compensation_seconds = env_u64("REWAKE_COMPENSATION_INITIAL")?;
    let max_compensation_seconds = env_u64("REWAKE_COMPENSATION_MAX")?;
    let store_path = env_var("REWAKE_STORE_PATH")?;

    Ok(Config {
        scheduler: SchedulingConfig { task_id, sweep_interval_seconds, wake_ahead_seconds },
        control: ControlTuning {
            step_seconds,
            initial_compensation_seconds,
            max_compensation_seconds,
        },
        store: StoreConfig { path: store_path },
    })
}

/// Load configuration from a file
///
/// If `path` is `None`, probes multiple locations for config files.
/// Supports both JSON and TOML formats (detected by file extension).
///
/// # Errors
/// Returns `RewakeError::Config` if no file is found or the contents are
/// invalid.
pub fn load_from_file(path: Option<PathBuf>) -> Result<Config> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(RewakeError::Config(format!("Config file not found: {}", p.display())));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            RewakeError::Config("No config file found in any of the standard locations".to_string())
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| RewakeError::Config(format!("Failed to read config file: {}", e)))?;

    parse_config(&contents, &config_path)
}

/// Parse configuration from string content
///
/// Format is detected by file extension (`.json` or `.toml`).
fn parse_config(contents: &str, path: &Path) -> Result<Config> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| RewakeError::Config(format!("Invalid TOML format: {}", e))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| RewakeError::Config(format!("Invalid JSON format: {}", e))),
        _ => Err(RewakeError::Config(format!("Unsupported config format: {}", extension))),
    }
}

/// Probe multiple paths for configuration files
///
/// # Returns
/// The first config file found, or `None` if no file exists.
pub fn probe_config_paths() -> Option<PathBuf> {
    let mut candidates = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        candidates.extend(vec![
            cwd.join("config.json"),
            cwd.join("config.toml"),
            cwd.join("rewake.json"),
            cwd.join("rewake.toml"),
            cwd.join("../config.json"),
            cwd.join("../config.toml"),
        ]);
    }

    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            candidates.extend(vec![
                exe_dir.join("config.json"),
                exe_dir.join("config.toml"),
                exe_dir.join("rewake.json"),
                exe_dir.join("rewake.toml"),
            ]);
        }
    }

    candidates.into_iter().find(|path| path.exists())
}

/// Map the loaded configuration onto a runnable [`SchedulerConfig`].
///
/// Thresholds, offsets, and streak lengths keep their built-in defaults;
/// only the operator-facing knobs come from the file.
pub fn scheduler_config(config: &Config) -> SchedulerConfig {
    let policy = ControlPolicy {
        step_ms: (config.control.step_seconds * 1000) as i64,
        initial_compensation_ms: (config.control.initial_compensation_seconds * 1000) as i64,
        max_compensation_ms: (config.control.max_compensation_seconds * 1000) as i64,
        ..ControlPolicy::default()
    };

    SchedulerConfig {
        task_id: config.scheduler.task_id.clone(),
        policy,
        sweep_interval: Duration::from_secs(config.scheduler.sweep_interval_seconds),
        wake_ahead_ms: config.scheduler.wake_ahead_seconds.map(|s| (s * 1000) as i64),
        ..SchedulerConfig::default()
    }
}

/// Get required environment variable
fn env_var(key: &str) -> Result<String> {
    std::env::var(key)
        .map_err(|_| RewakeError::Config(format!("Missing required environment variable: {}", key)))
}

/// Get required numeric environment variable
fn env_u64(key: &str) -> Result<u64> {
    env_var(key)?
        .parse::<u64>()
        .map_err(|e| RewakeError::Config(format!("Invalid value for {}: {}", key, e)))
}
