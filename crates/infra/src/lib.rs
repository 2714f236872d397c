//! # Rewake Infra
//!
//! Concrete adapters behind the `rewake-core` port traits.
//!
//! This crate contains:
//! - The three trigger backend implementations (cooperative, queued, clock)
//! - JSON file persistence for the schedule state
//! - The configuration loader (environment variables with file fallback)
//!
//! ## Architecture
//! - Implements traits defined in `rewake-core`
//! - The only crate that touches the filesystem and process environment
//! - Hosts with real OS wake timers plug in through the `WakeTimer` port

pub mod backends;
pub mod config;
pub mod store;

pub use backends::{
    default_backend_set, ClockBackend, CooperativeBackend, InProcessWakeTimer, QueuedBackend,
    QueuedBackendConfig, WakeTimer,
};
pub use config::{load, load_from_env, load_from_file, scheduler_config};
pub use store::JsonScheduleStore;
