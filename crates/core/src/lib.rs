//! # Rewake Core
//!
//! Scheduling logic for the adaptive multi-backend scheduler.
//!
//! This crate contains:
//! - Port traits for every OS seam (trigger backends, wake source, clock,
//!   schedule store, task executor)
//! - The exactly-once execution claim
//! - The redundancy coordinator that arms one primary and two secondary
//!   triggers per occurrence
//! - The delay monitor and the compensation feedback controller
//! - The scheduler facade that wires everything together
//!
//! ## Architecture
//! - Depends on `rewake-domain` for data types
//! - Defines traits implemented by `rewake-infra`
//! - No direct OS access; all waiting happens behind the port traits

pub mod claim;
pub mod compensation;
pub mod coordinator;
pub mod delay;
pub mod error;
pub mod facade;
pub mod guard;
pub mod ports;

pub use claim::ExecutionClaim;
pub use compensation::{CompensationController, ControlDecision, ControlPolicy};
pub use coordinator::{
    CoordinatorConfig, ExecutionListener, RedundancyCoordinator, TriggerCounters,
};
pub use delay::{DelayMonitor, DelayMonitorConfig};
pub use error::{BackendError, SchedulerError, SchedulerResult};
pub use facade::{BackendSet, Scheduler, SchedulerConfig};
pub use guard::{WakeGuard, WakeGuardConfig};
pub use ports::{
    Clock, FireCallback, NoopWakeSource, ScheduleStore, SystemClock, TaskExecutor, TriggerBackend,
    TriggerHandle, WakeSource,
};
