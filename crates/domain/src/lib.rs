//! # Rewake Domain
//!
//! Domain types and models for the rewake scheduler.
//!
//! This crate contains:
//! - Scheduling data types (ScheduleRequest, DelayRecord, etc.)
//! - Domain error types and Result definitions
//! - Domain constants (thresholds, offsets, capacities)
//! - Configuration types consumed by the infra loader
//!
//! ## Architecture
//! - No dependencies on other rewake crates
//! - Only external dependencies allowed
//! - Pure domain models and data structures

pub mod config;
pub mod constants;
pub mod errors;
pub mod types;

// Re-export commonly used items
pub use config::{Config, ControlTuning, SchedulingConfig, StoreConfig};
pub use errors::*;
pub use types::*;
