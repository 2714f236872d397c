//! Error types used throughout the scheduler

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for rewake
#[derive(Error, Debug, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum RewakeError {
    #[error("Scheduling error: {0}")]
    Scheduling(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Payload error: {0}")]
    Payload(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for rewake operations
pub type Result<T> = std::result::Result<T, RewakeError>;
