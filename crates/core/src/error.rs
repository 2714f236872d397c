//! Scheduler error types

use rewake_domain::RewakeError;
use thiserror::Error;

/// Scheduler-specific errors
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Scheduler is already running
    #[error("Scheduler already running")]
    AlreadyRunning,

    /// Scheduler is not running
    #[error("Scheduler not running")]
    NotRunning,

    /// Every armed backend failed to schedule a trigger
    #[error("All backends failed to arm a trigger for task '{task_id}'")]
    AllBackendsFailed { task_id: String },

    /// No armed occurrence matches the given task id
    #[error("No armed occurrence for task '{task_id}'")]
    UnknownTask { task_id: String },

    /// Persisting or loading schedule state failed
    #[error("Schedule store failed: {0}")]
    StoreFailed(String),

    /// Operation timed out
    #[error("Operation timed out after {seconds}s")]
    Timeout { seconds: u64 },

    /// Task join failed
    #[error("Task join failed: {0}")]
    TaskJoinFailed(String),
}

/// Errors raised by a trigger backend when arming a one-shot trigger.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The underlying OS primitive refused the registration.
    #[error("Backend permission denied: {0}")]
    PermissionDenied(String),

    /// The backend could not schedule the trigger.
    #[error("Backend failed to schedule: {0}")]
    ScheduleFailed(String),

    /// The backend is shutting down and cannot accept triggers.
    #[error("Backend unavailable: {0}")]
    Unavailable(String),
}

impl From<SchedulerError> for RewakeError {
    fn from(err: SchedulerError) -> Self {
        match err {
            SchedulerError::AlreadyRunning | SchedulerError::NotRunning => {
                RewakeError::InvalidInput(err.to_string())
            }
            SchedulerError::AllBackendsFailed { .. } => RewakeError::Scheduling(err.to_string()),
            SchedulerError::UnknownTask { .. } => RewakeError::NotFound(err.to_string()),
            SchedulerError::StoreFailed(_) => RewakeError::Storage(err.to_string()),
            SchedulerError::Timeout { .. } | SchedulerError::TaskJoinFailed(_) => {
                RewakeError::Internal(err.to_string())
            }
        }
    }
}

impl From<BackendError> for RewakeError {
    fn from(err: BackendError) -> Self {
        RewakeError::Backend(err.to_string())
    }
}

/// Convenience type alias for scheduler operations
pub type SchedulerResult<T> = Result<T, SchedulerError>;
