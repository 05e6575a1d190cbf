//! Scheduler error types

use std::time::Duration;
use thiserror::Error;

/// Errors delivered to the caller of a scheduled job
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("Session {session_id} cancelled: {reason}")]
    Cancelled { session_id: String, reason: String },

    #[error("Upstream throttled after {attempts} attempts (status {status})")]
    Throttled { attempts: u32, status: u16 },

    #[error("Operation failed: {0}")]
    OperationFailed(String),

    #[error("Operation timed out after {0:?}")]
    TimedOut(Duration),

    #[error("Scheduler shut down")]
    Shutdown,
}

impl SchedulerError {
    /// Check if this is a cancellation (a soft stop, not worth alarming the user)
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SchedulerError::Cancelled { .. })
    }

    /// Check if this is a throttling failure that exhausted its retries
    pub fn is_throttled(&self) -> bool {
        matches!(self, SchedulerError::Throttled { .. })
    }

    /// Check if this error should be reported to the user as a genuine failure
    pub fn is_reportable(&self) -> bool {
        match self {
            SchedulerError::Cancelled { .. } => false,
            SchedulerError::Shutdown => false,
            SchedulerError::Throttled { .. } => true,
            SchedulerError::OperationFailed(_) => true,
            SchedulerError::TimedOut(_) => true,
        }
    }
}
