//! Message and snapshot types for the Scheduler task

use std::time::Duration;

use serde::Serialize;
use tokio::sync::oneshot;

use crate::cancel::CancelReason;
use crate::rate::PacingTier;

use super::job::Job;
use super::retry::AttemptOutcome;

/// Internal requests to the Scheduler task
#[derive(Debug)]
pub enum SchedRequest<T> {
    /// Admit a new job
    Submit { job: Job<T> },

    /// A session was newly cancelled or completed in the registry
    Cancel { session_id: String, reason: CancelReason },

    /// The pacing timer fired
    Tick,

    /// An attempt finished (internal)
    Finished { job: Job<T>, outcome: AttemptOutcome<T> },

    /// A throttled job's backoff elapsed (internal)
    Requeue { job: Job<T> },

    /// A cancellation record reached its retention limit (internal)
    ExpireCancellation { session_id: String },

    /// Get a status snapshot
    GetStatus {
        session_id: Option<String>,
        reply_tx: oneshot::Sender<SchedulerStatus>,
    },

    /// Shutdown the scheduler
    Shutdown,
}

/// Cumulative counters
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct SchedulerStats {
    pub total_submitted: u64,
    pub total_completed: u64,
    pub total_throttled: u64,
    pub total_retried: u64,
    pub total_cancelled: u64,
    pub total_failed: u64,
    pub peak_queue_depth: usize,
    pub peak_concurrent: usize,
}

/// Read-only snapshot for progress reporting
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    /// Jobs queued across all sessions
    #[serde(rename = "queue-size")]
    pub queue_size: usize,

    /// Attempts currently executing
    #[serde(rename = "active-requests")]
    pub active_requests: usize,

    /// Current pacing interval
    #[serde(rename = "current-interval-ms", serialize_with = "as_millis")]
    pub current_interval: Duration,

    #[serde(rename = "pacing-tier", serialize_with = "as_debug")]
    pub pacing_tier: PacingTier,

    /// Sessions served before the requested one; None if it has nothing queued
    #[serde(rename = "waiting-sessions-ahead")]
    pub waiting_sessions_ahead: Option<usize>,

    /// Jobs queued for the requested session
    #[serde(rename = "session-queued")]
    pub session_queued: usize,

    /// Sessions with queued work
    #[serde(rename = "total-sessions")]
    pub total_sessions: usize,

    pub stats: SchedulerStats,
}

fn as_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

fn as_debug<S: serde::Serializer>(tier: &PacingTier, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&format!("{:?}", tier).to_lowercase())
}
