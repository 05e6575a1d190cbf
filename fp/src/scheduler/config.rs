//! Scheduler configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::cancel::CancellationConfig;
use crate::rate::PacingConfig;

/// Scheduler configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Max concurrent upstream calls across all sessions
    #[serde(rename = "max-concurrent")]
    pub max_concurrent: usize,

    /// Optional deadline for a single attempt. Unset means attempts may run
    /// indefinitely and hold their concurrency slot.
    #[serde(rename = "job-timeout-ms")]
    pub job_timeout_ms: Option<u64>,

    /// Throttle retry policy
    pub retry: RetryConfig,

    /// Adaptive pacing between call starts
    pub pacing: PacingConfig,

    /// Retention of cancelled/completed session records
    pub cancellation: CancellationConfig,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 3,
            job_timeout_ms: None,
            retry: RetryConfig::default(),
            pacing: PacingConfig::default(),
            cancellation: CancellationConfig::default(),
        }
    }
}

impl SchedulerConfig {
    /// Get the attempt deadline as a Duration
    pub fn job_timeout(&self) -> Option<Duration> {
        self.job_timeout_ms.map(Duration::from_millis)
    }
}

/// Retry policy for throttled jobs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries allowed per job after a throttle
    #[serde(rename = "max-retries")]
    pub max_retries: u32,

    /// Backoff before the first retry; doubles for each later retry
    #[serde(rename = "base-backoff-ms")]
    pub base_backoff_ms: u64,

    /// Upper bound on backoff
    #[serde(rename = "max-backoff-ms")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_backoff_ms: 2000,
            max_backoff_ms: 8000,
        }
    }
}

impl RetryConfig {
    /// Backoff before retry number `retry` (0-based)
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u64.checked_shl(retry).unwrap_or(u64::MAX);
        let ms = self.base_backoff_ms.saturating_mul(factor).min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }
}
