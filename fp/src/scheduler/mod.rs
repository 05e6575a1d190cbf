//! Scheduler for upstream fare queries
//!
//! A single task owns every session queue and serves them round-robin,
//! spacing call starts by the adaptive interval from [`crate::rate`] and
//! capping concurrent calls. Throttled jobs are retried with exponential
//! backoff; cancelled sessions are purged without touching other sessions.

mod config;
mod core;
mod handle;
mod job;
mod messages;
mod queue;
mod retry;

pub use config::{RetryConfig, SchedulerConfig};
pub use core::Scheduler;
pub use handle::{JobHandle, SchedulerHandle};
pub use job::{FetchOutcome, Job, Operation, operation};
pub use messages::{SchedRequest, SchedulerStats, SchedulerStatus};
pub use queue::SessionQueues;
pub use retry::{AttemptOutcome, RetryCoordinator, RetryDecision, run_attempt};
