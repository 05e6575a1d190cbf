//! Retry coordinator
//!
//! Runs one attempt of a job against its session's cancellation token, then
//! classifies the outcome into resolve, retry-after-backoff, or reject, and
//! feeds throttle/success signals to the rate controller.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::SchedulerError;
use crate::rate::RateController;

use super::config::RetryConfig;
use super::job::{FetchOutcome, Job, Operation};

/// What happened to a single attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome<T> {
    Success(T),
    Throttled { status: u16 },
    Failure(String),
    /// The session was cancelled before or during the attempt
    Cancelled,
    TimedOut(Duration),
}

impl<T> From<FetchOutcome<T>> for AttemptOutcome<T> {
    fn from(outcome: FetchOutcome<T>) -> Self {
        match outcome {
            FetchOutcome::Success(value) => AttemptOutcome::Success(value),
            FetchOutcome::Throttled { status } => AttemptOutcome::Throttled { status },
            FetchOutcome::Failure(message) => AttemptOutcome::Failure(message),
        }
    }
}

/// What the scheduler should do with a job after an attempt
#[derive(Debug, PartialEq, Eq)]
pub enum RetryDecision<T> {
    Resolve(T),
    /// Put the job back at the head of its session queue after a delay
    Retry { after: Duration },
    Reject(SchedulerError),
}

/// Run one attempt, racing the operation against session cancellation.
///
/// Cancellation never aborts I/O the operation already started; the
/// operation future is dropped and its result discarded.
pub async fn run_attempt<T>(
    operation: &Operation<T>,
    token: CancellationToken,
    timeout: Option<Duration>,
) -> AttemptOutcome<T> {
    if token.is_cancelled() {
        return AttemptOutcome::Cancelled;
    }

    let call = operation(token.clone());
    let guarded = async move {
        match timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(outcome) => outcome.into(),
                Err(_) => AttemptOutcome::TimedOut(limit),
            },
            None => call.await.into(),
        }
    };

    tokio::select! {
        biased;
        _ = token.cancelled() => AttemptOutcome::Cancelled,
        outcome = guarded => outcome,
    }
}

/// Decides the fate of a job after each attempt
#[derive(Debug, Clone)]
pub struct RetryCoordinator {
    config: RetryConfig,
}

impl RetryCoordinator {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Classify an attempt.
    ///
    /// `cancelled` carries the session's cancellation reason if the session
    /// is cancelled at decision time; it is the last check before a result is
    /// delivered.
    pub fn decide<T>(
        &self,
        job: &mut Job<T>,
        outcome: AttemptOutcome<T>,
        rate: &mut RateController,
        cancelled: Option<String>,
    ) -> RetryDecision<T> {
        let session_id = job.session_id.clone();
        let cancellation = |reason: String| SchedulerError::Cancelled {
            session_id: session_id.clone(),
            reason,
        };

        match outcome {
            AttemptOutcome::Success(value) => {
                rate.on_success();
                match cancelled {
                    Some(reason) => {
                        debug!(job_id = job.id, session_id = %job.session_id, "Discarding result for cancelled session");
                        RetryDecision::Reject(cancellation(reason))
                    }
                    None => RetryDecision::Resolve(value),
                }
            }
            AttemptOutcome::Throttled { status } => {
                rate.on_throttled();
                if let Some(reason) = cancelled {
                    return RetryDecision::Reject(cancellation(reason));
                }
                if job.retries < self.config.max_retries {
                    let after = self.config.backoff(job.retries);
                    job.retries += 1;
                    warn!(
                        job_id = job.id,
                        session_id = %job.session_id,
                        retry = job.retries,
                        ?after,
                        "Job throttled, retrying after backoff"
                    );
                    RetryDecision::Retry { after }
                } else {
                    warn!(job_id = job.id, session_id = %job.session_id, "Job throttled, retries exhausted");
                    RetryDecision::Reject(SchedulerError::Throttled {
                        attempts: job.retries + 1,
                        status,
                    })
                }
            }
            AttemptOutcome::Failure(message) => RetryDecision::Reject(SchedulerError::OperationFailed(message)),
            AttemptOutcome::Cancelled => {
                let reason = cancelled.unwrap_or_else(|| "cancelled".to_string());
                RetryDecision::Reject(cancellation(reason))
            }
            AttemptOutcome::TimedOut(limit) => RetryDecision::Reject(SchedulerError::TimedOut(limit)),
        }
    }
}
