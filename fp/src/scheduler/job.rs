//! Jobs and the outcomes their operations report

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::SchedulerError;

/// Outcome of one upstream call, as classified by the operation itself
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome<T> {
    /// The call returned a usable payload
    Success(T),

    /// The upstream rejected the call for rate limiting
    Throttled { status: u16 },

    /// Any other failure; not retried
    Failure(String),
}

impl<T> FetchOutcome<T> {
    pub fn is_throttled(&self) -> bool {
        matches!(self, FetchOutcome::Throttled { .. })
    }

    /// Map an HTTP-style status into an outcome, treating 429 as throttling
    pub fn from_status(status: u16, payload: impl FnOnce() -> T) -> Self {
        match status {
            200..=299 => FetchOutcome::Success(payload()),
            429 => FetchOutcome::Throttled { status },
            _ => FetchOutcome::Failure(format!("upstream returned status {}", status)),
        }
    }
}

/// A re-runnable upstream call. It receives the session's cancellation
/// token so it can stop cooperatively at its own suspension points.
pub type Operation<T> = Arc<dyn Fn(CancellationToken) -> BoxFuture<'static, FetchOutcome<T>> + Send + Sync>;

/// Box a closure returning a future into an [`Operation`]
pub fn operation<T, F, Fut>(f: F) -> Operation<T>
where
    T: Send + 'static,
    F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = FetchOutcome<T>> + Send + 'static,
{
    Arc::new(move |token| -> BoxFuture<'static, FetchOutcome<T>> { Box::pin(f(token)) })
}

/// Sender half used to settle a job's caller-visible future
pub type ReplyTx<T> = oneshot::Sender<Result<T, SchedulerError>>;

/// One unit of scheduled work
///
/// Owned by its session queue until dequeued, then by the executing task,
/// then by the scheduler again while it decides to resolve or retry.
pub struct Job<T> {
    pub id: u64,
    pub session_id: String,
    pub operation: Operation<T>,
    pub submitted_at: Instant,
    /// Throttle retries already scheduled for this job
    pub retries: u32,
    reply_tx: ReplyTx<T>,
}

impl<T> Job<T> {
    pub fn new(id: u64, session_id: impl Into<String>, operation: Operation<T>, reply_tx: ReplyTx<T>) -> Self {
        Self {
            id,
            session_id: session_id.into(),
            operation,
            submitted_at: Instant::now(),
            retries: 0,
            reply_tx,
        }
    }

    /// Settle the caller's future. A caller that stopped waiting is ignored.
    pub fn settle(self, result: Result<T, SchedulerError>) {
        let _ = self.reply_tx.send(result);
    }

    pub fn resolve(self, value: T) {
        self.settle(Ok(value));
    }

    pub fn reject(self, err: SchedulerError) {
        self.settle(Err(err));
    }

    /// Whether the caller dropped its handle
    pub fn is_abandoned(&self) -> bool {
        self.reply_tx.is_closed()
    }
}

impl<T> fmt::Debug for Job<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("session_id", &self.session_id)
            .field("retries", &self.retries)
            .field("submitted_at", &self.submitted_at)
            .finish_non_exhaustive()
    }
}
