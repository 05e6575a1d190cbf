//! SchedulerHandle - Client interface for submitting and cancelling work

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};

use eyre::{Result, eyre};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::cancel::{CancelOutcome, CancelReason, SharedRegistry};
use crate::error::SchedulerError;

use super::job::{FetchOutcome, Job, Operation, operation};
use super::messages::{SchedRequest, SchedulerStatus};

/// Handle for callers to interact with the Scheduler
///
/// This handle is cloneable. Submission and cancellation never wait on the
/// scheduler task; only `status` does.
pub struct SchedulerHandle<T> {
    tx: mpsc::UnboundedSender<SchedRequest<T>>,
    registry: SharedRegistry,
    next_id: Arc<AtomicU64>,
}

impl<T> Clone for SchedulerHandle<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            registry: self.registry.clone(),
            next_id: self.next_id.clone(),
        }
    }
}

impl<T: Send + 'static> SchedulerHandle<T> {
    pub(crate) fn new(
        tx: mpsc::UnboundedSender<SchedRequest<T>>,
        registry: SharedRegistry,
        next_id: Arc<AtomicU64>,
    ) -> Self {
        Self { tx, registry, next_id }
    }

    /// Submit an operation on behalf of a session.
    ///
    /// Always admits the job; the returned handle settles with the
    /// operation's payload or a [`SchedulerError`].
    pub fn submit<F, Fut>(&self, session_id: impl Into<String>, f: F) -> JobHandle<T>
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = FetchOutcome<T>> + Send + 'static,
    {
        self.submit_operation(session_id, operation(f))
    }

    /// Submit an already boxed operation
    pub fn submit_operation(&self, session_id: impl Into<String>, operation: Operation<T>) -> JobHandle<T> {
        let session_id = session_id.into();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(job_id = id, %session_id, "SchedulerHandle::submit: called");

        let (reply_tx, reply_rx) = oneshot::channel();
        let job = Job::new(id, session_id.clone(), operation, reply_tx);
        if let Err(e) = self.tx.send(SchedRequest::Submit { job }) {
            // The job comes back inside the error; rejecting it settles the handle
            if let SchedRequest::Submit { job } = e.0 {
                job.reject(SchedulerError::Shutdown);
            }
        }

        JobHandle {
            id,
            session_id,
            rx: reply_rx,
        }
    }

    /// Mark a session cancelled or completed. Idempotent.
    pub fn cancel(&self, session_id: &str, reason: impl Into<CancelReason>) -> CancelOutcome {
        let reason = reason.into();
        debug!(%session_id, %reason, "SchedulerHandle::cancel: called");
        let outcome = self
            .registry
            .with(|reg| reg.cancel(session_id, reason.clone(), Instant::now()));

        if outcome.is_new() {
            let request = SchedRequest::Cancel {
                session_id: session_id.to_string(),
                reason,
            };
            if self.tx.send(request).is_err() {
                debug!(%session_id, "SchedulerHandle::cancel: scheduler already stopped");
            }
        } else {
            debug!(%session_id, ?outcome, "SchedulerHandle::cancel: already registered, ignoring");
        }
        outcome
    }

    /// Mark a session's work as finished
    pub fn complete(&self, session_id: &str) -> CancelOutcome {
        self.cancel(session_id, CancelReason::Completed)
    }

    /// Synchronous check, usable from inside a running operation
    pub fn is_cancelled(&self, session_id: &str) -> bool {
        self.registry.is_cancelled(session_id)
    }

    /// Snapshot of queue depth, pacing and position for progress reporting
    pub async fn status(&self, session_id: Option<&str>) -> Result<SchedulerStatus> {
        debug!(?session_id, "SchedulerHandle::status: called");
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(SchedRequest::GetStatus {
                session_id: session_id.map(str::to_string),
                reply_tx,
            })
            .map_err(|_| eyre!("Scheduler channel closed"))?;

        reply_rx.await.map_err(|_| eyre!("Scheduler shut down before replying"))
    }

    /// Stop the scheduler, rejecting queued jobs
    pub fn shutdown(&self) -> Result<()> {
        debug!("SchedulerHandle::shutdown: called");
        self.tx
            .send(SchedRequest::Shutdown)
            .map_err(|_| eyre!("Scheduler channel closed"))
    }
}

/// Caller-side future for one submitted job
#[derive(Debug)]
pub struct JobHandle<T> {
    id: u64,
    session_id: String,
    rx: oneshot::Receiver<Result<T, SchedulerError>>,
}

impl<T> JobHandle<T> {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

impl<T> Future for JobHandle<T> {
    type Output = Result<T, SchedulerError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|settled| settled.unwrap_or(Err(SchedulerError::Shutdown)))
    }
}
