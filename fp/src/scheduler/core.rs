//! Main Scheduler task implementation

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::cancel::{CancelReason, SharedRegistry};
use crate::error::SchedulerError;
use crate::rate::RateController;

use super::config::SchedulerConfig;
use super::handle::SchedulerHandle;
use super::job::Job;
use super::messages::{SchedRequest, SchedulerStats, SchedulerStatus};
use super::queue::SessionQueues;
use super::retry::{AttemptOutcome, RetryCoordinator, RetryDecision, run_attempt};

/// The Scheduler owns every queue, the pacing state, and the concurrency
/// slots. Callers talk to it through [`SchedulerHandle`].
pub struct Scheduler<T> {
    config: SchedulerConfig,
    tx: mpsc::UnboundedSender<SchedRequest<T>>,
    rx: mpsc::UnboundedReceiver<SchedRequest<T>>,
    registry: SharedRegistry,
    next_id: Arc<AtomicU64>,
}

impl<T: Send + 'static> Scheduler<T> {
    /// Create a new Scheduler with the given configuration
    pub fn new(config: SchedulerConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let registry = SharedRegistry::new(config.cancellation.clone());
        Self {
            config,
            tx,
            rx,
            registry,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Create a handle for submitting work
    pub fn handle(&self) -> SchedulerHandle<T> {
        SchedulerHandle::new(self.tx.clone(), self.registry.clone(), self.next_id.clone())
    }

    /// Start the scheduler task and return a handle to it
    pub fn spawn(self) -> (SchedulerHandle<T>, JoinHandle<()>) {
        let handle = self.handle();
        let task = tokio::spawn(self.run());
        (handle, task)
    }

    /// Run the Scheduler task
    ///
    /// This consumes the Scheduler and runs until shutdown is requested.
    pub async fn run(mut self) {
        let mut core = SchedulerCore::new(self.config, self.tx.clone(), self.registry);

        info!(
            max_concurrent = core.config.max_concurrent,
            base_interval = ?core.rate.current_interval(),
            "Scheduler started"
        );

        while let Some(req) = self.rx.recv().await {
            if !core.handle(req) {
                break;
            }
        }

        info!(
            completed = core.stats.total_completed,
            throttled = core.stats.total_throttled,
            cancelled = core.stats.total_cancelled,
            "Scheduler stopped"
        );
    }
}

/// State owned by the running task
struct SchedulerCore<T> {
    config: SchedulerConfig,
    tx: mpsc::UnboundedSender<SchedRequest<T>>,
    registry: SharedRegistry,
    queues: SessionQueues<Job<T>>,
    rate: RateController,
    retry: RetryCoordinator,
    active: usize,
    /// A Tick is scheduled and has not fired yet
    timer_pending: bool,
    /// Executing attempts per session; the token is released when it hits zero
    in_flight: HashMap<String, usize>,
    stats: SchedulerStats,
}

impl<T: Send + 'static> SchedulerCore<T> {
    fn new(config: SchedulerConfig, tx: mpsc::UnboundedSender<SchedRequest<T>>, registry: SharedRegistry) -> Self {
        let rate = RateController::new(config.pacing.clone());
        let retry = RetryCoordinator::new(config.retry.clone());
        Self {
            config,
            tx,
            registry,
            queues: SessionQueues::new(),
            rate,
            retry,
            active: 0,
            timer_pending: false,
            in_flight: HashMap::new(),
            stats: SchedulerStats::default(),
        }
    }

    /// Process one request. Returns false once the task should stop.
    fn handle(&mut self, req: SchedRequest<T>) -> bool {
        match req {
            SchedRequest::Submit { job } => self.on_submit(job),
            SchedRequest::Cancel { session_id, reason } => self.on_cancel(&session_id, reason),
            SchedRequest::Tick => {
                self.timer_pending = false;
                // A throttle may have widened the interval while the timer was armed
                let wait = self.rate.remaining_wait(Instant::now());
                if wait.is_zero() {
                    self.dispatch_next();
                } else {
                    debug!(?wait, "SchedulerCore: interval widened, deferring dispatch");
                }
            }
            SchedRequest::Finished { job, outcome } => self.on_finished(job, outcome),
            SchedRequest::Requeue { job } => self.on_requeue(job),
            SchedRequest::ExpireCancellation { session_id } => {
                let now = Instant::now();
                let expired = self.registry.with(|reg| reg.prune(now));
                if expired > 0 {
                    debug!(%session_id, expired, "SchedulerCore: cancellation records expired");
                }
            }
            SchedRequest::GetStatus { session_id, reply_tx } => {
                let _ = reply_tx.send(self.status(session_id.as_deref()));
            }
            SchedRequest::Shutdown => {
                info!(queued = self.queues.len(), "Scheduler shutting down");
                for job in self.queues.drain_all() {
                    job.reject(SchedulerError::Shutdown);
                }
                return false;
            }
        }
        self.pump();
        true
    }

    fn on_submit(&mut self, job: Job<T>) {
        self.stats.total_submitted += 1;
        if self.registry.is_cancelled(&job.session_id) {
            debug!(job_id = job.id, session_id = %job.session_id, "Rejecting submit for cancelled session");
            self.reject_cancelled(vec![job]);
            return;
        }

        debug!(job_id = job.id, session_id = %job.session_id, "Job queued");
        let session_id = job.session_id.clone();
        self.queues.push_back(&session_id, job);
        self.stats.peak_queue_depth = self.stats.peak_queue_depth.max(self.queues.len());
    }

    fn on_cancel(&mut self, session_id: &str, reason: CancelReason) {
        let removed = self.queues.remove_session(session_id);
        let expiry = self.registry.with(|reg| reg.expiry_for(&reason));

        if reason.is_completion() {
            debug!(%session_id, leftover = removed.len(), "Session completed");
        } else {
            info!(%session_id, %reason, removed = removed.len(), "Session cancelled");
        }
        self.reject_cancelled(removed);

        let tx = self.tx.clone();
        let session_id = session_id.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(expiry).await;
            let _ = tx.send(SchedRequest::ExpireCancellation { session_id });
        });
    }

    /// Arm the pacing timer if there is work and a free slot
    fn pump(&mut self) {
        if self.timer_pending || self.queues.is_empty() || self.active >= self.config.max_concurrent {
            return;
        }

        let delay = self.rate.time_until_next_slot(Instant::now());
        self.timer_pending = true;
        let tx = self.tx.clone();
        if delay.is_zero() {
            let _ = tx.send(SchedRequest::Tick);
        } else {
            debug!(?delay, "SchedulerCore::pump: waiting for next slot");
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let _ = tx.send(SchedRequest::Tick);
            });
        }
    }

    /// Start at most one job
    fn dispatch_next(&mut self) {
        if self.active >= self.config.max_concurrent {
            return;
        }

        let registry = self.registry.clone();
        let is_cancelled = |session_id: &str| registry.is_cancelled(session_id);

        let purged = self.queues.cleanup(is_cancelled);
        self.reject_cancelled(purged);

        loop {
            let mut purged = Vec::new();
            let next = self.queues.pop_next(is_cancelled, &mut purged);
            self.reject_cancelled(purged);

            let Some((session_id, job)) = next else {
                return;
            };

            // The session may have been cancelled since the ring was scanned
            if self.registry.is_cancelled(&session_id) {
                self.reject_cancelled(vec![job]);
                continue;
            }

            if job.is_abandoned() {
                debug!(job_id = job.id, %session_id, "Skipping job whose caller went away");
                continue;
            }

            self.start(session_id, job);
            return;
        }
    }

    fn start(&mut self, session_id: String, job: Job<T>) {
        let now = Instant::now();
        self.active += 1;
        self.stats.peak_concurrent = self.stats.peak_concurrent.max(self.active);
        *self.in_flight.entry(session_id.clone()).or_default() += 1;
        self.rate.record_call_start(now);

        let token = self.registry.with(|reg| reg.token(&session_id));
        let timeout = self.config.job_timeout();
        debug!(
            job_id = job.id,
            %session_id,
            retry = job.retries,
            waited = ?now.duration_since(job.submitted_at),
            active = self.active,
            "Dispatching job"
        );

        let tx = self.tx.clone();
        tokio::spawn(async move {
            // A panicking operation still has to hand its slot back
            let attempt = AssertUnwindSafe(run_attempt(&job.operation, token, timeout)).catch_unwind();
            let outcome = match attempt.await {
                Ok(outcome) => outcome,
                Err(_) => {
                    warn!(job_id = job.id, session_id = %job.session_id, "Operation panicked");
                    AttemptOutcome::Failure("operation panicked".to_string())
                }
            };
            let _ = tx.send(SchedRequest::Finished { job, outcome });
        });
    }

    fn on_finished(&mut self, mut job: Job<T>, outcome: AttemptOutcome<T>) {
        self.active = self.active.saturating_sub(1);
        let session_id = job.session_id.clone();
        if let Some(count) = self.in_flight.get_mut(&session_id) {
            *count -= 1;
            if *count == 0 {
                self.in_flight.remove(&session_id);
                self.registry.with(|reg| reg.release_token(&session_id));
            }
        }

        if matches!(outcome, AttemptOutcome::Throttled { .. }) {
            self.stats.total_throttled += 1;
        }

        let cancelled = self.cancel_reason(&session_id);
        match self.retry.decide(&mut job, outcome, &mut self.rate, cancelled) {
            RetryDecision::Resolve(value) => {
                debug!(job_id = job.id, %session_id, "Job completed");
                self.stats.total_completed += 1;
                job.resolve(value);
            }
            RetryDecision::Retry { after } => {
                self.stats.total_retried += 1;
                self.schedule_requeue(job, after);
            }
            RetryDecision::Reject(err) => {
                match &err {
                    SchedulerError::Cancelled { .. } => self.count_cancelled(&session_id),
                    _ => {
                        warn!(job_id = job.id, %session_id, error = %err, "Job failed");
                        self.stats.total_failed += 1;
                    }
                }
                job.reject(err);
            }
        }
    }

    fn schedule_requeue(&self, job: Job<T>, after: Duration) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            let _ = tx.send(SchedRequest::Requeue { job });
        });
    }

    fn on_requeue(&mut self, job: Job<T>) {
        if self.registry.is_cancelled(&job.session_id) {
            self.reject_cancelled(vec![job]);
            return;
        }
        debug!(job_id = job.id, session_id = %job.session_id, retry = job.retries, "Requeueing throttled job");
        let session_id = job.session_id.clone();
        // Behind earlier retries, ahead of work that has not run yet
        self.queues.push_retry(&session_id, job, |queued| queued.retries > 0);
    }

    fn reject_cancelled(&mut self, jobs: Vec<Job<T>>) {
        for job in jobs {
            let session_id = job.session_id.clone();
            let reason = self
                .cancel_reason(&session_id)
                .unwrap_or_else(|| "cancelled".to_string());
            self.count_cancelled(&session_id);
            job.reject(SchedulerError::Cancelled { session_id, reason });
        }
    }

    /// Leftovers of a completed session settle silently
    fn count_cancelled(&mut self, session_id: &str) {
        let completed = self
            .registry
            .with(|reg| reg.reason(session_id).is_some_and(CancelReason::is_completion));
        if !completed {
            self.stats.total_cancelled += 1;
        }
    }

    fn cancel_reason(&self, session_id: &str) -> Option<String> {
        self.registry
            .with(|reg| reg.reason(session_id).map(|reason| reason.to_string()))
    }

    fn status(&self, session_id: Option<&str>) -> SchedulerStatus {
        let (waiting_sessions_ahead, session_queued) = match session_id {
            Some(id) => (self.queues.sessions_ahead_of(id), self.queues.queued_for(id)),
            None => (None, 0),
        };
        SchedulerStatus {
            queue_size: self.queues.len(),
            active_requests: self.active,
            current_interval: self.rate.current_interval(),
            pacing_tier: self.rate.tier(),
            waiting_sessions_ahead,
            session_queued,
            total_sessions: self.queues.session_count(),
            stats: self.stats.clone(),
        }
    }
}
