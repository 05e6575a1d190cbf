//! Synthetic upstream and end-to-end simulation
//!
//! Drives the full stack (service, cache, scheduler) against an upstream that
//! throttles once too many calls start inside a sliding window, the way the
//! real provider does.

use std::collections::{BTreeMap, VecDeque};
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::NaiveDate;
use eyre::{Context, Result};
use futures::future::join_all;
use rand::Rng;
use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::cache::{QueryParams, ResultCache};
use crate::config::Config;
use crate::scheduler::{FetchOutcome, Scheduler, SchedulerStats};
use crate::service::{FareService, FareSource};

/// Payload returned by the synthetic upstream
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SimulatedFare {
    pub from_station: String,
    pub to_station: String,
    pub date: NaiveDate,
    pub price_cents: u32,
}

/// Upstream that answers with random prices and throttles past a threshold
pub struct SimulatedUpstream {
    /// Call starts allowed per window before answering 429
    throttle_after: usize,
    window: Duration,
    latency: Duration,
    starts: Mutex<VecDeque<Instant>>,
    /// Origin station of every call, in start order
    calls: Mutex<Vec<String>>,
}

impl SimulatedUpstream {
    pub fn new(throttle_after: usize, window: Duration, latency: Duration) -> Self {
        Self {
            throttle_after,
            window,
            latency,
            starts: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Record a call start and report whether it exceeds the window budget
    fn admit(&self, origin: &str) -> bool {
        let now = Instant::now();
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(origin.to_string());

        let mut starts = self.starts.lock().unwrap_or_else(PoisonError::into_inner);
        while starts.front().is_some_and(|t| now.duration_since(*t) >= self.window) {
            starts.pop_front();
        }
        starts.push_back(now);
        starts.len() <= self.throttle_after
    }

    /// Origins of every call made so far, in start order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl FareSource<SimulatedFare> for SimulatedUpstream {
    fn fetch(&self, params: QueryParams, token: CancellationToken) -> impl Future<Output = FetchOutcome<SimulatedFare>> + Send {
        let admitted = self.admit(&params.from_station);
        // Jitter the latency so calls finish out of order
        let latency = if self.latency.is_zero() {
            Duration::ZERO
        } else {
            let jitter = rand::rng().random_range(0..=self.latency.as_millis() as u64 / 2);
            self.latency + Duration::from_millis(jitter)
        };
        let price_cents = rand::rng().random_range(1_990..=14_990);

        async move {
            tokio::select! {
                _ = token.cancelled() => return FetchOutcome::Failure("cancelled".to_string()),
                _ = tokio::time::sleep(latency) => {}
            }
            if !admitted {
                debug!(origin = %params.from_station, "SimulatedUpstream: throttling");
                return FetchOutcome::Throttled { status: 429 };
            }
            FetchOutcome::Success(SimulatedFare {
                from_station: params.from_station,
                to_station: params.to_station,
                date: params.date,
                price_cents,
            })
        }
    }
}

/// Knobs for one simulation run
#[derive(Debug, Clone)]
pub struct SimulationOptions {
    pub sessions: usize,
    pub days: usize,
    pub throttle_after: usize,
    pub latency: Duration,
    pub start: NaiveDate,
}

/// What a simulation run observed
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    /// Session of every upstream call, in start order
    pub service_order: Vec<String>,
    /// Per session: quotes that resolved and quotes that failed
    pub outcomes: BTreeMap<String, (usize, usize)>,
    pub stats: SchedulerStats,
    #[serde(rename = "final-interval-ms")]
    pub final_interval_ms: u64,
    #[serde(rename = "elapsed-ms")]
    pub elapsed_ms: u64,
}

fn session_name(index: usize) -> String {
    format!("session-{}", index + 1)
}

/// Run `sessions` concurrent multi-day searches through one scheduler
pub async fn run_simulation(config: &Config, options: &SimulationOptions) -> Result<SimulationReport> {
    info!(?options, "Starting simulation");
    let started = Instant::now();

    let (scheduler, task) = Scheduler::new(config.scheduler.clone()).spawn();
    let cache = Arc::new(ResultCache::new(config.cache.clone()));
    let sweeper = cache.spawn_sweeper();
    let upstream = Arc::new(SimulatedUpstream::new(
        options.throttle_after,
        config.scheduler.pacing.burst_window(),
        options.latency,
    ));
    let service = FareService::new(scheduler.clone(), cache, upstream.clone());

    let dates: Vec<NaiveDate> = options
        .start
        .iter_days()
        .take(options.days)
        .collect();

    let searches = (0..options.sessions).map(|index| {
        let service = service.clone();
        let dates = dates.clone();
        async move {
            let session_id = session_name(index);
            let params = QueryParams::new(session_id.clone(), "DEST", options.start);
            let results = service.search_days(&session_id, &params, &dates).await;
            let ok = results.iter().filter(|(_, r)| r.is_ok()).count();
            (session_id, (ok, results.len() - ok))
        }
    });
    let outcomes: BTreeMap<String, (usize, usize)> = join_all(searches).await.into_iter().collect();

    let status = scheduler.status(None).await.context("Failed to query scheduler status")?;
    scheduler.shutdown()?;
    task.await.context("Scheduler task panicked")?;
    sweeper.abort();

    let report = SimulationReport {
        service_order: upstream.calls(),
        outcomes,
        stats: status.stats,
        final_interval_ms: status.current_interval.as_millis() as u64,
        elapsed_ms: started.elapsed().as_millis() as u64,
    };
    info!(
        calls = report.service_order.len(),
        throttled = report.stats.total_throttled,
        final_interval_ms = report.final_interval_ms,
        "Simulation finished"
    );
    Ok(report)
}
