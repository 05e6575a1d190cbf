//! Fare service: cache lookup, scheduled fetch, cache write-back

use std::future::Future;
use std::sync::Arc;

use chrono::NaiveDate;
use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::cache::{QueryParams, ResultCache, make_key};
use crate::error::SchedulerError;
use crate::scheduler::{FetchOutcome, JobHandle, SchedulerHandle, operation};

/// An upstream that can answer one fare query
pub trait FareSource<T>: Send + Sync + 'static {
    /// Perform one upstream call. Implementations should watch `token` at
    /// their own suspension points and classify throttling as
    /// [`FetchOutcome::Throttled`] rather than as a failure.
    fn fetch(&self, params: QueryParams, token: CancellationToken) -> impl Future<Output = FetchOutcome<T>> + Send;
}

/// Answers fare queries for many sessions through one shared scheduler
pub struct FareService<T, S> {
    scheduler: SchedulerHandle<T>,
    cache: Arc<ResultCache<T>>,
    source: Arc<S>,
}

impl<T, S> Clone for FareService<T, S> {
    fn clone(&self) -> Self {
        Self {
            scheduler: self.scheduler.clone(),
            cache: self.cache.clone(),
            source: self.source.clone(),
        }
    }
}

impl<T, S> FareService<T, S>
where
    T: Clone + Send + Sync + 'static,
    S: FareSource<T>,
{
    pub fn new(scheduler: SchedulerHandle<T>, cache: Arc<ResultCache<T>>, source: Arc<S>) -> Self {
        Self {
            scheduler,
            cache,
            source,
        }
    }

    pub fn scheduler(&self) -> &SchedulerHandle<T> {
        &self.scheduler
    }

    pub fn cache(&self) -> &Arc<ResultCache<T>> {
        &self.cache
    }

    /// Answer one query, from cache if possible
    pub async fn quote(&self, session_id: &str, params: &QueryParams) -> Result<T, SchedulerError> {
        let key = make_key(params);
        if let Some(cached) = self.cache.get(&key).await {
            debug!(%session_id, %key, "FareService::quote: cache hit");
            return Ok(cached);
        }

        debug!(%session_id, %key, "FareService::quote: cache miss, scheduling fetch");
        let payload = self.submit(session_id, params).await?;
        self.cache.set(key, payload.clone()).await;
        Ok(payload)
    }

    fn submit(&self, session_id: &str, params: &QueryParams) -> JobHandle<T> {
        let source = self.source.clone();
        let params = params.clone();
        self.scheduler.submit_operation(
            session_id,
            operation(move |token| {
                let source = source.clone();
                let params = params.clone();
                async move { source.fetch(params, token).await }
            }),
        )
    }

    /// Quote the same journey on several days for one session.
    ///
    /// Results come back in the order of `dates`. When every day has settled
    /// the session is marked completed, unless the user cancelled it first.
    pub async fn search_days(
        &self,
        session_id: &str,
        params: &QueryParams,
        dates: &[NaiveDate],
    ) -> Vec<(NaiveDate, Result<T, SchedulerError>)> {
        info!(%session_id, days = dates.len(), "Starting multi-day search");

        let quotes = dates.iter().map(|date| {
            let day = params.on(*date);
            async move { (*date, self.quote(session_id, &day).await) }
        });
        let results = join_all(quotes).await;

        if self.scheduler.is_cancelled(session_id) {
            debug!(%session_id, "FareService::search_days: session cancelled, not marking complete");
        } else {
            self.scheduler.complete(session_id);
        }

        let failed = results.iter().filter(|(_, r)| r.is_err()).count();
        info!(%session_id, days = dates.len(), failed, "Multi-day search finished");
        results
    }
}
