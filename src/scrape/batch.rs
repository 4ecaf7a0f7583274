use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::dedup::DedupCache;
use super::period::YearMonth;
use super::pool::{Job, PoolState, WorkerPool};
use super::rate_limiter::RateLimiter;
use crate::error::{FetchError, PoolError, ScrapeError, UnitErrorKind};
use crate::state_machine::RetryConfig;
use crate::upstream::{Fetcher, RawRecord};

/// One addressable unit of work: a month and the page that holds it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Unit {
    pub period: YearMonth,
    pub address: String,
}

/// A unit that produced no records, attributed to its period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitError {
    pub period: YearMonth,
    pub address: String,
    pub kind: UnitErrorKind,
    pub message: String,
}

/// Non-fatal note. `period` is `None` for batch-wide notes such as
/// cancellation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitWarning {
    pub period: Option<YearMonth>,
    pub message: String,
}

/// Aggregate result of one batch.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScrapedBatch {
    /// Deduplicated records, in completion order.
    pub records: Vec<RawRecord>,
    pub errors: Vec<UnitError>,
    pub warnings: Vec<UnitWarning>,
    pub duplicate_count: usize,
    pub units_processed: usize,
    pub units_failed: usize,
    /// Units still in flight when the batch was cancelled.
    pub units_abandoned: usize,
}

impl ScrapedBatch {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn total_records(&self) -> usize {
        self.records.len()
    }

    pub fn formatted_errors(&self) -> Vec<String> {
        self.errors
            .iter()
            .map(|e| format!("{} [{}]: {}", e.period, e.kind, e.message))
            .collect()
    }

    pub fn formatted_warnings(&self) -> Vec<String> {
        self.warnings
            .iter()
            .map(|w| match w.period {
                Some(period) => format!("{period}: {}", w.message),
                None => w.message.clone(),
            })
            .collect()
    }
}

struct UnitReport {
    index: usize,
    result: Result<Vec<RawRecord>, FetchError>,
}

/// Fans a window of months out over the worker pool and folds the per-unit
/// results into one [`ScrapedBatch`].
pub struct BatchFetcher {
    pool: Arc<WorkerPool>,
    limiter: Arc<RateLimiter>,
    fetcher: Arc<dyn Fetcher>,
    schedule_path: String,
    submit_retry: RetryConfig,
}

impl BatchFetcher {
    pub fn new(
        pool: Arc<WorkerPool>,
        limiter: Arc<RateLimiter>,
        fetcher: Arc<dyn Fetcher>,
        schedule_path: impl Into<String>,
        submit_retry: RetryConfig,
    ) -> Self {
        Self {
            pool,
            limiter,
            fetcher,
            schedule_path: schedule_path.into().trim_end_matches('/').to_string(),
            submit_retry,
        }
    }

    /// One unit per month starting at `start`, with no repeated address.
    pub fn plan_units(&self, start: YearMonth, count: usize) -> Vec<Unit> {
        plan_units(&self.schedule_path, start, count)
    }

    /// Fetches `count` consecutive months starting at `start`.
    ///
    /// Per-unit failures are collected in the batch; only an invalid count or
    /// an unusable pool fails the call.
    pub async fn fetch_batch(
        &self,
        cancel: &CancellationToken,
        start: YearMonth,
        count: i64,
    ) -> Result<ScrapedBatch, ScrapeError> {
        if count < 1 {
            return Err(ScrapeError::InvalidPeriodCount(count));
        }
        if self.pool.state() != PoolState::Open {
            return Err(ScrapeError::Pool(PoolError::PoolClosed));
        }

        let units = self.plan_units(start, count as usize);
        info!(start = %start, units = units.len(), "starting scrape batch");

        let (tx, mut rx) = mpsc::unbounded_channel::<UnitReport>();
        let mut batch = ScrapedBatch::default();
        let mut resolved = vec![false; units.len()];

        for (index, unit) in units.iter().enumerate() {
            if cancel.is_cancelled() {
                break;
            }
            match self.submit_unit(cancel, index, unit, tx.clone()).await {
                Ok(()) => {}
                Err(PoolError::Cancelled) => break,
                Err(e) => {
                    warn!(period = %unit.period, error = %e, "unit could not be submitted");
                    resolved[index] = true;
                    batch.units_failed += 1;
                    batch.errors.push(UnitError {
                        period: unit.period,
                        address: unit.address.clone(),
                        kind: UnitErrorKind::Queue,
                        message: e.to_string(),
                    });
                }
            }
        }
        // Every job owns a sender; the channel closes once all have reported.
        drop(tx);

        let seen = DedupCache::new();
        let mut cancelled = cancel.is_cancelled();
        while !cancelled {
            tokio::select! {
                biased;
                report = rx.recv() => match report {
                    Some(report) => {
                        resolved[report.index] = true;
                        absorb(&mut batch, &seen, &units[report.index], report.result);
                    }
                    None => break,
                },
                _ = cancel.cancelled() => cancelled = true,
            }
        }

        if cancelled {
            // Keep whatever already finished.
            while let Ok(report) = rx.try_recv() {
                resolved[report.index] = true;
                absorb(&mut batch, &seen, &units[report.index], report.result);
            }
        }

        for (index, unit) in units.iter().enumerate() {
            if resolved[index] {
                continue;
            }
            if cancelled {
                batch.units_abandoned += 1;
            } else {
                batch.units_failed += 1;
                batch.errors.push(UnitError {
                    period: unit.period,
                    address: unit.address.clone(),
                    kind: UnitErrorKind::Internal,
                    message: "unit job ended without reporting a result".into(),
                });
            }
        }

        if cancelled {
            batch.warnings.push(UnitWarning {
                period: None,
                message: format!(
                    "batch cancelled: {} of {} units abandoned",
                    batch.units_abandoned,
                    units.len()
                ),
            });
        }

        info!(
            records = batch.records.len(),
            processed = batch.units_processed,
            failed = batch.units_failed,
            abandoned = batch.units_abandoned,
            duplicates = batch.duplicate_count,
            "scrape batch finished"
        );
        Ok(batch)
    }

    /// Submits one unit, backing off while the pool reports a full queue.
    async fn submit_unit(
        &self,
        cancel: &CancellationToken,
        index: usize,
        unit: &Unit,
        tx: mpsc::UnboundedSender<UnitReport>,
    ) -> Result<(), PoolError> {
        let mut attempt = 0u32;
        loop {
            let job = unit_job(
                index,
                unit.address.clone(),
                Arc::clone(&self.limiter),
                Arc::clone(&self.fetcher),
                cancel.clone(),
                tx.clone(),
            );
            match self.pool.submit_boxed(job) {
                Ok(()) => return Ok(()),
                Err(PoolError::QueueFull) if attempt < self.submit_retry.max_retries => {
                    attempt += 1;
                    let delay = self.submit_retry.delay_for_attempt(attempt);
                    debug!(period = %unit.period, attempt, delay_ms = delay, "queue full, backing off");
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(PoolError::Cancelled),
                        _ = tokio::time::sleep(Duration::from_millis(delay)) => {}
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }
}

pub fn plan_units(schedule_path: &str, start: YearMonth, count: usize) -> Vec<Unit> {
    let mut seen = HashSet::new();
    start
        .range(count)
        .into_iter()
        .filter(|period| seen.insert(*period))
        .map(|period| Unit {
            period,
            address: format!("{schedule_path}/{period}"),
        })
        .collect()
}

fn unit_job(
    index: usize,
    address: String,
    limiter: Arc<RateLimiter>,
    fetcher: Arc<dyn Fetcher>,
    cancel: CancellationToken,
    tx: mpsc::UnboundedSender<UnitReport>,
) -> Job {
    Box::new(move |pool_token: CancellationToken| {
        Box::pin(async move {
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(FetchError::Cancelled { url: address.clone() }),
                _ = pool_token.cancelled() => Err(FetchError::Cancelled { url: address.clone() }),
                result = async {
                    limiter.wait().await;
                    fetcher.fetch_and_extract(&cancel, &address).await
                } => result,
            };

            let failure = result.as_ref().err().map(ToString::to_string);
            // The receiver is gone only if the batch stopped listening.
            let _ = tx.send(UnitReport { index, result });
            match failure {
                Some(message) => Err(anyhow::anyhow!(message)),
                None => Ok(()),
            }
        })
    })
}

fn absorb(
    batch: &mut ScrapedBatch,
    seen: &DedupCache,
    unit: &Unit,
    result: Result<Vec<RawRecord>, FetchError>,
) {
    let records = match result {
        Ok(records) => records,
        Err(FetchError::Cancelled { .. }) => {
            batch.units_abandoned += 1;
            return;
        }
        Err(e) => {
            warn!(period = %unit.period, kind = %e.kind(), error = %e, "unit failed");
            batch.units_failed += 1;
            batch.errors.push(UnitError {
                period: unit.period,
                address: unit.address.clone(),
                kind: e.kind(),
                message: e.to_string(),
            });
            return;
        }
    };

    let period = unit.period.to_string();
    let mut outside = 0usize;
    let mut kept = 0usize;
    for record in records {
        if !record.belongs_to(&period) {
            outside += 1;
            continue;
        }
        if seen.mark_seen(&record.identity_key()) {
            batch.records.push(record);
            kept += 1;
        } else {
            batch.duplicate_count += 1;
        }
    }

    if outside > 0 {
        batch.warnings.push(UnitWarning {
            period: Some(unit.period),
            message: format!("discarded {outside} records dated outside {period}"),
        });
    }
    batch.units_processed += 1;
    debug!(period = %unit.period, kept, outside, "unit absorbed");
}
