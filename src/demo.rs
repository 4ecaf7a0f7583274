//! Self-contained run of all three phases.
//!
//! Imports a small schedule into in-memory repositories and scrapes a
//! simulated upstream in which one month is unavailable, so the report shows
//! a skipped unit next to the successful ones.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

use crate::config::ShiftSyncConfig;
use crate::error::FetchError;
use crate::orchestrator::{OrchestrationReport, Orchestrator, PhaseObserver};
use crate::repository::{
    AssignmentRepository, MemoryStore, ScheduleVersionRepository, ShiftInstanceRepository,
};
use crate::scrape::{BatchFetcher, RateLimiter, WorkerPool, YearMonth};
use crate::services::{CoverageCalculator, ExternalScrapeService, JsonRecordParser, RecordImporter};
use crate::upstream::{Fetcher, RawRecord};

/// Three months of technologist and radiologist shifts.
pub const SAMPLE_SCHEDULE: &str = r#"[
    {"date": "2025-11-03", "shift_type": "Technologist", "location": "Main", "start_time": "07:00", "end_time": "15:00"},
    {"date": "2025-11-17", "shift_type": "Radiologist", "location": "Main", "required_staff": 2},
    {"date": "2025-12-03", "shift_type": "Technologist", "location": "Main", "start_time": "07:00", "end_time": "15:00"},
    {"date": "2025-12-17", "shift_type": "Radiologist", "location": "Annex"},
    {"date": "2026-01-03", "shift_type": "Technologist", "location": "Main", "start_time": "07:00", "end_time": "15:00"},
    {"date": "2026-01-17", "shift_type": "Radiologist"}
]"#;

/// Upstream stand-in. Every month answers with the same roster except
/// `unavailable`, which responds 503.
pub struct SimulatedUpstream {
    unavailable: YearMonth,
    latency: Duration,
}

impl SimulatedUpstream {
    pub fn new(unavailable: YearMonth, latency: Duration) -> Self {
        Self {
            unavailable,
            latency,
        }
    }

    fn roster(period: YearMonth) -> Vec<RawRecord> {
        vec![
            RawRecord::new(format!("{period}-03"), "Technologist").with_person("A. Rivera"),
            RawRecord::new(format!("{period}-17"), "Radiologist").with_person("K. Osei"),
            // listed twice on the page
            RawRecord::new(format!("{period}-03"), "Technologist").with_person("A. Rivera"),
            // spill-over row from the following month
            RawRecord::new(format!("{}-01", period.next()), "Technologist").with_person("M. Chen"),
        ]
    }
}

#[async_trait]
impl Fetcher for SimulatedUpstream {
    async fn fetch_and_extract(
        &self,
        cancel: &CancellationToken,
        address: &str,
    ) -> Result<Vec<RawRecord>, FetchError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(FetchError::Cancelled { url: address.to_string() });
            }
            _ = tokio::time::sleep(self.latency) => {}
        }

        let period = address
            .rsplit('/')
            .next()
            .and_then(|segment| segment.parse::<YearMonth>().ok())
            .ok_or_else(|| FetchError::Parse {
                url: address.to_string(),
                message: "address does not end in a month".into(),
            })?;
        if period == self.unavailable {
            return Err(FetchError::Http {
                status: 503,
                url: address.to_string(),
            });
        }
        Ok(Self::roster(period))
    }
}

/// Wires the in-memory pipeline and runs it once.
pub async fn run(
    config: &ShiftSyncConfig,
    observer: Arc<dyn PhaseObserver>,
    cancel: &CancellationToken,
) -> Result<OrchestrationReport> {
    let store = Arc::new(MemoryStore::new());
    let pool = Arc::new(WorkerPool::new(config.pool_config())?);
    let limiter = Arc::new(RateLimiter::new(config.rate_limit_interval()));
    let unavailable: YearMonth = "2025-12".parse().map_err(anyhow::Error::msg)?;
    let upstream = Arc::new(SimulatedUpstream::new(unavailable, Duration::from_millis(150)));

    let batch_fetcher = Arc::new(BatchFetcher::new(
        Arc::clone(&pool),
        limiter,
        upstream,
        config.schedule_path.clone(),
        config.submit_retry_config(),
    ));

    let importer = RecordImporter::new(
        Arc::new(JsonRecordParser),
        Arc::clone(&store) as Arc<dyn ScheduleVersionRepository>,
        Arc::clone(&store) as Arc<dyn ShiftInstanceRepository>,
    );
    let scraper = ExternalScrapeService::new(
        batch_fetcher,
        Arc::clone(&store) as Arc<dyn ShiftInstanceRepository>,
        Arc::clone(&store) as Arc<dyn AssignmentRepository>,
    );
    let calculator = CoverageCalculator::new(
        Arc::clone(&store) as Arc<dyn ShiftInstanceRepository>,
        Arc::clone(&store) as Arc<dyn AssignmentRepository>,
    );

    let orchestrator = Orchestrator::new(Arc::new(importer), Arc::new(scraper), Arc::new(calculator))
        .with_observer(observer);

    info!(unavailable = %unavailable, "starting demo run");
    let report = orchestrator
        .execute_import(cancel, SAMPLE_SCHEDULE.as_bytes(), Uuid::new_v4(), Uuid::new_v4())
        .await;
    pool.close().await;
    Ok(report?)
}
