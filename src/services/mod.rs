//! Phase collaborators driven by the orchestrator.
//!
//! Each phase is reached through one trait so the orchestrator can be tested
//! with stand-ins. Collaborators never return `Err`: every problem is
//! reported in the outcome's [`ValidationOutcome`], tagged with an
//! [`ErrorKind`](crate::validation::ErrorKind), and the orchestrator's
//! classifier decides what it means for the run.

mod calculator;
mod importer;
mod scraper;

use async_trait::async_trait;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::entity::{Assignment, CoverageMetrics, ScheduleVersion};
use crate::validation::ValidationOutcome;

pub use calculator::CoverageCalculator;
pub use importer::{ImportParser, ImportRecord, JsonRecordParser, RecordImporter};
pub use scraper::ExternalScrapeService;

#[derive(Debug, Clone, Default)]
pub struct ImportOutcome {
    /// The version created, if the import got that far.
    pub version: Option<ScheduleVersion>,
    pub shifts_created: usize,
    pub validation: ValidationOutcome,
}

/// Counters describing one external scrape.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScrapeSummary {
    pub units_processed: usize,
    pub units_failed: usize,
    pub units_abandoned: usize,
    pub duplicate_count: usize,
    pub records_fetched: usize,
    pub assignments_created: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ScrapeOutcome {
    pub assignments: Vec<Assignment>,
    pub summary: Option<ScrapeSummary>,
    pub validation: ValidationOutcome,
}

#[derive(Debug, Clone, Default)]
pub struct CalculationOutcome {
    pub metrics: Option<CoverageMetrics>,
    pub validation: ValidationOutcome,
}

/// Phase 1: file-based import.
#[async_trait]
pub trait Importer: Send + Sync {
    async fn import(
        &self,
        cancel: &CancellationToken,
        source: &[u8],
        hospital_id: Uuid,
        user_id: Uuid,
    ) -> ImportOutcome;
}

/// Phase 2: external scrape against an imported version.
#[async_trait]
pub trait Scraper: Send + Sync {
    async fn scrape(
        &self,
        cancel: &CancellationToken,
        version: &ScheduleVersion,
        user_id: Uuid,
    ) -> ScrapeOutcome;
}

/// Phase 3: derived metrics.
#[async_trait]
pub trait Calculator: Send + Sync {
    async fn calculate(&self, cancel: &CancellationToken, version_id: Uuid) -> CalculationOutcome;
}
