use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use super::{ScrapeOutcome, ScrapeSummary, Scraper};
use crate::entity::{Assignment, AssignmentSource, ScheduleVersion, ShiftInstance};
use crate::error::ScrapeError;
use crate::repository::{AssignmentRepository, ShiftInstanceRepository};
use crate::scrape::{BatchFetcher, ScrapedBatch, YearMonth};
use crate::upstream::RawRecord;
use crate::validation::{ErrorKind, ValidationOutcome};

/// Scrapes the months a version spans and records the people found on the
/// external schedule as assignments.
pub struct ExternalScrapeService {
    fetcher: Arc<BatchFetcher>,
    shifts: Arc<dyn ShiftInstanceRepository>,
    assignments: Arc<dyn AssignmentRepository>,
}

impl ExternalScrapeService {
    pub fn new(
        fetcher: Arc<BatchFetcher>,
        shifts: Arc<dyn ShiftInstanceRepository>,
        assignments: Arc<dyn AssignmentRepository>,
    ) -> Self {
        Self {
            fetcher,
            shifts,
            assignments,
        }
    }
}

/// Months from `start` through `end`, both inclusive.
fn month_span(start: NaiveDate, end: NaiveDate) -> i64 {
    let months = (end.year() as i64 - start.year() as i64) * 12 + end.month() as i64
        - start.month() as i64;
    months + 1
}

fn report_batch(batch: &ScrapedBatch, validation: &mut ValidationOutcome) {
    for error in &batch.errors {
        validation.add_tagged_error(
            error.period.to_string(),
            format!("{} failed ({}): {}", error.address, error.kind, error.message),
            ErrorKind::UnitFetchFailed,
        );
    }
    for warning in &batch.warnings {
        let field = warning
            .period
            .map(|p| p.to_string())
            .unwrap_or_else(|| "scrape".to_string());
        validation.add_warning(field, warning.message.clone());
    }
    if batch.duplicate_count > 0 {
        validation.add_warning(
            "scrape",
            format!("{} duplicate records dropped", batch.duplicate_count),
        );
    }
    validation.add_info(
        "scrape",
        format!(
            "{} records from {} units ({} failed)",
            batch.total_records(),
            batch.units_processed,
            batch.units_failed
        ),
    );
    validation.set_context("units_processed", batch.units_processed);
    validation.set_context("units_failed", batch.units_failed);
    validation.set_context("duplicate_count", batch.duplicate_count);
}

/// Maps one raw record onto the matching shift instance.
fn match_record<'a>(
    record: &RawRecord,
    shifts: &'a [ShiftInstance],
    validation: &mut ValidationOutcome,
) -> Option<&'a ShiftInstance> {
    let field = format!("{} {}", record.date, record.shift_type);
    if record.person.trim().is_empty() {
        validation.add_tagged_error(field, "missing required field: person", ErrorKind::MissingField);
        return None;
    }
    let Ok(date) = NaiveDate::parse_from_str(&record.date, "%Y-%m-%d") else {
        validation.add_tagged_error(
            field,
            format!("invalid date {:?} on external schedule", record.date),
            ErrorKind::InvalidValue,
        );
        return None;
    };
    let shift = shifts.iter().find(|s| s.matches(date, &record.shift_type));
    if shift.is_none() {
        validation.add_tagged_error(
            field,
            format!("invalid shift: no imported {} shift on {date}", record.shift_type),
            ErrorKind::InvalidValue,
        );
    }
    shift
}

#[async_trait]
impl Scraper for ExternalScrapeService {
    async fn scrape(
        &self,
        cancel: &CancellationToken,
        version: &ScheduleVersion,
        user_id: Uuid,
    ) -> ScrapeOutcome {
        let mut outcome = ScrapeOutcome::default();
        let validation = &mut outcome.validation;

        let start = YearMonth::from(version.start_date);
        let count = month_span(version.start_date, version.end_date);

        let batch = match self.fetcher.fetch_batch(cancel, start, count).await {
            Ok(batch) => batch,
            Err(ScrapeError::InvalidPeriodCount(n)) => {
                validation.add_tagged_error(
                    "scrape",
                    format!("invalid value: version spans {n} months"),
                    ErrorKind::InvalidValue,
                );
                return outcome;
            }
            Err(ScrapeError::Pool(e)) => {
                validation.add_tagged_error("scrape", e.to_string(), ErrorKind::ResourceExhausted);
                return outcome;
            }
        };
        report_batch(&batch, validation);

        let mut summary = ScrapeSummary {
            units_processed: batch.units_processed,
            units_failed: batch.units_failed,
            units_abandoned: batch.units_abandoned,
            duplicate_count: batch.duplicate_count,
            records_fetched: batch.total_records(),
            assignments_created: 0,
        };

        let shifts = match self.shifts.list_by_version(version.id).await {
            Ok(shifts) => shifts,
            Err(e) => {
                validation.add_tagged_error("shift_instances", e.to_string(), e.error_kind());
                outcome.summary = Some(summary);
                return outcome;
            }
        };

        let assignments: Vec<Assignment> = batch
            .records
            .iter()
            .filter_map(|record| {
                match_record(record, &shifts, validation).map(|shift| {
                    Assignment::new(
                        shift,
                        record.person.trim(),
                        record.shift_type.as_str(),
                        AssignmentSource::External,
                        user_id,
                    )
                })
            })
            .collect();

        if !assignments.is_empty() {
            if let Err(e) = self.assignments.create_batch(&assignments).await {
                warn!(version_id = %version.id, error = %e, "assignment batch rejected");
                validation.add_tagged_error("assignments", e.to_string(), e.error_kind());
                outcome.summary = Some(summary);
                return outcome;
            }
        }

        summary.assignments_created = assignments.len();
        info!(
            version_id = %version.id,
            assignments = assignments.len(),
            records = batch.total_records(),
            failed_units = batch.units_failed,
            "external scrape finished"
        );
        outcome.summary = Some(summary);
        outcome.assignments = assignments;
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{Decision, ErrorClassifier};
    use crate::error::{FetchError, RepositoryError};
    use crate::repository::{MemoryStore, ScheduleVersionRepository};
    use crate::scrape::{PoolConfig, RateLimiter, WorkerPool};
    use crate::state_machine::{Phase, RetryConfig};
    use crate::upstream::Fetcher;
    use std::time::Duration;

    struct MonthFetcher {
        failing: Option<&'static str>,
    }

    #[async_trait]
    impl Fetcher for MonthFetcher {
        async fn fetch_and_extract(
            &self,
            _cancel: &CancellationToken,
            address: &str,
        ) -> Result<Vec<RawRecord>, FetchError> {
            if self.failing.is_some_and(|f| address.ends_with(f)) {
                return Err(FetchError::Http {
                    status: 503,
                    url: address.to_string(),
                });
            }
            let month = address.rsplit('/').next().unwrap_or_default();
            Ok(vec![
                RawRecord::new(format!("{month}-03"), "Technologist").with_person("A. Smith"),
                RawRecord::new(format!("{month}-04"), "Sonographer").with_person("B. Jones"),
            ])
        }
    }

    /// Rejects every write.
    struct ReadOnlyAssignments;

    #[async_trait]
    impl AssignmentRepository for ReadOnlyAssignments {
        async fn create(&self, _: &Assignment) -> Result<(), RepositoryError> {
            Err(RepositoryError::Constraint("read only".into()))
        }
        async fn get_by_id(&self, id: Uuid) -> Result<Assignment, RepositoryError> {
            Err(RepositoryError::NotFound {
                entity: "assignment",
                id: id.to_string(),
            })
        }
        async fn create_batch(&self, _: &[Assignment]) -> Result<(), RepositoryError> {
            Err(RepositoryError::Duplicate {
                entity: "assignment",
                id: "batch".into(),
            })
        }
        async fn soft_delete(&self, id: Uuid, _: Uuid) -> Result<(), RepositoryError> {
            Err(RepositoryError::NotFound {
                entity: "assignment",
                id: id.to_string(),
            })
        }
        async fn list_by_version(&self, _: Uuid) -> Result<Vec<Assignment>, RepositoryError> {
            Ok(Vec::new())
        }
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    async fn seeded_version(store: &MemoryStore) -> ScheduleVersion {
        let user = Uuid::new_v4();
        let version = ScheduleVersion::new(
            Uuid::new_v4(),
            1,
            date("2025-11-01"),
            date("2026-01-31"),
            "json_file",
            user,
        );
        ScheduleVersionRepository::create(store, &version).await.unwrap();
        let shifts: Vec<ShiftInstance> = ["2025-11-03", "2025-12-03", "2026-01-03"]
            .into_iter()
            .map(|d| ShiftInstance::new(version.id, date(d), "Technologist", user))
            .collect();
        ShiftInstanceRepository::create_batch(store, &shifts).await.unwrap();
        version
    }

    fn batch_fetcher(failing: Option<&'static str>) -> Arc<BatchFetcher> {
        Arc::new(BatchFetcher::new(
            Arc::new(WorkerPool::new(PoolConfig::default()).unwrap()),
            Arc::new(RateLimiter::new(Duration::from_millis(1))),
            Arc::new(MonthFetcher { failing }),
            "/schedule",
            RetryConfig::default(),
        ))
    }

    #[test]
    fn month_span_crosses_years() {
        assert_eq!(month_span(date("2025-11-01"), date("2026-01-31")), 3);
        assert_eq!(month_span(date("2025-11-01"), date("2025-11-30")), 1);
    }

    #[tokio::test]
    async fn failed_month_is_skipped_not_fatal() {
        let store = Arc::new(MemoryStore::new());
        let version = seeded_version(&store).await;
        let service = ExternalScrapeService::new(
            batch_fetcher(Some("2025-12")),
            Arc::clone(&store) as Arc<dyn ShiftInstanceRepository>,
            Arc::clone(&store) as Arc<dyn AssignmentRepository>,
        );

        let outcome = service
            .scrape(&CancellationToken::new(), &version, Uuid::new_v4())
            .await;
        // Nov and Jan technologists match; every sonographer row has no shift.
        assert_eq!(outcome.assignments.len(), 2);
        let summary = outcome.summary.unwrap();
        assert_eq!(summary.units_failed, 1);
        assert_eq!(summary.assignments_created, 2);

        let unit_errors: Vec<_> = outcome
            .validation
            .errors
            .iter()
            .filter(|e| e.kind == Some(ErrorKind::UnitFetchFailed))
            .collect();
        assert_eq!(unit_errors.len(), 1);
        assert_eq!(unit_errors[0].field, "2025-12");
        assert_eq!(
            ErrorClassifier::classify(&outcome.validation, Phase::ExternalScrape),
            Decision::SkipUnit
        );

        let stored = AssignmentRepository::list_by_version(store.as_ref(), version.id)
            .await
            .unwrap();
        assert_eq!(stored.len(), 2);
        assert!(stored.iter().all(|a| a.source == AssignmentSource::External));
    }

    #[tokio::test]
    async fn storage_rejection_is_critical() {
        let store = Arc::new(MemoryStore::new());
        let version = seeded_version(&store).await;
        let service = ExternalScrapeService::new(
            batch_fetcher(None),
            Arc::clone(&store) as Arc<dyn ShiftInstanceRepository>,
            Arc::new(ReadOnlyAssignments),
        );

        let outcome = service
            .scrape(&CancellationToken::new(), &version, Uuid::new_v4())
            .await;
        assert!(outcome.assignments.is_empty());
        assert!(ErrorClassifier::is_critical(&outcome.validation));
        assert_eq!(
            ErrorClassifier::classify(&outcome.validation, Phase::ExternalScrape),
            Decision::Stop
        );
    }
}
