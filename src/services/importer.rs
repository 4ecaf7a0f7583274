use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{ImportOutcome, Importer};
use crate::entity::{ScheduleVersion, ShiftInstance};
use crate::error::RepositoryError;
use crate::repository::{ScheduleVersionRepository, ShiftInstanceRepository};
use crate::validation::{ErrorKind, ValidationOutcome};

/// One row of a schedule file, before validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ImportRecord {
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub shift_type: String,
    #[serde(default)]
    pub position: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
    #[serde(default)]
    pub required_staff: Option<u32>,
}

/// Turns source bytes into import records.
pub trait ImportParser: Send + Sync {
    /// Short label stored as the version's `source`.
    fn source_name(&self) -> &'static str;

    fn parse(&self, source: &[u8]) -> Result<Vec<ImportRecord>, String>;
}

/// Reads a JSON array of [`ImportRecord`]s.
pub struct JsonRecordParser;

impl ImportParser for JsonRecordParser {
    fn source_name(&self) -> &'static str {
        "json_file"
    }

    fn parse(&self, source: &[u8]) -> Result<Vec<ImportRecord>, String> {
        serde_json::from_slice(source).map_err(|e| e.to_string())
    }
}

pub struct RecordImporter {
    parser: Arc<dyn ImportParser>,
    versions: Arc<dyn ScheduleVersionRepository>,
    shifts: Arc<dyn ShiftInstanceRepository>,
}

impl RecordImporter {
    pub fn new(
        parser: Arc<dyn ImportParser>,
        versions: Arc<dyn ScheduleVersionRepository>,
        shifts: Arc<dyn ShiftInstanceRepository>,
    ) -> Self {
        Self {
            parser,
            versions,
            shifts,
        }
    }
}

impl RecordImporter {
    /// Creates the next version for the hospital. A number taken by a
    /// concurrent import is retried with a fresh one.
    async fn allocate_version(
        &self,
        hospital_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
        user_id: Uuid,
    ) -> Result<ScheduleVersion, RepositoryError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let number = self.versions.next_version(hospital_id).await?;
            let version = ScheduleVersion::new(
                hospital_id,
                number,
                start,
                end,
                self.parser.source_name(),
                user_id,
            );
            match self.versions.create(&version).await {
                Ok(()) => return Ok(version),
                Err(RepositoryError::Duplicate { .. }) if attempt < VERSION_ALLOCATION_ATTEMPTS => {
                    debug!(%hospital_id, number, attempt, "version number taken, retrying");
                }
                Err(e) => return Err(e),
            }
        }
    }
}

const VERSION_ALLOCATION_ATTEMPTS: u32 = 5;

struct ValidRow {
    date: NaiveDate,
    record: ImportRecord,
    start_time: Option<NaiveTime>,
    end_time: Option<NaiveTime>,
}

fn parse_time(
    outcome: &mut ValidationOutcome,
    field: &str,
    label: &str,
    value: Option<&str>,
) -> Result<Option<NaiveTime>, ()> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(v) => NaiveTime::parse_from_str(v, "%H:%M").map(Some).map_err(|_| {
            outcome.add_tagged_error(
                field,
                format!("invalid time for {label}: {v:?}"),
                ErrorKind::InvalidValue,
            );
        }),
    }
}

fn validate_rows(records: Vec<ImportRecord>, outcome: &mut ValidationOutcome) -> Vec<ValidRow> {
    let mut valid = Vec::with_capacity(records.len());
    for (i, record) in records.into_iter().enumerate() {
        let field = format!("row {}", i + 1);

        if record.date.trim().is_empty() {
            outcome.add_tagged_error(&field, "missing required field: date", ErrorKind::MissingField);
            continue;
        }
        if record.shift_type.trim().is_empty() {
            outcome.add_tagged_error(
                &field,
                "missing required field: shift_type",
                ErrorKind::MissingField,
            );
            continue;
        }
        let Ok(date) = NaiveDate::parse_from_str(record.date.trim(), "%Y-%m-%d") else {
            outcome.add_tagged_error(
                &field,
                format!("invalid date {:?}, expected YYYY-MM-DD", record.date),
                ErrorKind::InvalidValue,
            );
            continue;
        };
        let Ok(start_time) = parse_time(outcome, &field, "start_time", record.start_time.as_deref())
        else {
            continue;
        };
        let Ok(end_time) = parse_time(outcome, &field, "end_time", record.end_time.as_deref())
        else {
            continue;
        };
        if record.location.as_deref().is_none_or(|l| l.trim().is_empty()) {
            outcome.add_warning(&field, "no location given");
        }

        valid.push(ValidRow {
            date,
            record,
            start_time,
            end_time,
        });
    }
    valid
}

#[async_trait]
impl Importer for RecordImporter {
    async fn import(
        &self,
        cancel: &CancellationToken,
        source: &[u8],
        hospital_id: Uuid,
        user_id: Uuid,
    ) -> ImportOutcome {
        let mut outcome = ImportOutcome::default();
        let validation = &mut outcome.validation;

        if cancel.is_cancelled() {
            validation.add_tagged_error("import", "import cancelled", ErrorKind::Cancelled);
            return outcome;
        }

        let records = match self.parser.parse(source) {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "import source could not be parsed");
                validation.add_tagged_error(
                    "source",
                    format!("parse error: {e}"),
                    ErrorKind::MalformedSource,
                );
                return outcome;
            }
        };
        let total = records.len();
        validation.set_context("rows_total", total);

        let rows = validate_rows(records, validation);
        let (Some(start), Some(end)) = (
            rows.iter().map(|r| r.date).min(),
            rows.iter().map(|r| r.date).max(),
        ) else {
            validation.add_tagged_error(
                "source",
                "missing required rows: no valid shift records in source",
                ErrorKind::MissingField,
            );
            return outcome;
        };

        let version = match self
            .allocate_version(hospital_id, start, end, user_id)
            .await
        {
            Ok(version) => version,
            Err(e) => {
                validation.add_tagged_error("schedule_version", e.to_string(), e.error_kind());
                return outcome;
            }
        };
        let number = version.version;

        let shifts: Vec<ShiftInstance> = rows
            .into_iter()
            .map(|row| {
                let mut shift =
                    ShiftInstance::new(version.id, row.date, row.record.shift_type.trim(), user_id);
                if let Some(position) = row.record.position.filter(|p| !p.trim().is_empty()) {
                    shift.position = position;
                }
                shift.location = row.record.location.unwrap_or_default();
                shift.start_time = row.start_time;
                shift.end_time = row.end_time;
                shift.required_staff = row.record.required_staff.unwrap_or(1);
                shift
            })
            .collect();

        if let Err(e) = self.shifts.create_batch(&shifts).await {
            validation.add_tagged_error("shift_instances", e.to_string(), e.error_kind());
            // The phase commits as a whole: retract the version the shifts belonged to.
            if let Err(undo) = self.versions.soft_delete(version.id, user_id).await {
                warn!(version_id = %version.id, error = %undo, "could not retract schedule version");
            }
            return outcome;
        }

        validation.set_context("rows_imported", shifts.len());
        validation.set_context("schedule_version_id", version.id.to_string());
        validation.add_info(
            "import",
            format!("imported {} of {total} rows into version {number}", shifts.len()),
        );
        info!(
            version_id = %version.id,
            version = number,
            shifts = shifts.len(),
            rows = total,
            "import finished"
        );

        outcome.shifts_created = shifts.len();
        outcome.version = Some(version);
        outcome
    }
}
