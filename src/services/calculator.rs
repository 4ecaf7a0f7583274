use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

use super::{CalculationOutcome, Calculator};
use crate::entity::{Assignment, CoverageMetrics, ShiftInstance};
use crate::repository::{AssignmentRepository, ShiftInstanceRepository};
use crate::validation::ErrorKind;

/// Computes staffing coverage for one schedule version.
///
/// Loads shifts and assignments with one call each and derives everything
/// in memory.
pub struct CoverageCalculator {
    shifts: Arc<dyn ShiftInstanceRepository>,
    assignments: Arc<dyn AssignmentRepository>,
}

impl CoverageCalculator {
    pub fn new(
        shifts: Arc<dyn ShiftInstanceRepository>,
        assignments: Arc<dyn AssignmentRepository>,
    ) -> Self {
        Self {
            shifts,
            assignments,
        }
    }
}

pub fn coverage(
    version_id: Uuid,
    shifts: &[ShiftInstance],
    assignments: &[Assignment],
) -> CoverageMetrics {
    let mut per_shift: HashMap<Uuid, u64> = HashMap::new();
    for assignment in assignments.iter().filter(|a| !a.is_deleted()) {
        *per_shift.entry(assignment.shift_instance_id).or_default() += 1;
    }

    let mut metrics = CoverageMetrics {
        schedule_version_id: version_id,
        coverage_percentage: 100.0,
        assigned_positions: 0,
        required_positions: 0,
        uncovered_shifts: 0,
        overallocated_shifts: 0,
        calculated_at: Utc::now(),
    };

    for shift in shifts.iter().filter(|s| !s.is_deleted()) {
        let assigned = per_shift.get(&shift.id).copied().unwrap_or(0);
        let required = u64::from(shift.required_staff);
        // required_staff is unbounded import data.
        metrics.required_positions = metrics.required_positions.saturating_add(required);
        metrics.assigned_positions = metrics.assigned_positions.saturating_add(assigned.min(required));
        if assigned < required {
            metrics.uncovered_shifts += 1;
        } else if assigned > required {
            metrics.overallocated_shifts += 1;
        }
    }

    if metrics.required_positions > 0 {
        metrics.coverage_percentage =
            metrics.assigned_positions as f64 / metrics.required_positions as f64 * 100.0;
    }
    metrics
}

#[async_trait]
impl Calculator for CoverageCalculator {
    async fn calculate(&self, cancel: &CancellationToken, version_id: Uuid) -> CalculationOutcome {
        let mut outcome = CalculationOutcome::default();
        let validation = &mut outcome.validation;

        if cancel.is_cancelled() {
            validation.add_tagged_error("coverage", "calculation cancelled", ErrorKind::Cancelled);
            return outcome;
        }

        let shifts = match self.shifts.list_by_version(version_id).await {
            Ok(shifts) => shifts,
            Err(e) => {
                validation.add_tagged_error("shift_instances", e.to_string(), e.error_kind());
                return outcome;
            }
        };
        let assignments = match self.assignments.list_by_version(version_id).await {
            Ok(assignments) => assignments,
            Err(e) => {
                validation.add_tagged_error("assignments", e.to_string(), e.error_kind());
                return outcome;
            }
        };

        let metrics = coverage(version_id, &shifts, &assignments);
        if shifts.is_empty() {
            validation.add_warning("coverage", "version has no shifts to cover");
        }
        if metrics.uncovered_shifts > 0 {
            validation.add_warning(
                "coverage",
                format!("{} shifts are not fully staffed", metrics.uncovered_shifts),
            );
        }
        validation.add_info(
            "coverage",
            format!(
                "{:.1}% coverage ({} of {} positions)",
                metrics.coverage_percentage, metrics.assigned_positions, metrics.required_positions
            ),
        );
        validation.set_context("coverage_percentage", metrics.coverage_percentage);

        info!(
            version_id = %version_id,
            coverage = metrics.coverage_percentage,
            uncovered = metrics.uncovered_shifts,
            overallocated = metrics.overallocated_shifts,
            "coverage calculated"
        );
        outcome.metrics = Some(metrics);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::AssignmentSource;
    use chrono::NaiveDate;

    fn shift(version: Uuid, required: u32) -> ShiftInstance {
        let mut shift = ShiftInstance::new(
            version,
            NaiveDate::from_ymd_opt(2025, 11, 3).unwrap(),
            "Nurse",
            Uuid::new_v4(),
        );
        shift.required_staff = required;
        shift
    }

    fn assign(shift: &ShiftInstance, person: &str) -> Assignment {
        Assignment::new(shift, person, "Nurse", AssignmentSource::External, Uuid::new_v4())
    }

    #[test]
    fn nothing_required_is_full_coverage() {
        let metrics = coverage(Uuid::new_v4(), &[], &[]);
        assert_eq!(metrics.coverage_percentage, 100.0);
        assert_eq!(metrics.required_positions, 0);
    }

    #[test]
    fn counts_uncovered_and_overallocated() {
        let version = Uuid::new_v4();
        let pair = shift(version, 2);
        let single = shift(version, 1);
        let empty = shift(version, 1);
        let assignments = vec![
            assign(&pair, "A"),
            assign(&single, "B"),
            assign(&single, "C"),
        ];

        let metrics = coverage(version, &[pair, single, empty], &assignments);
        assert_eq!(metrics.required_positions, 4);
        // One of two on `pair`, one (capped) on `single`.
        assert_eq!(metrics.assigned_positions, 2);
        assert_eq!(metrics.uncovered_shifts, 2);
        assert_eq!(metrics.overallocated_shifts, 1);
        assert_eq!(metrics.coverage_percentage, 50.0);
    }

    #[test]
    fn large_staffing_requirements_do_not_overflow() {
        let version = Uuid::new_v4();
        let big = shift(version, 3_000_000_000);
        let other = shift(version, 3_000_000_000);
        let assignments = vec![assign(&big, "A")];

        let metrics = coverage(version, &[big, other], &assignments);
        assert_eq!(metrics.required_positions, 6_000_000_000);
        assert_eq!(metrics.assigned_positions, 1);
        assert_eq!(metrics.uncovered_shifts, 2);
        assert!(metrics.coverage_percentage > 0.0 && metrics.coverage_percentage < 0.001);
    }

    #[test]
    fn deleted_assignments_do_not_count() {
        let version = Uuid::new_v4();
        let s = shift(version, 1);
        let mut a = assign(&s, "A");
        a.soft_delete(Uuid::new_v4());
        let metrics = coverage(version, &[s], &[a]);
        assert_eq!(metrics.assigned_positions, 0);
        assert_eq!(metrics.coverage_percentage, 0.0);
    }

    #[tokio::test]
    async fn calculates_from_store() {
        use crate::entity::ScheduleVersion;
        use crate::repository::{MemoryStore, ScheduleVersionRepository};

        let store = Arc::new(MemoryStore::new());
        let day = NaiveDate::from_ymd_opt(2025, 11, 3).unwrap();
        let version = ScheduleVersion::new(Uuid::new_v4(), 1, day, day, "json_file", Uuid::new_v4());
        ScheduleVersionRepository::create(store.as_ref(), &version).await.unwrap();
        let s = shift(version.id, 1);
        ShiftInstanceRepository::create(store.as_ref(), &s).await.unwrap();

        let calculator = CoverageCalculator::new(
            Arc::clone(&store) as Arc<dyn ShiftInstanceRepository>,
            Arc::clone(&store) as Arc<dyn AssignmentRepository>,
        );
        let outcome = calculator
            .calculate(&CancellationToken::new(), version.id)
            .await;
        let metrics = outcome.metrics.unwrap();
        assert_eq!(metrics.uncovered_shifts, 1);
        assert!(outcome.validation.is_success());
        assert!(outcome.validation.has_warnings());
    }
}
