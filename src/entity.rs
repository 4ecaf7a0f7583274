//! Domain entities persisted by the pipeline phases.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionStatus {
    Draft,
    Published,
    Archived,
}

/// A versioned snapshot of a hospital schedule. Each import creates one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleVersion {
    pub id: Uuid,
    pub hospital_id: Uuid,
    pub version: u32,
    pub status: VersionStatus,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// Where the version came from, e.g. `"json_file"`.
    pub source: String,
    pub created_at: DateTime<Utc>,
    pub created_by: Uuid,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl ScheduleVersion {
    pub fn new(
        hospital_id: Uuid,
        version: u32,
        start_date: NaiveDate,
        end_date: NaiveDate,
        source: impl Into<String>,
        user_id: Uuid,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            hospital_id,
            version,
            status: VersionStatus::Draft,
            start_date,
            end_date,
            source: source.into(),
            created_at: Utc::now(),
            created_by: user_id,
            deleted_at: None,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn covers(&self, date: NaiveDate) -> bool {
        self.start_date <= date && date <= self.end_date
    }
}

/// One staffed slot on one day of a schedule version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShiftInstance {
    pub id: Uuid,
    pub schedule_version_id: Uuid,
    pub schedule_date: NaiveDate,
    pub shift_type: String,
    pub position: String,
    pub location: String,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    /// Number of people the slot needs.
    pub required_staff: u32,
    pub created_at: DateTime<Utc>,
    pub created_by: Uuid,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl ShiftInstance {
    pub fn new(
        schedule_version_id: Uuid,
        schedule_date: NaiveDate,
        shift_type: impl Into<String>,
        user_id: Uuid,
    ) -> Self {
        let shift_type = shift_type.into();
        Self {
            id: Uuid::new_v4(),
            schedule_version_id,
            schedule_date,
            position: shift_type.clone(),
            shift_type,
            location: String::new(),
            start_time: None,
            end_time: None,
            required_staff: 1,
            created_at: Utc::now(),
            created_by: user_id,
            deleted_at: None,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Whether a scraped row for `date` and `shift_type` lands on this slot.
    /// Shift types compare case-insensitively.
    pub fn matches(&self, date: NaiveDate, shift_type: &str) -> bool {
        self.schedule_date == date && self.shift_type.eq_ignore_ascii_case(shift_type.trim())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssignmentSource {
    Import,
    External,
    Manual,
}

/// A person placed on a shift instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub id: Uuid,
    pub shift_instance_id: Uuid,
    pub schedule_version_id: Uuid,
    pub person: String,
    pub schedule_date: NaiveDate,
    /// Shift label exactly as the source spelled it.
    pub original_shift_type: String,
    pub source: AssignmentSource,
    pub created_at: DateTime<Utc>,
    pub created_by: Uuid,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<Uuid>,
}

impl Assignment {
    pub fn new(
        shift: &ShiftInstance,
        person: impl Into<String>,
        original_shift_type: impl Into<String>,
        source: AssignmentSource,
        user_id: Uuid,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            shift_instance_id: shift.id,
            schedule_version_id: shift.schedule_version_id,
            person: person.into(),
            schedule_date: shift.schedule_date,
            original_shift_type: original_shift_type.into(),
            source,
            created_at: Utc::now(),
            created_by: user_id,
            deleted_at: None,
            deleted_by: None,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn soft_delete(&mut self, deleter: Uuid) {
        self.deleted_at = Some(Utc::now());
        self.deleted_by = Some(deleter);
    }
}

/// Staffing coverage derived from a version's shifts and assignments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageMetrics {
    pub schedule_version_id: Uuid,
    /// 0.0 to 100.0
    pub coverage_percentage: f64,
    /// Filled positions, capped per shift at what the shift requires.
    pub assigned_positions: u64,
    pub required_positions: u64,
    pub uncovered_shifts: u64,
    pub overallocated_shifts: u64,
    pub calculated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn new_version_is_draft() {
        let version = ScheduleVersion::new(
            Uuid::new_v4(),
            1,
            date("2025-11-01"),
            date("2025-11-30"),
            "json_file",
            Uuid::new_v4(),
        );
        assert_eq!(version.status, VersionStatus::Draft);
        assert!(version.covers(date("2025-11-15")));
        assert!(!version.covers(date("2025-12-01")));
        assert!(!version.is_deleted());
    }

    #[test]
    fn shift_matching_ignores_case() {
        let shift = ShiftInstance::new(Uuid::new_v4(), date("2025-11-03"), "Technologist", Uuid::new_v4());
        assert!(shift.matches(date("2025-11-03"), "technologist "));
        assert!(!shift.matches(date("2025-11-04"), "Technologist"));
        assert_eq!(shift.required_staff, 1);
    }

    #[test]
    fn soft_delete_records_who() {
        let shift = ShiftInstance::new(Uuid::new_v4(), date("2025-11-03"), "Nurse", Uuid::new_v4());
        let mut assignment = Assignment::new(
            &shift,
            "A. Smith",
            "NURSE",
            AssignmentSource::External,
            Uuid::new_v4(),
        );
        assert_eq!(assignment.schedule_version_id, shift.schedule_version_id);
        let deleter = Uuid::new_v4();
        assignment.soft_delete(deleter);
        assert!(assignment.is_deleted());
        assert_eq!(assignment.deleted_by, Some(deleter));
    }
}
