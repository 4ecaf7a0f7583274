use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{AssignmentRepository, ScheduleVersionRepository, ShiftInstanceRepository};
use crate::entity::{Assignment, ScheduleVersion, ShiftInstance};
use crate::error::RepositoryError;

#[derive(Default)]
struct Tables {
    versions: HashMap<Uuid, ScheduleVersion>,
    shifts: HashMap<Uuid, ShiftInstance>,
    assignments: HashMap<Uuid, Assignment>,
}

impl Tables {
    fn live_version(&self, id: Uuid) -> bool {
        self.versions.get(&id).is_some_and(|v| !v.is_deleted())
    }

    fn check_shift(&self, shift: &ShiftInstance) -> Result<(), RepositoryError> {
        if self.shifts.contains_key(&shift.id) {
            return Err(RepositoryError::Duplicate {
                entity: "shift_instance",
                id: shift.id.to_string(),
            });
        }
        if !self.live_version(shift.schedule_version_id) {
            return Err(RepositoryError::Constraint(format!(
                "shift_instance {} references unknown schedule_version {}",
                shift.id, shift.schedule_version_id
            )));
        }
        Ok(())
    }

    fn check_assignment(&self, assignment: &Assignment) -> Result<(), RepositoryError> {
        if self.assignments.contains_key(&assignment.id) {
            return Err(RepositoryError::Duplicate {
                entity: "assignment",
                id: assignment.id.to_string(),
            });
        }
        match self.shifts.get(&assignment.shift_instance_id) {
            Some(shift) if !shift.is_deleted() => Ok(()),
            _ => Err(RepositoryError::Constraint(format!(
                "assignment {} references unknown shift_instance {}",
                assignment.id, assignment.shift_instance_id
            ))),
        }
    }
}

/// In-process store implementing every repository trait.
///
/// Each call commits on its own, so data written by an earlier phase stays
/// visible when a later phase fails.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn not_found(entity: &'static str, id: Uuid) -> RepositoryError {
    RepositoryError::NotFound {
        entity,
        id: id.to_string(),
    }
}

#[async_trait]
impl ScheduleVersionRepository for MemoryStore {
    async fn create(&self, version: &ScheduleVersion) -> Result<(), RepositoryError> {
        let mut tables = self.tables.write().await;
        if tables.versions.contains_key(&version.id) {
            return Err(RepositoryError::Duplicate {
                entity: "schedule_version",
                id: version.id.to_string(),
            });
        }
        if tables
            .versions
            .values()
            .any(|v| v.hospital_id == version.hospital_id && v.version == version.version)
        {
            return Err(RepositoryError::Duplicate {
                entity: "schedule_version",
                id: format!("{}/v{}", version.hospital_id, version.version),
            });
        }
        tables.versions.insert(version.id, version.clone());
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<ScheduleVersion, RepositoryError> {
        let tables = self.tables.read().await;
        tables
            .versions
            .get(&id)
            .filter(|v| !v.is_deleted())
            .cloned()
            .ok_or_else(|| not_found("schedule_version", id))
    }

    async fn soft_delete(&self, id: Uuid, _deleter: Uuid) -> Result<(), RepositoryError> {
        let mut tables = self.tables.write().await;
        match tables.versions.get_mut(&id) {
            Some(v) if !v.is_deleted() => {
                v.deleted_at = Some(Utc::now());
                Ok(())
            }
            _ => Err(not_found("schedule_version", id)),
        }
    }

    async fn next_version(&self, hospital_id: Uuid) -> Result<u32, RepositoryError> {
        let tables = self.tables.read().await;
        let highest = tables
            .versions
            .values()
            .filter(|v| v.hospital_id == hospital_id)
            .map(|v| v.version)
            .max()
            .unwrap_or(0);
        Ok(highest + 1)
    }
}

#[async_trait]
impl ShiftInstanceRepository for MemoryStore {
    async fn create(&self, shift: &ShiftInstance) -> Result<(), RepositoryError> {
        let mut tables = self.tables.write().await;
        tables.check_shift(shift)?;
        tables.shifts.insert(shift.id, shift.clone());
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<ShiftInstance, RepositoryError> {
        let tables = self.tables.read().await;
        tables
            .shifts
            .get(&id)
            .filter(|s| !s.is_deleted())
            .cloned()
            .ok_or_else(|| not_found("shift_instance", id))
    }

    async fn create_batch(&self, shifts: &[ShiftInstance]) -> Result<(), RepositoryError> {
        let mut tables = self.tables.write().await;
        let mut batch_ids = std::collections::HashSet::new();
        for shift in shifts {
            tables.check_shift(shift)?;
            if !batch_ids.insert(shift.id) {
                return Err(RepositoryError::Duplicate {
                    entity: "shift_instance",
                    id: shift.id.to_string(),
                });
            }
        }
        for shift in shifts {
            tables.shifts.insert(shift.id, shift.clone());
        }
        Ok(())
    }

    async fn soft_delete(&self, id: Uuid, _deleter: Uuid) -> Result<(), RepositoryError> {
        let mut tables = self.tables.write().await;
        match tables.shifts.get_mut(&id) {
            Some(s) if !s.is_deleted() => {
                s.deleted_at = Some(Utc::now());
                Ok(())
            }
            _ => Err(not_found("shift_instance", id)),
        }
    }

    async fn list_by_version(&self, version_id: Uuid) -> Result<Vec<ShiftInstance>, RepositoryError> {
        let tables = self.tables.read().await;
        let mut shifts: Vec<ShiftInstance> = tables
            .shifts
            .values()
            .filter(|s| s.schedule_version_id == version_id && !s.is_deleted())
            .cloned()
            .collect();
        shifts.sort_by(|a, b| {
            (a.schedule_date, &a.shift_type).cmp(&(b.schedule_date, &b.shift_type))
        });
        Ok(shifts)
    }
}

#[async_trait]
impl AssignmentRepository for MemoryStore {
    async fn create(&self, assignment: &Assignment) -> Result<(), RepositoryError> {
        let mut tables = self.tables.write().await;
        tables.check_assignment(assignment)?;
        tables.assignments.insert(assignment.id, assignment.clone());
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Assignment, RepositoryError> {
        let tables = self.tables.read().await;
        tables
            .assignments
            .get(&id)
            .filter(|a| !a.is_deleted())
            .cloned()
            .ok_or_else(|| not_found("assignment", id))
    }

    async fn create_batch(&self, assignments: &[Assignment]) -> Result<(), RepositoryError> {
        let mut tables = self.tables.write().await;
        let mut batch_ids = std::collections::HashSet::new();
        for assignment in assignments {
            tables.check_assignment(assignment)?;
            if !batch_ids.insert(assignment.id) {
                return Err(RepositoryError::Duplicate {
                    entity: "assignment",
                    id: assignment.id.to_string(),
                });
            }
        }
        for assignment in assignments {
            tables.assignments.insert(assignment.id, assignment.clone());
        }
        Ok(())
    }

    async fn soft_delete(&self, id: Uuid, deleter: Uuid) -> Result<(), RepositoryError> {
        let mut tables = self.tables.write().await;
        match tables.assignments.get_mut(&id) {
            Some(a) if !a.is_deleted() => {
                a.soft_delete(deleter);
                Ok(())
            }
            _ => Err(not_found("assignment", id)),
        }
    }

    async fn list_by_version(&self, version_id: Uuid) -> Result<Vec<Assignment>, RepositoryError> {
        let tables = self.tables.read().await;
        let mut assignments: Vec<Assignment> = tables
            .assignments
            .values()
            .filter(|a| a.schedule_version_id == version_id && !a.is_deleted())
            .cloned()
            .collect();
        assignments.sort_by(|a, b| {
            (a.schedule_date, &a.person).cmp(&(b.schedule_date, &b.person))
        });
        Ok(assignments)
    }
}
