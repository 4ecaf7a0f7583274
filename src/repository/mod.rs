//! Persistence capabilities consumed by the pipeline phases.
//!
//! Every write either succeeds or returns a typed [`RepositoryError`]; a write
//! is never silently dropped. Soft-deleted rows are invisible to reads.

mod memory;

use async_trait::async_trait;
use uuid::Uuid;

use crate::entity::{Assignment, ScheduleVersion, ShiftInstance};
use crate::error::RepositoryError;

pub use memory::MemoryStore;

#[async_trait]
pub trait ScheduleVersionRepository: Send + Sync {
    async fn create(&self, version: &ScheduleVersion) -> Result<(), RepositoryError>;
    async fn get_by_id(&self, id: Uuid) -> Result<ScheduleVersion, RepositoryError>;
    async fn soft_delete(&self, id: Uuid, deleter: Uuid) -> Result<(), RepositoryError>;
    /// Highest version number stored for the hospital plus one.
    async fn next_version(&self, hospital_id: Uuid) -> Result<u32, RepositoryError>;
}

#[async_trait]
pub trait ShiftInstanceRepository: Send + Sync {
    async fn create(&self, shift: &ShiftInstance) -> Result<(), RepositoryError>;
    async fn get_by_id(&self, id: Uuid) -> Result<ShiftInstance, RepositoryError>;
    /// All-or-nothing.
    async fn create_batch(&self, shifts: &[ShiftInstance]) -> Result<(), RepositoryError>;
    async fn soft_delete(&self, id: Uuid, deleter: Uuid) -> Result<(), RepositoryError>;
    async fn list_by_version(&self, version_id: Uuid) -> Result<Vec<ShiftInstance>, RepositoryError>;
}

#[async_trait]
pub trait AssignmentRepository: Send + Sync {
    async fn create(&self, assignment: &Assignment) -> Result<(), RepositoryError>;
    async fn get_by_id(&self, id: Uuid) -> Result<Assignment, RepositoryError>;
    /// All-or-nothing.
    async fn create_batch(&self, assignments: &[Assignment]) -> Result<(), RepositoryError>;
    async fn soft_delete(&self, id: Uuid, deleter: Uuid) -> Result<(), RepositoryError>;
    async fn list_by_version(&self, version_id: Uuid) -> Result<Vec<Assignment>, RepositoryError>;
}
