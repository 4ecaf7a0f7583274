use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use serde::{Deserialize, Serialize};

/// Lifecycle of one orchestration run.
///
/// Idle → InProgress → Completed | Failed. Completed and Failed are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrchestrationStatus {
    Idle,
    InProgress,
    Completed,
    Failed,
}

impl OrchestrationStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrchestrationStatus::Completed | OrchestrationStatus::Failed
        )
    }

    fn to_u8(self) -> u8 {
        match self {
            OrchestrationStatus::Idle => 0,
            OrchestrationStatus::InProgress => 1,
            OrchestrationStatus::Completed => 2,
            OrchestrationStatus::Failed => 3,
        }
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => OrchestrationStatus::InProgress,
            2 => OrchestrationStatus::Completed,
            3 => OrchestrationStatus::Failed,
            _ => OrchestrationStatus::Idle,
        }
    }
}

impl fmt::Display for OrchestrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrchestrationStatus::Idle => write!(f, "IDLE"),
            OrchestrationStatus::InProgress => write!(f, "IN_PROGRESS"),
            OrchestrationStatus::Completed => write!(f, "COMPLETED"),
            OrchestrationStatus::Failed => write!(f, "FAILED"),
        }
    }
}

/// Atomically swapped status value owned by a single orchestrator.
///
/// One writer (the run itself), any number of concurrent readers.
#[derive(Debug)]
pub struct StatusCell(AtomicU8);

impl StatusCell {
    pub fn new(status: OrchestrationStatus) -> Self {
        Self(AtomicU8::new(status.to_u8()))
    }

    pub fn load(&self) -> OrchestrationStatus {
        OrchestrationStatus::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn store(&self, status: OrchestrationStatus) {
        self.0.store(status.to_u8(), Ordering::Release);
    }

    /// Moves from `current` to `next` only if the cell still holds `current`.
    /// Returns the observed value on failure.
    pub fn transition(
        &self,
        current: OrchestrationStatus,
        next: OrchestrationStatus,
    ) -> Result<(), OrchestrationStatus> {
        self.0
            .compare_exchange(
                current.to_u8(),
                next.to_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map(|_| ())
            .map_err(OrchestrationStatus::from_u8)
    }
}

impl Default for StatusCell {
    fn default() -> Self {
        Self::new(OrchestrationStatus::Idle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_idle() {
        let cell = StatusCell::default();
        assert_eq!(cell.load(), OrchestrationStatus::Idle);
    }

    #[test]
    fn transition_only_from_expected_state() {
        let cell = StatusCell::default();
        assert!(
            cell.transition(OrchestrationStatus::Idle, OrchestrationStatus::InProgress)
                .is_ok()
        );
        assert_eq!(
            cell.transition(OrchestrationStatus::Idle, OrchestrationStatus::InProgress),
            Err(OrchestrationStatus::InProgress)
        );
        cell.store(OrchestrationStatus::Failed);
        assert_eq!(cell.load(), OrchestrationStatus::Failed);
        assert!(cell.load().is_terminal());
    }

    #[test]
    fn status_display_and_serde() {
        assert_eq!(OrchestrationStatus::InProgress.to_string(), "IN_PROGRESS");
        let json = serde_json::to_string(&OrchestrationStatus::Completed).unwrap();
        assert_eq!(json, "\"COMPLETED\"");
    }
}
