use serde::{Deserialize, Serialize};

use super::phase::Phase;
use super::status::OrchestrationStatus;
use crate::classifier::Decision;

/// Configuration for retry behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt.
    pub max_retries: u32,
    /// Base delay in milliseconds for exponential backoff.
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
        }
    }
}

impl RetryConfig {
    /// Calculate the delay for a given retry attempt using exponential backoff.
    /// delay = base_delay_ms * 2^(attempt - 1)
    pub fn delay_for_attempt(&self, attempt: u32) -> u64 {
        self.base_delay_ms
            .saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)))
    }
}

/// The decision taken at one phase boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseRecord {
    pub phase: Phase,
    /// What the classifier decided.
    pub decision: Decision,
    /// What the run actually did with it.
    pub applied: Decision,
}

/// Progress of a single run through the phase sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    pub phase: Phase,
    pub status: OrchestrationStatus,
    pub history: Vec<PhaseRecord>,
    pub failed_phase: Option<Phase>,
}

impl RunState {
    /// A run that has just entered its first phase.
    pub fn start() -> Self {
        Self {
            phase: Phase::Import,
            status: OrchestrationStatus::InProgress,
            history: Vec::new(),
            failed_phase: None,
        }
    }

    pub fn attempted_phases(&self) -> Vec<Phase> {
        self.history.iter().map(|r| r.phase).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_config_exponential_backoff() {
        let config = RetryConfig {
            max_retries: 5,
            base_delay_ms: 100,
        };
        assert_eq!(config.delay_for_attempt(1), 100);
        assert_eq!(config.delay_for_attempt(2), 200);
        assert_eq!(config.delay_for_attempt(3), 400);
        assert_eq!(config.delay_for_attempt(0), 100);
    }

    #[test]
    fn backoff_saturates_instead_of_overflowing() {
        let config = RetryConfig {
            max_retries: 100,
            base_delay_ms: u64::MAX / 2,
        };
        assert_eq!(config.delay_for_attempt(64), u64::MAX);
    }

    #[test]
    fn new_run_is_in_progress_at_import() {
        let run = RunState::start();
        assert_eq!(run.phase, Phase::Import);
        assert_eq!(run.status, OrchestrationStatus::InProgress);
        assert!(run.attempted_phases().is_empty());
    }
}
