use std::fmt;

use serde::{Deserialize, Serialize};

use super::run::{PhaseRecord, RunState};
use super::status::OrchestrationStatus;
use crate::classifier::Decision;

/// The three phases of an import run, in execution order.
///
/// Each run flows through: IMPORT → EXTERNAL_SCRAPE → DERIVED_CALCULATION
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Import,
    ExternalScrape,
    DerivedCalculation,
}

impl Phase {
    pub const ALL: [Phase; 3] = [
        Phase::Import,
        Phase::ExternalScrape,
        Phase::DerivedCalculation,
    ];

    pub fn ordinal(self) -> usize {
        match self {
            Phase::Import => 0,
            Phase::ExternalScrape => 1,
            Phase::DerivedCalculation => 2,
        }
    }

    pub fn next(self) -> Option<Phase> {
        match self {
            Phase::Import => Some(Phase::ExternalScrape),
            Phase::ExternalScrape => Some(Phase::DerivedCalculation),
            Phase::DerivedCalculation => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Phase::Import => "IMPORT",
            Phase::ExternalScrape => "EXTERNAL_SCRAPE",
            Phase::DerivedCalculation => "DERIVED_CALCULATION",
        }
    }

    /// Output of this phase can always be recomputed, so it never aborts a run.
    pub fn is_rederivable(self) -> bool {
        matches!(self, Phase::DerivedCalculation)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// The result of applying a phase decision to a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Advance to the next phase.
    Next(Phase),
    /// Stop the run; remaining phases are not attempted.
    Abort { phase: Phase },
    /// Every phase has been attempted.
    Complete,
}

/// Drives a [`RunState`] through the phase sequence.
pub struct PhaseMachine;

impl PhaseMachine {
    /// Applies the classifier's decision for the run's current phase.
    ///
    /// - `Stop` aborts the run in `Import` and `ExternalScrape`.
    /// - `DerivedCalculation` always completes; a `Stop` there is recorded but
    ///   downgraded to `Continue`.
    /// - `SkipUnit` and `Continue` advance.
    /// - A run that is already terminal stays where it is.
    pub fn next(run: &mut RunState, decision: Decision) -> Transition {
        if run.status.is_terminal() {
            return match run.status {
                OrchestrationStatus::Failed => Transition::Abort { phase: run.phase },
                _ => Transition::Complete,
            };
        }

        let phase = run.phase;
        let effective = if phase.is_rederivable() && decision == Decision::Stop {
            Decision::Continue
        } else {
            decision
        };

        run.history.push(PhaseRecord {
            phase,
            decision,
            applied: effective,
        });

        let transition = match (effective, phase.next()) {
            (Decision::Stop, _) => Transition::Abort { phase },
            (_, Some(next)) => Transition::Next(next),
            (_, None) => Transition::Complete,
        };

        match transition {
            Transition::Next(next) => run.phase = next,
            Transition::Abort { phase } => {
                run.failed_phase = Some(phase);
                run.status = OrchestrationStatus::Failed;
            }
            Transition::Complete => run.status = OrchestrationStatus::Completed,
        }

        transition
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_walks_all_phases() {
        let mut run = RunState::start();
        assert_eq!(run.phase, Phase::Import);

        let t = PhaseMachine::next(&mut run, Decision::Continue);
        assert_eq!(t, Transition::Next(Phase::ExternalScrape));

        let t = PhaseMachine::next(&mut run, Decision::SkipUnit);
        assert_eq!(t, Transition::Next(Phase::DerivedCalculation));

        let t = PhaseMachine::next(&mut run, Decision::Continue);
        assert_eq!(t, Transition::Complete);
        assert_eq!(run.status, OrchestrationStatus::Completed);
        assert_eq!(run.failed_phase, None);
    }

    #[test]
    fn stop_in_import_aborts() {
        let mut run = RunState::start();
        let t = PhaseMachine::next(&mut run, Decision::Stop);
        assert_eq!(
            t,
            Transition::Abort {
                phase: Phase::Import
            }
        );
        assert_eq!(run.status, OrchestrationStatus::Failed);
        assert_eq!(run.failed_phase, Some(Phase::Import));

        // Terminal: further decisions change nothing.
        let t = PhaseMachine::next(&mut run, Decision::Continue);
        assert_eq!(
            t,
            Transition::Abort {
                phase: Phase::Import
            }
        );
        assert_eq!(run.history.len(), 1);
    }

    #[test]
    fn stop_in_scrape_aborts_with_attribution() {
        let mut run = RunState::start();
        PhaseMachine::next(&mut run, Decision::Continue);
        let t = PhaseMachine::next(&mut run, Decision::Stop);
        assert_eq!(
            t,
            Transition::Abort {
                phase: Phase::ExternalScrape
            }
        );
        assert_eq!(run.failed_phase, Some(Phase::ExternalScrape));
    }

    #[test]
    fn stop_in_calculation_is_downgraded() {
        let mut run = RunState::start();
        PhaseMachine::next(&mut run, Decision::Continue);
        PhaseMachine::next(&mut run, Decision::Continue);
        let t = PhaseMachine::next(&mut run, Decision::Stop);
        assert_eq!(t, Transition::Complete);
        assert_eq!(run.status, OrchestrationStatus::Completed);

        let last = run.history.last().unwrap();
        assert_eq!(last.decision, Decision::Stop);
        assert_eq!(last.applied, Decision::Continue);
    }

    #[test]
    fn phase_ordering_and_display() {
        assert!(Phase::Import < Phase::ExternalScrape);
        assert!(Phase::ExternalScrape < Phase::DerivedCalculation);
        assert_eq!(Phase::ExternalScrape.to_string(), "EXTERNAL_SCRAPE");
        assert_eq!(Phase::DerivedCalculation.ordinal(), 2);
        assert_eq!(Phase::DerivedCalculation.next(), None);
    }
}
