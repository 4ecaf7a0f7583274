use serde::{Deserialize, Serialize};

use crate::state_machine::Phase;
use crate::validation::{ErrorKind, ValidationMessage, ValidationOutcome};

/// How serious a single error is. Ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Minor,
    Major,
    Critical,
}

/// What the orchestrator should do after a phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Decision {
    /// Abort the run.
    Stop,
    /// Drop the offending records; siblings and later phases proceed.
    SkipUnit,
    Continue,
}

/// Substrings that mark an untagged error as critical.
const CRITICAL_PATTERNS: &[&str] = &[
    // malformed or unparsable source data
    "invalid file format",
    "invalid zip",
    "parse error",
    "parsing failed",
    "cannot parse",
    "unparsable",
    "malformed",
    "corrupted",
    // storage constraints
    "duplicate",
    "constraint violation",
    "unique constraint",
    "foreign key",
    "integrity constraint",
    // resource exhaustion
    "no space left",
    "disk full",
    "out of memory",
    "permission denied",
    // connectivity
    "connection refused",
    "connection timeout",
    "timed out",
];

/// Substrings that mark an untagged error as major.
const MAJOR_PATTERNS: &[&str] = &[
    "invalid date",
    "invalid time",
    "invalid format",
    "invalid value",
    "invalid shift",
    "invalid type",
    "type mismatch",
    "unsupported",
    "not supported",
    "missing required",
    "missing field",
    "required field",
];

/// Maps validation outcomes to severities and continue/stop decisions.
///
/// Stateless: every method is a pure function of its arguments.
pub struct ErrorClassifier;

impl ErrorClassifier {
    /// Decides how the run proceeds after `phase` produced `outcome`.
    ///
    /// The single most severe error decides: Critical stops in any phase,
    /// Major stops during `Import` and skips the unit elsewhere, Minor
    /// continues. No errors always continues.
    pub fn classify(outcome: &ValidationOutcome, phase: Phase) -> Decision {
        match Self::highest_severity(outcome) {
            None | Some(Severity::Minor) => Decision::Continue,
            Some(Severity::Critical) => Decision::Stop,
            Some(Severity::Major) if phase == Phase::Import => Decision::Stop,
            Some(Severity::Major) => Decision::SkipUnit,
        }
    }

    /// Most severe error in the outcome, or `None` when there are no errors.
    pub fn highest_severity(outcome: &ValidationOutcome) -> Option<Severity> {
        outcome.errors.iter().map(Self::severity_of_message).max()
    }

    /// Tagged errors use the lookup table; untagged ones fall back to the
    /// text catalogue.
    pub fn severity_of_message(error: &ValidationMessage) -> Severity {
        match error.kind {
            Some(kind) => Self::severity_of_kind(kind),
            None => Self::severity_of(&error.message),
        }
    }

    pub fn severity_of_kind(kind: ErrorKind) -> Severity {
        match kind {
            ErrorKind::MalformedSource
            | ErrorKind::ConstraintViolation
            | ErrorKind::ResourceExhausted
            | ErrorKind::Connectivity
            | ErrorKind::MissingEntity
            | ErrorKind::Cancelled => Severity::Critical,
            ErrorKind::InvalidValue
            | ErrorKind::UnsupportedType
            | ErrorKind::MissingField
            | ErrorKind::UnitFetchFailed => Severity::Major,
            ErrorKind::Other => Severity::Minor,
        }
    }

    /// Case-insensitive substring match against the fixed catalogue.
    pub fn severity_of(message: &str) -> Severity {
        let lower = message.to_lowercase();
        if CRITICAL_PATTERNS.iter().any(|p| lower.contains(p)) {
            Severity::Critical
        } else if MAJOR_PATTERNS.iter().any(|p| lower.contains(p)) {
            Severity::Major
        } else {
            Severity::Minor
        }
    }

    pub fn should_continue(outcome: &ValidationOutcome, phase: Phase) -> bool {
        Self::classify(outcome, phase) != Decision::Stop
    }

    pub fn is_critical(outcome: &ValidationOutcome) -> bool {
        Self::highest_severity(outcome) == Some(Severity::Critical)
    }

    /// Contains a major error and nothing critical.
    pub fn is_major(outcome: &ValidationOutcome) -> bool {
        Self::highest_severity(outcome) == Some(Severity::Major)
    }

    /// Only minor errors, or none at all.
    pub fn is_minor(outcome: &ValidationOutcome) -> bool {
        matches!(Self::highest_severity(outcome), None | Some(Severity::Minor))
    }
}
