use std::fmt;

use serde::{Deserialize, Serialize};

/// Closed set of error tags attached where an error is created.
///
/// Classification of tagged errors is a table lookup on this value; the
/// message text is only inspected for untagged errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Source data could not be read or parsed at all.
    MalformedSource,
    /// Storage rejected a write (duplicate key, foreign key, uniqueness).
    ConstraintViolation,
    /// Disk, memory or similar resource ran out.
    ResourceExhausted,
    /// Storage or upstream could not be reached.
    Connectivity,
    /// A phase produced no entity for the next phase to work on.
    MissingEntity,
    /// The run was cancelled by its caller.
    Cancelled,
    /// A field held a value that could not be interpreted.
    InvalidValue,
    /// A record had a type the pipeline does not handle.
    UnsupportedType,
    /// A required field was absent.
    MissingField,
    /// One unit of an external batch could not be fetched.
    UnitFetchFailed,
    Other,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::MalformedSource => "malformed_source",
            ErrorKind::ConstraintViolation => "constraint_violation",
            ErrorKind::ResourceExhausted => "resource_exhausted",
            ErrorKind::Connectivity => "connectivity",
            ErrorKind::MissingEntity => "missing_entity",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::InvalidValue => "invalid_value",
            ErrorKind::UnsupportedType => "unsupported_type",
            ErrorKind::MissingField => "missing_field",
            ErrorKind::UnitFetchFailed => "unit_fetch_failed",
            ErrorKind::Other => "other",
        };
        write!(f, "{name}")
    }
}
