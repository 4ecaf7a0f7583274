//! Validation outcomes shared by every phase of the pipeline.
//!
//! A [`ValidationOutcome`] collects ordered error, warning and info messages
//! plus a free-form context map. An outcome with no errors is successful no
//! matter how many warnings or infos it carries.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

mod kind;

pub use kind::ErrorKind;

/// A single message: where it came from and what happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationMessage {
    /// Field, source or component label. May be empty.
    pub field: String,
    /// Human-readable description.
    pub message: String,
    /// Structured tag attached where the problem was detected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
}

impl ValidationMessage {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            kind: None,
        }
    }

    pub fn tagged(field: impl Into<String>, message: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            kind: Some(kind),
        }
    }
}

/// Errors, warnings, infos and context collected while processing a unit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub errors: Vec<ValidationMessage>,
    pub warnings: Vec<ValidationMessage>,
    pub infos: Vec<ValidationMessage>,
    pub context: BTreeMap<String, Value>,
}

impl ValidationOutcome {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an untagged error. Its severity is derived from the message text.
    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ValidationMessage::new(field, message));
    }

    pub fn add_tagged_error(
        &mut self,
        field: impl Into<String>,
        message: impl Into<String>,
        kind: ErrorKind,
    ) {
        self.errors
            .push(ValidationMessage::tagged(field, message, kind));
    }

    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ValidationMessage::new(field, message));
    }

    pub fn add_info(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.infos.push(ValidationMessage::new(field, message));
    }

    /// Stores a context value; an existing key is overwritten.
    pub fn set_context(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.context.insert(key.into(), value.into());
    }

    pub fn context_value(&self, key: &str) -> Option<&Value> {
        self.context.get(key)
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// True when there are no errors. Warnings and infos do not count.
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    pub fn warning_count(&self) -> usize {
        self.warnings.len()
    }

    pub fn info_count(&self) -> usize {
        self.infos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
            && self.warnings.is_empty()
            && self.infos.is_empty()
            && self.context.is_empty()
    }

    /// Appends every message of `other` and overlays its context.
    pub fn absorb(&mut self, other: &ValidationOutcome) {
        self.errors.extend(other.errors.iter().cloned());
        self.warnings.extend(other.warnings.iter().cloned());
        self.infos.extend(other.infos.iter().cloned());
        for (key, value) in &other.context {
            self.context.insert(key.clone(), value.clone());
        }
    }
}
