//! Raw records extracted from upstream schedule pages.

use serde::{Deserialize, Serialize};

/// One shift row as extracted from a schedule page, before any validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRecord {
    /// Calendar date, `YYYY-MM-DD`.
    pub date: String,
    /// Position or role label, e.g. "Technologist".
    pub shift_type: String,
    /// Person named on the page.
    #[serde(default)]
    pub person: String,
    /// `HH:MM`
    #[serde(default)]
    pub start_time: String,
    /// `HH:MM`
    #[serde(default)]
    pub end_time: String,
    #[serde(default)]
    pub location: String,
    /// Table row the record came from, for error reporting.
    #[serde(default)]
    pub row_index: usize,
}

impl RawRecord {
    pub fn new(date: impl Into<String>, shift_type: impl Into<String>) -> Self {
        Self {
            date: date.into(),
            shift_type: shift_type.into(),
            person: String::new(),
            start_time: String::new(),
            end_time: String::new(),
            location: String::new(),
            row_index: 0,
        }
    }

    pub fn with_person(mut self, person: impl Into<String>) -> Self {
        self.person = person.into();
        self
    }

    /// Composite identity used for duplicate detection within one batch.
    pub fn identity_key(&self) -> String {
        format!("{}|{}", self.date, self.shift_type)
    }

    /// True when the record's date belongs to the `YYYY-MM` period.
    pub fn belongs_to(&self, period: &str) -> bool {
        self.date.len() > period.len()
            && self.date.starts_with(period)
            && self.date.as_bytes()[period.len()] == b'-'
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_key_combines_date_and_type() {
        let record = RawRecord::new("2025-11-03", "Technologist").with_person("A. Smith");
        assert_eq!(record.identity_key(), "2025-11-03|Technologist");
    }

    #[test]
    fn belongs_to_checks_month_prefix() {
        let record = RawRecord::new("2025-11-30", "Radiologist");
        assert!(record.belongs_to("2025-11"));
        assert!(!record.belongs_to("2025-12"));
        assert!(!RawRecord::new("2025-11", "x").belongs_to("2025-11"));
    }
}
