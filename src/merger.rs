use std::collections::BTreeMap;

use serde_json::Value;

use crate::state_machine::Phase;
use crate::validation::ValidationOutcome;

/// Context key listing, in phase order, every phase that reported an error.
pub const PHASES_WITH_ERRORS_KEY: &str = "phases_with_errors";

/// Combines validation outcomes from several sources into one.
pub struct ResultMerger;

impl ResultMerger {
    /// Concatenates errors, warnings and infos in input order. Context maps are
    /// overlaid so later inputs win on key conflicts. `None` inputs count as
    /// empty outcomes.
    pub fn merge<'a, I>(outcomes: I) -> ValidationOutcome
    where
        I: IntoIterator,
        I::Item: Into<Option<&'a ValidationOutcome>>,
    {
        let mut merged = ValidationOutcome::new();
        for item in outcomes {
            let outcome: Option<&ValidationOutcome> = item.into();
            if let Some(outcome) = outcome {
                merged.absorb(outcome);
            }
        }
        merged
    }

    /// Same as [`merge`](Self::merge), walking phases in execution order.
    ///
    /// Errors without a field are labelled with their phase name, and the
    /// ordered list of phases that contributed at least one error is written
    /// under [`PHASES_WITH_ERRORS_KEY`].
    pub fn merge_with_phase_context(
        phase_outcomes: &BTreeMap<Phase, ValidationOutcome>,
    ) -> ValidationOutcome {
        let mut merged = ValidationOutcome::new();
        let mut phases_with_errors = Vec::new();

        for (phase, outcome) in phase_outcomes {
            if outcome.has_errors() {
                phases_with_errors.push(Value::from(phase.name()));
            }

            let mut labelled = outcome.clone();
            for error in &mut labelled.errors {
                if error.field.is_empty() {
                    error.field = phase.name().to_string();
                }
            }
            merged.absorb(&labelled);
        }

        if !phases_with_errors.is_empty() {
            merged.set_context(PHASES_WITH_ERRORS_KEY, Value::Array(phases_with_errors));
        }

        merged
    }

    /// Reads the phase attribution written by
    /// [`merge_with_phase_context`](Self::merge_with_phase_context).
    pub fn phases_with_errors(outcome: &ValidationOutcome) -> Vec<String> {
        outcome
            .context_value(PHASES_WITH_ERRORS_KEY)
            .and_then(Value::as_array)
            .map(|phases| {
                phases
                    .iter()
                    .filter_map(|p| p.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::ErrorKind;

    #[test]
    fn merge_of_nothing_is_empty() {
        let merged = ResultMerger::merge(Vec::<&ValidationOutcome>::new());
        assert_eq!(merged.error_count(), 0);
        assert_eq!(merged.warning_count(), 0);
        assert_eq!(merged.info_count(), 0);
        assert!(merged.is_empty());
    }

    #[test]
    fn merge_keeps_input_order_and_overwrites_context() {
        let mut a = ValidationOutcome::new();
        a.add_error("a", "first error");
        a.add_warning("a", "first warning");
        a.set_context("source", "ods");
        a.set_context("rows", 10);

        let mut b = ValidationOutcome::new();
        b.add_error("b", "second error");
        b.add_info("b", "info");
        b.set_context("source", "scrape");

        let merged = ResultMerger::merge([&a, &b]);
        let errors: Vec<_> = merged.errors.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(errors, vec!["first error", "second error"]);
        assert_eq!(merged.warning_count(), 1);
        assert_eq!(merged.info_count(), 1);
        assert_eq!(merged.context_value("source"), Some(&Value::from("scrape")));
        assert_eq!(merged.context_value("rows"), Some(&Value::from(10)));
    }

    #[test]
    fn absent_inputs_are_empty() {
        let mut a = ValidationOutcome::new();
        a.add_error("a", "only error");
        let merged = ResultMerger::merge([None, Some(&a), None]);
        assert_eq!(merged.error_count(), 1);
    }

    #[test]
    fn phase_context_records_attribution() {
        let mut import = ValidationOutcome::new();
        import.add_warning("row 2", "blank location");

        let mut scrape = ValidationOutcome::new();
        scrape.add_tagged_error("", "write rejected", ErrorKind::ConstraintViolation);

        let mut calc = ValidationOutcome::new();
        calc.add_error("coverage", "no shifts to cover");

        let mut phases = BTreeMap::new();
        phases.insert(Phase::DerivedCalculation, calc);
        phases.insert(Phase::Import, import);
        phases.insert(Phase::ExternalScrape, scrape);

        let merged = ResultMerger::merge_with_phase_context(&phases);
        assert_eq!(
            ResultMerger::phases_with_errors(&merged),
            vec!["EXTERNAL_SCRAPE", "DERIVED_CALCULATION"]
        );
        assert_eq!(merged.errors[0].field, "EXTERNAL_SCRAPE");
        assert_eq!(merged.errors[0].kind, Some(ErrorKind::ConstraintViolation));
        assert_eq!(merged.errors[1].field, "coverage");
        assert_eq!(merged.warning_count(), 1);
    }

    #[test]
    fn phase_context_omits_key_without_errors() {
        let mut phases = BTreeMap::new();
        phases.insert(Phase::Import, ValidationOutcome::new());
        let merged = ResultMerger::merge_with_phase_context(&phases);
        assert!(merged.context_value(PHASES_WITH_ERRORS_KEY).is_none());
        assert!(ResultMerger::phases_with_errors(&merged).is_empty());
    }
}
