//! Terminal presentation: a spinner per phase and the coloured final report.
//!
//! Uses `indicatif` for the spinners and `console` for colours. Nothing here
//! logs; diagnostics go through `tracing`.

use std::sync::Mutex;
use std::time::Duration;

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::classifier::Decision;
use crate::orchestrator::{OrchestrationReport, PhaseObserver};
use crate::scrape::Unit;
use crate::state_machine::{OrchestrationStatus, Phase};
use crate::validation::ValidationOutcome;

/// Shows which phase is running and how each one ended.
pub struct RunProgress {
    current: Mutex<Option<ProgressBar>>,
    hidden: bool,
    green: Style,
    red: Style,
    yellow: Style,
}

impl RunProgress {
    pub fn new() -> Self {
        Self::build(false)
    }

    /// Draws nothing. Used when stdout is not a terminal and in tests.
    pub fn hidden() -> Self {
        Self::build(true)
    }

    fn build(hidden: bool) -> Self {
        Self {
            current: Mutex::new(None),
            hidden,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
        }
    }

    fn spinner(&self, phase: Phase) -> ProgressBar {
        if self.hidden {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg} {elapsed:.dim}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(phase.name());
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }

    fn style_for(&self, decision: Decision) -> (&Style, &'static str) {
        match decision {
            Decision::Continue => (&self.green, "✓"),
            Decision::SkipUnit => (&self.yellow, "↷"),
            Decision::Stop => (&self.red, "✗"),
        }
    }
}

impl Default for RunProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl PhaseObserver for RunProgress {
    fn phase_started(&self, phase: Phase) {
        let pb = self.spinner(phase);
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = current.replace(pb) {
            previous.finish_and_clear();
        }
    }

    fn phase_finished(&self, phase: Phase, decision: Decision, outcome: &ValidationOutcome) {
        let pb = self
            .current
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(pb) = pb {
            pb.finish_and_clear();
        }
        if self.hidden {
            return;
        }
        let (style, mark) = self.style_for(decision);
        println!(
            "  {} {:<20} {:?} ({} errors, {} warnings)",
            style.apply_to(mark),
            phase.name(),
            decision,
            outcome.error_count(),
            outcome.warning_count()
        );
    }
}

pub fn status_style(status: OrchestrationStatus) -> Style {
    match status {
        OrchestrationStatus::Completed => Style::new().green().bold(),
        OrchestrationStatus::Failed => Style::new().red().bold(),
        _ => Style::new().yellow(),
    }
}

/// Prints the run summary followed by the full report as JSON.
pub fn print_report(report: &OrchestrationReport) {
    let dim = Style::new().dim();
    let style = status_style(report.status);

    println!();
    println!(
        "{} {} in {} ms",
        style.apply_to("─── Run"),
        style.apply_to(report.status),
        report.duration_ms
    );
    if let Some(phase) = report.failed_phase {
        println!("  failed phase: {}", Style::new().red().apply_to(phase));
    }
    if let Some(version) = &report.schedule_version {
        println!(
            "  version {} ({} .. {})",
            version.version, version.start_date, version.end_date
        );
    }
    if let Some(summary) = &report.scrape_summary {
        println!(
            "  scraped {} units, {} failed, {} records, {} assignments",
            summary.units_processed + summary.units_failed,
            summary.units_failed,
            summary.records_fetched,
            summary.assignments_created
        );
    }
    if let Some(coverage) = &report.coverage {
        println!(
            "  coverage {:.1}% ({} of {} positions)",
            coverage.coverage_percentage, coverage.assigned_positions, coverage.required_positions
        );
    }
    for error in &report.validation.errors {
        println!("  {} {}: {}", Style::new().red().apply_to("error"), error.field, error.message);
    }
    for warning in &report.validation.warnings {
        println!(
            "  {} {}: {}",
            Style::new().yellow().apply_to("warn "),
            warning.field,
            warning.message
        );
    }

    println!();
    println!("{}", dim.apply_to("─── Report ───"));
    match serde_json::to_string_pretty(report) {
        Ok(json) => println!("{json}"),
        Err(e) => println!("{}", Style::new().red().apply_to(format!("report not serializable: {e}"))),
    }
}

/// Prints the addresses a batch would fetch, one per line.
pub fn print_plan(units: &[Unit]) {
    let cyan = Style::new().cyan();
    for unit in units {
        println!("{}  {}", cyan.apply_to(unit.period), unit.address);
    }
    println!("{}", Style::new().dim().apply_to(format!("{} units", units.len())));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hidden_progress_tracks_phases() {
        let progress = RunProgress::hidden();
        progress.phase_started(Phase::Import);
        assert!(progress.current.lock().unwrap().is_some());

        progress.phase_finished(Phase::Import, Decision::Continue, &ValidationOutcome::new());
        assert!(progress.current.lock().unwrap().is_none());
    }

    #[test]
    fn restarting_replaces_spinner() {
        let progress = RunProgress::hidden();
        progress.phase_started(Phase::Import);
        progress.phase_started(Phase::ExternalScrape);
        progress.phase_finished(Phase::ExternalScrape, Decision::SkipUnit, &ValidationOutcome::new());
        assert!(progress.current.lock().unwrap().is_none());
    }

    #[test]
    fn decision_marks() {
        let progress = RunProgress::hidden();
        assert_eq!(progress.style_for(Decision::Continue).1, "✓");
        assert_eq!(progress.style_for(Decision::Stop).1, "✗");
    }
}
