use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::classifier::{Decision, ErrorClassifier};
use crate::entity::{Assignment, CoverageMetrics, ScheduleVersion};
use crate::error::OrchestrationError;
use crate::merger::ResultMerger;
use crate::services::{Calculator, Importer, ScrapeSummary, Scraper};
use crate::state_machine::{
    OrchestrationStatus, Phase, PhaseMachine, PhaseRecord, RunState, StatusCell, Transition,
};
use crate::validation::{ErrorKind, ValidationOutcome};

/// Receives phase boundaries as a run progresses.
pub trait PhaseObserver: Send + Sync {
    fn phase_started(&self, phase: Phase);
    fn phase_finished(&self, phase: Phase, decision: Decision, outcome: &ValidationOutcome);
}

/// Aggregated result of one run, produced even when the run fails.
#[derive(Debug, Clone, Serialize)]
pub struct OrchestrationReport {
    pub status: OrchestrationStatus,
    pub failed_phase: Option<Phase>,
    pub phase_decisions: Vec<PhaseRecord>,
    pub schedule_version: Option<ScheduleVersion>,
    pub assignments: Vec<Assignment>,
    pub scrape_summary: Option<ScrapeSummary>,
    pub coverage: Option<CoverageMetrics>,
    /// Every phase's outcome merged, with phase attribution in its context.
    pub validation: ValidationOutcome,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl OrchestrationReport {
    pub fn phases_with_errors(&self) -> Vec<String> {
        ResultMerger::phases_with_errors(&self.validation)
    }
}

/// Marks the run Failed if `execute_import` unwinds or is dropped before it
/// stores a terminal status.
struct RunGuard<'a>(&'a StatusCell);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        if self
            .0
            .transition(OrchestrationStatus::InProgress, OrchestrationStatus::Failed)
            .is_ok()
        {
            warn!("orchestration aborted before completion");
        }
    }
}

/// Sequences import, external scrape and derived calculation for one run.
///
/// An instance owns exactly one run: [`execute_import`](Self::execute_import)
/// is accepted only while the status is `Idle`. The status can be read from
/// any thread at any time.
pub struct Orchestrator {
    importer: Arc<dyn Importer>,
    scraper: Arc<dyn Scraper>,
    calculator: Arc<dyn Calculator>,
    status: StatusCell,
    observer: Option<Arc<dyn PhaseObserver>>,
}

impl Orchestrator {
    pub fn new(
        importer: Arc<dyn Importer>,
        scraper: Arc<dyn Scraper>,
        calculator: Arc<dyn Calculator>,
    ) -> Self {
        Self {
            importer,
            scraper,
            calculator,
            status: StatusCell::default(),
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn PhaseObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn status(&self) -> OrchestrationStatus {
        self.status.load()
    }

    /// Runs all three phases against `source`.
    ///
    /// Fails only for invalid identities or a reused orchestrator; every
    /// problem met during the run ends up in the returned report instead.
    pub async fn execute_import(
        &self,
        cancel: &CancellationToken,
        source: &[u8],
        hospital_id: Uuid,
        user_id: Uuid,
    ) -> Result<OrchestrationReport, OrchestrationError> {
        if hospital_id.is_nil() {
            return Err(OrchestrationError::InvalidInput(
                "hospital id must not be empty".into(),
            ));
        }
        if user_id.is_nil() {
            return Err(OrchestrationError::InvalidInput(
                "user id must not be empty".into(),
            ));
        }
        self.status
            .transition(OrchestrationStatus::Idle, OrchestrationStatus::InProgress)
            .map_err(OrchestrationError::AlreadyStarted)?;
        let _guard = RunGuard(&self.status);

        let started_at = Utc::now();
        let clock = Instant::now();
        info!(%hospital_id, %user_id, bytes = source.len(), "orchestration started");

        let mut run = RunState::start();
        let mut outcomes: BTreeMap<Phase, ValidationOutcome> = BTreeMap::new();
        let mut assignments = Vec::new();
        let mut scrape_summary = None;
        let mut coverage = None;

        self.notify_started(Phase::Import);
        let import = self
            .importer
            .import(cancel, source, hospital_id, user_id)
            .await;
        let schedule_version = import.version;
        let mut validation = import.validation;
        if schedule_version.is_none()
            && ErrorClassifier::classify(&validation, Phase::Import) != Decision::Stop
        {
            validation.add_tagged_error(
                Phase::Import.name(),
                "import produced no schedule version",
                ErrorKind::MissingEntity,
            );
        }
        let proceed = self.conclude(&mut run, &mut outcomes, Phase::Import, validation, cancel);

        'run: {
            let (true, Some(version)) = (proceed, schedule_version.as_ref()) else {
                break 'run;
            };

            self.notify_started(Phase::ExternalScrape);
            let scrape = self.scraper.scrape(cancel, version, user_id).await;
            assignments = scrape.assignments;
            scrape_summary = scrape.summary;
            if !self.conclude(
                &mut run,
                &mut outcomes,
                Phase::ExternalScrape,
                scrape.validation,
                cancel,
            ) {
                break 'run;
            }

            self.notify_started(Phase::DerivedCalculation);
            let calculation = self.calculator.calculate(cancel, version.id).await;
            coverage = calculation.metrics;
            self.conclude(
                &mut run,
                &mut outcomes,
                Phase::DerivedCalculation,
                calculation.validation,
                cancel,
            );
        }

        let status = match run.status {
            OrchestrationStatus::Failed => OrchestrationStatus::Failed,
            _ => OrchestrationStatus::Completed,
        };
        self.status.store(status);

        let validation = ResultMerger::merge_with_phase_context(&outcomes);
        let completed_at = Utc::now();
        let duration_ms = u64::try_from(clock.elapsed().as_millis()).unwrap_or(u64::MAX);

        match status {
            OrchestrationStatus::Failed => warn!(
                failed_phase = ?run.failed_phase,
                errors = validation.error_count(),
                duration_ms,
                "orchestration failed"
            ),
            _ => info!(
                errors = validation.error_count(),
                warnings = validation.warning_count(),
                duration_ms,
                "orchestration completed"
            ),
        }

        Ok(OrchestrationReport {
            status,
            failed_phase: run.failed_phase,
            phase_decisions: run.history,
            schedule_version,
            assignments,
            scrape_summary,
            coverage,
            validation,
            started_at,
            completed_at,
            duration_ms,
        })
    }

    /// Classifies a finished phase and advances the run. Returns whether the
    /// next phase should start.
    fn conclude(
        &self,
        run: &mut RunState,
        outcomes: &mut BTreeMap<Phase, ValidationOutcome>,
        phase: Phase,
        mut outcome: ValidationOutcome,
        cancel: &CancellationToken,
    ) -> bool {
        if cancel.is_cancelled() && phase.next().is_some() {
            outcome.add_tagged_error(
                phase.name(),
                format!("run cancelled after {phase}"),
                ErrorKind::Cancelled,
            );
        }

        let decision = ErrorClassifier::classify(&outcome, phase);
        let transition = PhaseMachine::next(run, decision);
        info!(
            %phase,
            ?decision,
            errors = outcome.error_count(),
            warnings = outcome.warning_count(),
            "phase finished"
        );
        if let Some(observer) = &self.observer {
            observer.phase_finished(phase, decision, &outcome);
        }
        outcomes.insert(phase, outcome);

        matches!(transition, Transition::Next(_))
    }

    fn notify_started(&self, phase: Phase) {
        info!(%phase, "phase started");
        if let Some(observer) = &self.observer {
            observer.phase_started(phase);
        }
    }
}
