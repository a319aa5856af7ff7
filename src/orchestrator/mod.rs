//! Repair Orchestrator.
//!
//! Drives one session per target through analyze, route, fix and validate
//! until it succeeds, runs out of budget, stops making progress or is
//! aborted. Fixing and validation are delegated to the [`FixExecutor`] and
//! [`Validator`] collaborators; the loop itself never runs commands.
//!
//! Iterations are strictly sequential: iteration n+1 analyzes the report
//! produced by iteration n's validation.

pub mod registry;

pub use registry::SessionRegistry;

use crate::analysis::AnalysisEngine;
use crate::audit::AuditLogger;
use crate::diagnosis::{ActionName, ArtifactRef, Diagnosis, FailureReport, FixPlan};
use crate::errors::{FixExecutionFailure, SessionError, ValidatorInfrastructureFailure};
use crate::session::{
    AbortReason, ExhaustionReason, FixOutcome, IterationRecord, RepairSession, SessionSettings,
    SessionSnapshot, SessionState, ValidationOutcome,
};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::{Arc, RwLock};
use tracing::{info, instrument, warn};

/// Applies a fix plan by dispatching it to the named fixer role.
#[async_trait]
pub trait FixExecutor: Send + Sync {
    /// Returns the actions that were actually applied.
    async fn apply(&self, plan: &FixPlan) -> Result<Vec<ActionName>, FixExecutionFailure>;
}

/// Re-runs the tests against the regenerated artifacts.
///
/// A test run that executes and fails is a normal `Ok` report. `Err` means
/// the runner itself could not execute.
#[async_trait]
pub trait Validator: Send + Sync {
    async fn validate(
        &self,
        artifacts: &[ArtifactRef],
    ) -> Result<FailureReport, ValidatorInfrastructureFailure>;
}

/// Where an iteration left the loop.
enum Step {
    Continue(FailureReport),
    Stop,
}

pub struct RepairOrchestrator {
    engine: AnalysisEngine,
    fixer: Arc<dyn FixExecutor>,
    validator: Arc<dyn Validator>,
    registry: SessionRegistry,
    settings: RwLock<SessionSettings>,
    audit: Option<AuditLogger>,
}

impl RepairOrchestrator {
    pub fn new(
        engine: AnalysisEngine,
        fixer: Arc<dyn FixExecutor>,
        validator: Arc<dyn Validator>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            engine,
            fixer,
            validator,
            registry: SessionRegistry::new(),
            settings: RwLock::new(settings),
            audit: None,
        }
    }

    /// Archive every terminal session through `logger`.
    pub fn with_audit(mut self, logger: AuditLogger) -> Self {
        self.audit = Some(logger);
        self
    }

    pub fn settings(&self) -> SessionSettings {
        *self
            .settings
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Replace the settings used for sessions created from now on.
    /// Sessions already running keep the snapshot they started with.
    pub fn update_settings(&self, settings: SessionSettings) {
        *self
            .settings
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = settings;
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub async fn session(&self, target: &str) -> Option<Arc<RepairSession>> {
        self.registry.get(target).await
    }

    /// Request cancellation of the live session for `target`.
    ///
    /// Takes effect at the next iteration boundary. Returns false when there
    /// is no live session to cancel.
    pub async fn cancel(&self, target: &str) -> bool {
        match self.registry.get(target).await {
            Some(session) if !session.is_terminal() => {
                info!(repair_target = target, session_id = %session.id(), "cancellation requested");
                session.request_cancel();
                true
            }
            _ => false,
        }
    }

    /// Start a session for `target` and run it to a terminal state.
    ///
    /// Fails only when a live session already exists for `target`; every
    /// other problem ends up in the returned snapshot. Dropping the returned
    /// future before it completes aborts the session as cancelled.
    pub async fn handle_failure(
        &self,
        target: &str,
        report: FailureReport,
    ) -> Result<SessionSnapshot, SessionError> {
        let session = self.registry.start(target, self.settings()).await?;
        let guard = AbandonGuard(Arc::clone(&session));
        if let Err(e) = self.run(&session, report).await {
            warn!(
                repair_target = target,
                session_id = %session.id(),
                error = %e,
                "repair loop failed"
            );
        }
        drop(guard);

        let snapshot = session.snapshot();
        info!(
            repair_target = target,
            session_id = %snapshot.session_id,
            state = %snapshot.state,
            iterations = snapshot.iterations(),
            "repair session finished"
        );
        if let Some(audit) = &self.audit {
            if let Err(e) = audit.archive(&snapshot) {
                warn!(error = %e, "failed to archive repair session");
            }
        }
        Ok(snapshot)
    }

    #[instrument(skip_all, fields(repair_target = session.target(), session_id = %session.id()))]
    async fn run(&self, session: &RepairSession, report: FailureReport) -> Result<(), SessionError> {
        let settings = session.settings();
        if settings.max_iterations == 0 {
            return session.transition(SessionState::Exhausted {
                reason: ExhaustionReason::BudgetSpent,
            });
        }

        let mut report = report;
        loop {
            if session.cancel_requested() {
                info!("session cancelled between iterations");
                return session.transition(SessionState::Aborted {
                    reason: AbortReason::Cancelled,
                });
            }

            match self.iterate(session, &settings, report).await? {
                Step::Continue(next) => {
                    session.transition(SessionState::Analyzing)?;
                    report = next;
                }
                Step::Stop => return Ok(()),
            }
        }
    }

    /// One analyze/route/fix/validate pass. Leaves the session either
    /// terminal or in `Iterating`.
    async fn iterate(
        &self,
        session: &RepairSession,
        settings: &SessionSettings,
        report: FailureReport,
    ) -> Result<Step, SessionError> {
        let started_at = Utc::now();
        let iteration_index = session.history().len() as u32 + 1;
        let previous = session.history().last();

        let context = context_summary(
            session,
            iteration_index,
            previous.as_ref().map(|record| &record.diagnosis),
        );
        let diagnosis = self.engine.analyze(&report, settings, &context).await;
        info!(
            iteration = iteration_index,
            category = %diagnosis.primary_category,
            fixer = %diagnosis.primary_target,
            confidence = diagnosis.primary_confidence,
            "diagnosis produced"
        );

        session.transition(SessionState::Routing)?;
        let fix_plan = diagnosis.to_fix_plan();

        session.transition(SessionState::Fixing)?;
        let actions_applied = match self.fixer.apply(&fix_plan).await {
            Ok(actions) => actions,
            Err(failure) => {
                warn!(iteration = iteration_index, error = %failure, "fix executor failed");
                session.record_iteration(IterationRecord {
                    iteration_index,
                    diagnosis,
                    fix_plan,
                    actions_applied: Vec::new(),
                    fix_outcome: FixOutcome::Failed {
                        message: failure.to_string(),
                    },
                    validation_outcome: ValidationOutcome::NotRun,
                    started_at,
                    ended_at: Utc::now(),
                })?;
                if !session.has_budget() {
                    session.transition(SessionState::Exhausted {
                        reason: ExhaustionReason::BudgetSpent,
                    })?;
                    return Ok(Step::Stop);
                }
                session.transition(SessionState::Iterating)?;
                return Ok(Step::Continue(report));
            }
        };

        session.transition(SessionState::Validating)?;
        let validated = self.validator.validate(&report.artifact_refs).await;
        let record = |validation_outcome| IterationRecord {
            iteration_index,
            diagnosis: diagnosis.clone(),
            fix_plan: fix_plan.clone(),
            actions_applied: actions_applied.clone(),
            fix_outcome: FixOutcome::Applied,
            validation_outcome,
            started_at,
            ended_at: Utc::now(),
        };

        let next = match validated {
            Ok(next) => next,
            Err(failure) => {
                warn!(iteration = iteration_index, error = %failure, "validator infrastructure failed");
                session.record_iteration(record(ValidationOutcome::InfrastructureFailure {
                    message: failure.to_string(),
                }))?;
                session.transition(SessionState::Aborted {
                    reason: AbortReason::ValidatorInfrastructure {
                        message: failure.to_string(),
                    },
                })?;
                return Ok(Step::Stop);
            }
        };

        if next.is_passing() {
            session.record_iteration(record(ValidationOutcome::Passed {
                tests_run: next.tests_run,
            }))?;
            session.transition(SessionState::Succeeded)?;
            return Ok(Step::Stop);
        }

        session.record_iteration(record(ValidationOutcome::Failed {
            tests_run: next.tests_run,
            tests_failed: next.tests_failed,
            exit_code: next.exit_code,
        }))?;

        // A retry after a fix that never applied re-diagnoses the same report,
        // so only an applied fix can show a lack of progress.
        let stalled = previous.is_some_and(|p| {
            p.fix_outcome == FixOutcome::Applied
                && p.diagnosis.progress_key() == diagnosis.progress_key()
        });
        if stalled {
            info!(
                iteration = iteration_index,
                category = %diagnosis.primary_category,
                "no progress since previous iteration"
            );
            session.transition(SessionState::Exhausted {
                reason: ExhaustionReason::NoProgress,
            })?;
            return Ok(Step::Stop);
        }
        if !session.has_budget() {
            session.transition(SessionState::Exhausted {
                reason: ExhaustionReason::BudgetSpent,
            })?;
            return Ok(Step::Stop);
        }

        session.transition(SessionState::Iterating)?;
        Ok(Step::Continue(next))
    }
}

/// Aborts its session as cancelled if it is still live when dropped.
struct AbandonGuard(Arc<RepairSession>);

impl Drop for AbandonGuard {
    fn drop(&mut self) {
        let session = &self.0;
        if session.is_terminal() {
            return;
        }
        warn!(
            repair_target = session.target(),
            session_id = %session.id(),
            state = session.state().name(),
            "repair session abandoned before reaching a terminal state"
        );
        // Only fails if another caller made it terminal in between.
        let _ = session.transition(SessionState::Aborted {
            reason: AbortReason::Cancelled,
        });
    }
}

impl std::fmt::Debug for RepairOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepairOrchestrator")
            .field("engine", &self.engine)
            .field("settings", &self.settings())
            .field("audit", &self.audit)
            .finish()
    }
}

fn context_summary(
    session: &RepairSession,
    iteration_index: u32,
    previous: Option<&Diagnosis>,
) -> String {
    let mut summary = format!(
        "Repair target '{}', iteration {} of {}.",
        session.target(),
        iteration_index,
        session.settings().max_iterations
    );
    if let Some(previous) = previous {
        summary.push_str(&format!(
            " Previous iteration routed {} to {} and the tests still failed.",
            previous.primary_category, previous.primary_target
        ));
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patterns::PatternMatcher;
    use crate::quality::{MemoryArtifactSource, QualityAnalyzer};
    use std::sync::Mutex;

    /// Fixer that records every plan it receives.
    #[derive(Default)]
    struct RecordingFixer {
        plans: Mutex<Vec<FixPlan>>,
    }

    #[async_trait]
    impl FixExecutor for RecordingFixer {
        async fn apply(&self, plan: &FixPlan) -> Result<Vec<ActionName>, FixExecutionFailure> {
            self.plans.lock().unwrap().push(plan.clone());
            Ok(plan.fix_actions.clone())
        }
    }

    /// Validator that replays a fixed sequence of reports.
    struct ScriptedValidator {
        reports: Mutex<Vec<FailureReport>>,
    }

    impl ScriptedValidator {
        fn new(mut reports: Vec<FailureReport>) -> Self {
            reports.reverse();
            Self {
                reports: Mutex::new(reports),
            }
        }
    }

    #[async_trait]
    impl Validator for ScriptedValidator {
        async fn validate(
            &self,
            _artifacts: &[ArtifactRef],
        ) -> Result<FailureReport, ValidatorInfrastructureFailure> {
            self.reports
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| ValidatorInfrastructureFailure::Runner("script exhausted".into()))
        }
    }

    fn orchestrator(
        fixer: Arc<RecordingFixer>,
        validator: ScriptedValidator,
        settings: SessionSettings,
    ) -> RepairOrchestrator {
        let engine = AnalysisEngine::new(
            PatternMatcher::new(),
            QualityAnalyzer::new(Arc::new(MemoryArtifactSource::new())),
        );
        RepairOrchestrator::new(engine, fixer, Arc::new(validator), settings)
    }

    fn syntax_failure() -> FailureReport {
        FailureReport::new("SyntaxError: invalid syntax", "", 1).with_test_counts(4, 4)
    }

    fn passing() -> FailureReport {
        FailureReport::new("", "4 passed", 0).with_test_counts(4, 0)
    }

    #[tokio::test]
    async fn test_succeeds_after_one_fix() {
        let fixer = Arc::new(RecordingFixer::default());
        let orch = orchestrator(
            fixer.clone(),
            ScriptedValidator::new(vec![passing()]),
            SessionSettings::default(),
        );

        let snapshot = orch.handle_failure("todo-api", syntax_failure()).await.unwrap();

        assert_eq!(snapshot.state, SessionState::Succeeded);
        assert_eq!(snapshot.iterations(), 1);
        assert_eq!(
            snapshot.history[0].validation_outcome,
            ValidationOutcome::Passed { tests_run: 4 }
        );
        let plans = fixer.plans.lock().unwrap();
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].fix_actions[0].as_str(), "fix_syntax_error");
    }

    #[tokio::test]
    async fn test_zero_budget_exhausts_immediately() {
        let fixer = Arc::new(RecordingFixer::default());
        let settings = SessionSettings {
            max_iterations: 0,
            ..Default::default()
        };
        let orch = orchestrator(fixer.clone(), ScriptedValidator::new(vec![]), settings);

        let snapshot = orch.handle_failure("t", syntax_failure()).await.unwrap();

        assert_eq!(
            snapshot.state,
            SessionState::Exhausted {
                reason: ExhaustionReason::BudgetSpent
            }
        );
        assert!(snapshot.history.is_empty());
        assert!(fixer.plans.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_settings_applies_to_new_sessions_only() {
        let orch = orchestrator(
            Arc::new(RecordingFixer::default()),
            ScriptedValidator::new(vec![passing(), passing()]),
            SessionSettings::default(),
        );
        let first = orch.handle_failure("a", syntax_failure()).await.unwrap();

        orch.update_settings(SessionSettings {
            max_iterations: 7,
            ..Default::default()
        });
        let second = orch.handle_failure("b", syntax_failure()).await.unwrap();

        assert_eq!(first.settings.max_iterations, 3);
        assert_eq!(second.settings.max_iterations, 7);
    }

    /// Fixer whose apply never completes.
    struct StuckFixer;

    #[async_trait]
    impl FixExecutor for StuckFixer {
        async fn apply(&self, _plan: &FixPlan) -> Result<Vec<ActionName>, FixExecutionFailure> {
            std::future::pending().await
        }
    }

    #[test]
    fn test_abandon_guard_aborts_live_session() {
        let session = Arc::new(RepairSession::new("t", SessionSettings::default()));
        session.transition(SessionState::Routing).unwrap();
        session.transition(SessionState::Fixing).unwrap();

        drop(AbandonGuard(Arc::clone(&session)));

        assert_eq!(
            session.state(),
            SessionState::Aborted {
                reason: AbortReason::Cancelled
            }
        );
    }

    #[test]
    fn test_abandon_guard_leaves_terminal_session_alone() {
        let session = Arc::new(RepairSession::new("t", SessionSettings::default()));
        session
            .transition(SessionState::Exhausted {
                reason: ExhaustionReason::BudgetSpent,
            })
            .unwrap();

        drop(AbandonGuard(Arc::clone(&session)));

        assert_eq!(
            session.state(),
            SessionState::Exhausted {
                reason: ExhaustionReason::BudgetSpent
            }
        );
    }

    #[tokio::test]
    async fn test_dropped_run_frees_target() {
        let engine = AnalysisEngine::new(
            PatternMatcher::new(),
            QualityAnalyzer::new(Arc::new(MemoryArtifactSource::new())),
        );
        let orch = RepairOrchestrator::new(
            engine,
            Arc::new(StuckFixer),
            Arc::new(ScriptedValidator::new(vec![])),
            SessionSettings::default(),
        );

        let timed_out = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            orch.handle_failure("todo-api", syntax_failure()),
        )
        .await;

        assert!(timed_out.is_err());
        assert_eq!(orch.registry().live_count().await, 0);
        let session = orch.session("todo-api").await.unwrap();
        assert_eq!(
            session.state(),
            SessionState::Aborted {
                reason: AbortReason::Cancelled
            }
        );
        assert!(session.history().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_without_session_is_noop() {
        let orch = orchestrator(
            Arc::new(RecordingFixer::default()),
            ScriptedValidator::new(vec![]),
            SessionSettings::default(),
        );
        assert!(!orch.cancel("missing").await);
    }

    #[test]
    fn test_context_summary_mentions_previous() {
        let session = RepairSession::new("todo-api", SessionSettings::default());
        assert_eq!(
            context_summary(&session, 1, None),
            "Repair target 'todo-api', iteration 1 of 3."
        );
        let previous = Diagnosis::inconclusive(crate::diagnosis::ReasonerUsage::NotTriggered);
        let text = context_summary(&session, 2, Some(&previous));
        assert!(text.contains("iteration 2 of 3"));
        assert!(text.contains("manual_review"));
    }
}
