//! End-to-end tests for the analysis pass and the repair loop.
//!
//! Fixers and validators are scripted in-test; nothing here touches the
//! network or spawns processes.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Notify;
use triage::analysis::AnalysisEngine;
use triage::audit::AuditLogger;
use triage::diagnosis::{
    ActionName, Category, EvidenceSource, FailureReport, FixPlan, FixerRole, Priority,
    ReasonerUsage,
};
use triage::errors::{FixExecutionFailure, SessionError, ValidatorInfrastructureFailure};
use triage::orchestrator::{FixExecutor, RepairOrchestrator, Validator};
use triage::patterns::{PatternMatcher, Signature};
use triage::quality::{MemoryArtifactSource, QualityAnalyzer};
use triage::reasoner::{ReasonerGateway, ReasonerRequest, SemanticReasoner};
use triage::session::{
    AbortReason, ExhaustionReason, FixOutcome, SessionSettings, SessionState, ValidationOutcome,
};

// =============================================================================
// Collaborators
// =============================================================================

#[derive(Default)]
struct ScriptedFixer {
    /// Number of leading calls that fail.
    fail_first: usize,
    calls: AtomicUsize,
    gate: Option<Arc<Notify>>,
    plans: Mutex<Vec<FixPlan>>,
}

impl ScriptedFixer {
    fn ok() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn failing() -> Arc<Self> {
        Self::flaky(usize::MAX)
    }

    fn flaky(fail_first: usize) -> Arc<Self> {
        Arc::new(Self {
            fail_first,
            ..Default::default()
        })
    }

    fn gated(gate: Arc<Notify>) -> Arc<Self> {
        Arc::new(Self {
            gate: Some(gate),
            ..Default::default()
        })
    }

    fn plans(&self) -> Vec<FixPlan> {
        self.plans.lock().unwrap().clone()
    }
}

#[async_trait]
impl FixExecutor for ScriptedFixer {
    async fn apply(&self, plan: &FixPlan) -> Result<Vec<ActionName>, FixExecutionFailure> {
        self.plans.lock().unwrap().push(plan.clone());
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if call < self.fail_first {
            return Err(FixExecutionFailure::Rejected {
                role: plan.primary_swea.to_string(),
                reason: "generator crashed".to_string(),
            });
        }
        Ok(plan.fix_actions.clone())
    }
}

struct ScriptedValidator {
    script: Mutex<VecDeque<Result<FailureReport, ValidatorInfrastructureFailure>>>,
    calls: AtomicUsize,
}

impl ScriptedValidator {
    fn new(script: Vec<Result<FailureReport, ValidatorInfrastructureFailure>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Validator for ScriptedValidator {
    async fn validate(
        &self,
        _artifacts: &[triage::diagnosis::ArtifactRef],
    ) -> Result<FailureReport, ValidatorInfrastructureFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ValidatorInfrastructureFailure::Runner("script exhausted".into())))
    }
}

struct CountingReasoner {
    calls: AtomicUsize,
}

#[async_trait]
impl SemanticReasoner for CountingReasoner {
    async fn reason(&self, _request: &ReasonerRequest) -> anyhow::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(r#"{"category": "other", "suggested_target": "BackendSWEA",
               "confidence": 0.5, "root_cause_summary": "unused"}"#
            .to_string())
    }
}

struct HangingReasoner;

#[async_trait]
impl SemanticReasoner for HangingReasoner {
    async fn reason(&self, _request: &ReasonerRequest) -> anyhow::Result<String> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(String::new())
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn local_engine() -> AnalysisEngine {
    AnalysisEngine::new(
        PatternMatcher::new(),
        QualityAnalyzer::new(Arc::new(MemoryArtifactSource::new())),
    )
}

fn settings(max_iterations: u32) -> SessionSettings {
    SessionSettings {
        max_iterations,
        ..Default::default()
    }
}

fn orchestrator(
    fixer: Arc<ScriptedFixer>,
    validator: Arc<ScriptedValidator>,
    settings: SessionSettings,
) -> RepairOrchestrator {
    RepairOrchestrator::new(local_engine(), fixer, validator, settings)
}

fn failing(stderr: &str) -> FailureReport {
    FailureReport::new(stderr, "", 1).with_test_counts(5, 2)
}

fn passing() -> FailureReport {
    FailureReport::new("", "5 passed", 0).with_test_counts(5, 0)
}

const SYNTAX: &str = "  File \"app/routes.py\", line 12\n    def create_todo(\n    ^\nSyntaxError: invalid syntax";
const IMPORT: &str = "ModuleNotFoundError: No module named 'sqlalchemy'";
const DB_DOWN: &str = "psycopg2.OperationalError: could not connect to server: Connection refused";

// =============================================================================
// Routing
// =============================================================================

mod routing {
    use super::*;

    #[tokio::test]
    async fn test_confident_syntax_error_skips_reasoner() {
        let report = failing("SyntaxError: invalid syntax");

        let candidates = PatternMatcher::new().match_failure(&report);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].category, Category::SyntaxError);
        assert_eq!(candidates[0].confidence, 0.9);
        assert_eq!(candidates[0].suggested_target, FixerRole::Backend);
        assert_eq!(candidates[0].evidence_source, EvidenceSource::Pattern);

        let reasoner = Arc::new(CountingReasoner {
            calls: AtomicUsize::new(0),
        });
        let engine = local_engine().with_gateway(ReasonerGateway::new(
            reasoner.clone(),
            Duration::from_secs(5),
        ));
        let diagnosis = engine
            .analyze(&report, &SessionSettings::default(), "a")
            .await;

        assert_eq!(reasoner.calls.load(Ordering::SeqCst), 0);
        assert_eq!(diagnosis.reasoner, ReasonerUsage::NotTriggered);
        let plan = diagnosis.to_fix_plan();
        assert_eq!(plan.primary_swea, FixerRole::Backend);
        assert_eq!(plan.priority, Priority::High);
    }

    #[tokio::test]
    async fn test_severity_breaks_equal_confidence() {
        let signatures = vec![
            Signature::new(
                "endpoint",
                "route missing",
                Category::EndpointMissing,
                0.8,
                FixerRole::Backend,
                &[r"404 Not Found"],
            )
            .unwrap(),
            Signature::new(
                "jsx_syntax",
                "ui parse error",
                Category::SyntaxError,
                0.8,
                FixerRole::Frontend,
                &[r"SyntaxError: Unexpected token"],
            )
            .unwrap(),
        ];
        let engine = AnalysisEngine::new(
            PatternMatcher::with_signatures(signatures),
            QualityAnalyzer::new(Arc::new(MemoryArtifactSource::new())),
        );
        let report = failing("GET /api/todos -> 404 Not Found\nSyntaxError: Unexpected token '<'");
        let settings = SessionSettings {
            enable_reasoner: false,
            ..Default::default()
        };

        let diagnosis = engine.analyze(&report, &settings, "b").await;

        assert_eq!(diagnosis.primary_category, Category::SyntaxError);
        assert_eq!(diagnosis.primary_target, FixerRole::Frontend);
        assert_eq!(diagnosis.secondary_target, Some(FixerRole::Backend));
        assert!(matches!(diagnosis.reasoner, ReasonerUsage::Disabled { .. }));
    }

    #[tokio::test]
    async fn test_same_target_candidates_fold_actions() {
        let report = failing("SyntaxError: invalid syntax\nGET /todos 404 Not Found");
        let diagnosis = local_engine()
            .analyze(&report, &SessionSettings::default(), "b")
            .await;

        assert_eq!(diagnosis.primary_category, Category::SyntaxError);
        assert_eq!(diagnosis.primary_target, FixerRole::Backend);
        assert_eq!(diagnosis.secondary_target, None);
        let actions: Vec<&str> = diagnosis.primary_actions.iter().map(|a| a.as_str()).collect();
        assert_eq!(
            actions,
            vec!["fix_syntax_error", "add_missing_endpoint", "register_router"]
        );
    }

    #[tokio::test]
    async fn test_no_evidence_goes_to_manual_review() {
        let report = failing("tests exited unexpectedly");
        let settings = SessionSettings {
            enable_reasoner: false,
            ..Default::default()
        };

        let diagnosis = local_engine().analyze(&report, &settings, "c").await;

        assert_eq!(diagnosis.primary_target, FixerRole::ManualReview);
        assert_eq!(diagnosis.primary_confidence, 0.0);
        assert!(diagnosis.escalate);
        assert_eq!(diagnosis.to_fix_plan().priority, Priority::Low);
    }

    #[tokio::test]
    async fn test_repeated_diagnosis_exhausts_early() {
        let fixer = ScriptedFixer::ok();
        let validator = ScriptedValidator::new(vec![Ok(failing(DB_DOWN)), Ok(failing(DB_DOWN))]);
        let orch = orchestrator(fixer.clone(), validator.clone(), settings(3));

        let snapshot = orch.handle_failure("todo-api", failing(DB_DOWN)).await.unwrap();

        assert_eq!(
            snapshot.state,
            SessionState::Exhausted {
                reason: ExhaustionReason::NoProgress
            }
        );
        assert_eq!(snapshot.iterations(), 2);
        for record in &snapshot.history {
            assert_eq!(record.diagnosis.primary_category, Category::ConnectionError);
            assert_eq!(record.diagnosis.primary_target, FixerRole::Database);
        }
        assert_eq!(fixer.plans().len(), 2);
    }

    #[tokio::test]
    async fn test_validator_failure_aborts_and_keeps_history() {
        let validator = ScriptedValidator::new(vec![
            Ok(failing(IMPORT)),
            Err(ValidatorInfrastructureFailure::Transport(
                "test runner unreachable".into(),
            )),
        ]);
        let orch = orchestrator(ScriptedFixer::ok(), validator, settings(3));

        let snapshot = orch.handle_failure("todo-api", failing(SYNTAX)).await.unwrap();

        assert!(matches!(
            snapshot.state,
            SessionState::Aborted {
                reason: AbortReason::ValidatorInfrastructure { .. }
            }
        ));
        assert_eq!(snapshot.iterations(), 2);
        let first = &snapshot.history[0];
        assert_eq!(first.iteration_index, 1);
        assert_eq!(first.diagnosis.primary_category, Category::SyntaxError);
        assert_eq!(
            first.validation_outcome,
            ValidationOutcome::Failed {
                tests_run: 5,
                tests_failed: 2,
                exit_code: 1
            }
        );
        assert!(matches!(
            snapshot.history[1].validation_outcome,
            ValidationOutcome::InfrastructureFailure { .. }
        ));
        assert!(snapshot.finished_at.is_some());
    }
}

// =============================================================================
// Loop behavior
// =============================================================================

mod repair_loop {
    use super::*;

    #[tokio::test]
    async fn test_succeeds_after_second_iteration() {
        let validator = ScriptedValidator::new(vec![Ok(failing(IMPORT)), Ok(passing())]);
        let orch = orchestrator(ScriptedFixer::ok(), validator, settings(3));

        let snapshot = orch.handle_failure("todo-api", failing(SYNTAX)).await.unwrap();

        assert_eq!(snapshot.state, SessionState::Succeeded);
        assert_eq!(snapshot.iterations(), 2);
        assert_eq!(
            snapshot.history[1].diagnosis.primary_category,
            Category::ImportError
        );
        assert!(snapshot.history[1].validation_outcome.passed());
        assert!(!snapshot.history[0].actions_applied.is_empty());
    }

    #[tokio::test]
    async fn test_history_never_exceeds_budget() {
        let validator = ScriptedValidator::new(vec![
            Ok(failing(IMPORT)),
            Ok(failing(DB_DOWN)),
            Ok(failing(SYNTAX)),
            Ok(failing(IMPORT)),
        ]);
        let orch = orchestrator(ScriptedFixer::ok(), validator.clone(), settings(3));

        let snapshot = orch.handle_failure("todo-api", failing(SYNTAX)).await.unwrap();

        assert_eq!(
            snapshot.state,
            SessionState::Exhausted {
                reason: ExhaustionReason::BudgetSpent
            }
        );
        assert_eq!(snapshot.iterations(), 3);
        assert_eq!(validator.calls(), 3);
        let indices: Vec<u32> = snapshot.history.iter().map(|r| r.iteration_index).collect();
        assert_eq!(indices, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_fix_failures_consume_budget_without_validation() {
        let fixer = ScriptedFixer::failing();
        let validator = ScriptedValidator::new(vec![]);
        let orch = orchestrator(fixer.clone(), validator.clone(), settings(2));

        let snapshot = orch.handle_failure("todo-api", failing(SYNTAX)).await.unwrap();

        assert_eq!(
            snapshot.state,
            SessionState::Exhausted {
                reason: ExhaustionReason::BudgetSpent
            }
        );
        assert_eq!(snapshot.iterations(), 2);
        assert_eq!(validator.calls(), 0);
        for record in &snapshot.history {
            assert!(matches!(record.fix_outcome, FixOutcome::Failed { .. }));
            assert_eq!(record.validation_outcome, ValidationOutcome::NotRun);
            assert!(record.actions_applied.is_empty());
        }
    }

    #[tokio::test]
    async fn test_retry_after_failed_fix_is_not_a_stall() {
        let fixer = ScriptedFixer::flaky(1);
        let validator =
            ScriptedValidator::new(vec![Ok(failing(IMPORT)), Ok(failing(DB_DOWN))]);
        let orch = orchestrator(fixer.clone(), validator.clone(), settings(3));

        let snapshot = orch.handle_failure("todo-api", failing(SYNTAX)).await.unwrap();

        assert_eq!(
            snapshot.state,
            SessionState::Exhausted {
                reason: ExhaustionReason::BudgetSpent
            }
        );
        assert_eq!(snapshot.iterations(), 3);
        assert_eq!(validator.calls(), 2);
        assert!(matches!(
            snapshot.history[0].fix_outcome,
            FixOutcome::Failed { .. }
        ));
        // Same report, same diagnosis, but the first fix never landed.
        assert_eq!(snapshot.history[1].diagnosis.primary_category, Category::SyntaxError);
        assert_eq!(snapshot.history[1].fix_outcome, FixOutcome::Applied);
        assert_eq!(snapshot.history[2].diagnosis.primary_category, Category::ImportError);
    }

    #[tokio::test]
    async fn test_reasoner_timeout_falls_back_and_is_recorded() {
        let engine = local_engine().with_gateway(ReasonerGateway::new(
            Arc::new(HangingReasoner),
            Duration::from_secs(60),
        ));
        let session_settings = SessionSettings {
            reasoner_timeout_ms: 30,
            ..settings(3)
        };
        let orch = RepairOrchestrator::new(
            engine,
            ScriptedFixer::ok(),
            ScriptedValidator::new(vec![Ok(passing())]),
            session_settings,
        );

        let snapshot = tokio::time::timeout(
            Duration::from_secs(5),
            orch.handle_failure("todo-api", failing("something unrecognizable")),
        )
        .await
        .expect("session must not hang on the reasoner")
        .unwrap();

        assert_eq!(snapshot.state, SessionState::Succeeded);
        let diagnosis = &snapshot.history[0].diagnosis;
        assert!(diagnosis.reasoner.fell_back());
        assert_eq!(diagnosis.primary_target, FixerRole::ManualReview);
    }

    #[tokio::test]
    async fn test_terminal_sessions_are_archived() {
        let dir = TempDir::new().unwrap();
        let logger = AuditLogger::new(dir.path());
        let orch = orchestrator(
            ScriptedFixer::ok(),
            ScriptedValidator::new(vec![Ok(passing())]),
            settings(3),
        )
        .with_audit(logger.clone());

        let snapshot = orch.handle_failure("todo-api", failing(SYNTAX)).await.unwrap();

        let runs = logger.list_runs().unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(logger.load_run(&runs[0]).unwrap(), snapshot);
    }
}

// =============================================================================
// Registry and cancellation
// =============================================================================

mod sessions {
    use super::*;

    async fn wait_for_state(orch: &RepairOrchestrator, target: &str, state: SessionState) {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let Some(session) = orch.session(target).await {
                    if session.state() == state {
                        return;
                    }
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("session never reached the expected state");
    }

    #[tokio::test]
    async fn test_cancel_between_iterations_keeps_history() {
        let gate = Arc::new(Notify::new());
        let orch = Arc::new(orchestrator(
            ScriptedFixer::gated(gate.clone()),
            ScriptedValidator::new(vec![Ok(failing(IMPORT))]),
            settings(3),
        ));

        let running = {
            let orch = Arc::clone(&orch);
            tokio::spawn(async move { orch.handle_failure("todo-api", failing(SYNTAX)).await })
        };

        wait_for_state(&orch, "todo-api", SessionState::Fixing).await;
        assert!(orch.cancel("todo-api").await);
        gate.notify_one();

        let snapshot = running.await.unwrap().unwrap();
        assert_eq!(
            snapshot.state,
            SessionState::Aborted {
                reason: AbortReason::Cancelled
            }
        );
        // The in-flight iteration completed before cancellation took effect.
        assert_eq!(snapshot.iterations(), 1);
        assert!(!orch.cancel("todo-api").await);
    }

    #[tokio::test]
    async fn test_live_target_is_busy_and_terminal_target_restarts() {
        let gate = Arc::new(Notify::new());
        let orch = Arc::new(orchestrator(
            ScriptedFixer::gated(gate.clone()),
            ScriptedValidator::new(vec![Ok(passing()), Ok(passing())]),
            settings(3),
        ));

        let running = {
            let orch = Arc::clone(&orch);
            tokio::spawn(async move { orch.handle_failure("todo-api", failing(SYNTAX)).await })
        };
        wait_for_state(&orch, "todo-api", SessionState::Fixing).await;

        let busy = orch.handle_failure("todo-api", failing(SYNTAX)).await;
        assert_eq!(
            busy.unwrap_err(),
            SessionError::Busy {
                target: "todo-api".to_string()
            }
        );

        gate.notify_one();
        let first = running.await.unwrap().unwrap();
        assert_eq!(first.state, SessionState::Succeeded);

        // Fresh session for the same target once the previous one is terminal.
        gate.notify_one();
        let second = orch.handle_failure("todo-api", failing(SYNTAX)).await.unwrap();
        assert_ne!(first.session_id, second.session_id);
        assert_eq!(second.iterations(), 1);
    }

    #[tokio::test]
    async fn test_timed_out_run_does_not_leave_target_busy() {
        let gate = Arc::new(Notify::new());
        let orch = orchestrator(
            ScriptedFixer::gated(gate.clone()),
            ScriptedValidator::new(vec![Ok(passing())]),
            settings(3),
        );

        let timed_out = tokio::time::timeout(
            Duration::from_millis(100),
            orch.handle_failure("todo-api", failing(SYNTAX)),
        )
        .await;
        assert!(timed_out.is_err());

        let abandoned = orch.session("todo-api").await.unwrap();
        assert_eq!(
            abandoned.state(),
            SessionState::Aborted {
                reason: AbortReason::Cancelled
            }
        );
        assert_eq!(orch.registry().live_count().await, 0);

        gate.notify_one();
        let retried = orch.handle_failure("todo-api", failing(SYNTAX)).await.unwrap();
        assert_ne!(retried.session_id, abandoned.id());
        assert_eq!(retried.state, SessionState::Succeeded);
    }
}

// =============================================================================
// Properties
// =============================================================================

mod properties {
    use super::*;

    #[tokio::test]
    async fn test_analysis_is_deterministic() {
        let report = failing(&format!("{}\n{}\n{}", SYNTAX, IMPORT, DB_DOWN));
        let settings = SessionSettings {
            enable_reasoner: false,
            ..Default::default()
        };
        let engine = local_engine();

        let first = engine.analyze(&report, &settings, "p").await;
        let second = engine.analyze(&report, &settings, "p").await;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_confidences_stay_in_unit_range() {
        let engine = local_engine();
        for stderr in [SYNTAX, IMPORT, DB_DOWN, "", "AssertionError: 1 != 2"] {
            let diagnosis = engine
                .analyze(&failing(stderr), &SessionSettings::default(), "p")
                .await;
            assert!((0.0..=1.0).contains(&diagnosis.primary_confidence));
        }
    }

    #[tokio::test]
    async fn test_fix_plan_round_trip_preserves_routing() {
        let report = failing(&format!("{}\n{}", SYNTAX, DB_DOWN));
        let diagnosis = local_engine()
            .analyze(&report, &SessionSettings::default(), "p")
            .await;

        let json = diagnosis.to_fix_plan().to_json().unwrap();
        let parsed = FixPlan::from_json(&json).unwrap();

        assert_eq!(parsed.primary_swea, diagnosis.primary_target);
        assert_eq!(parsed.fix_actions, diagnosis.primary_actions);
        assert_eq!(parsed.priority, diagnosis.priority());
        assert_eq!(parsed.secondary_swea, diagnosis.secondary_target);
    }
}
