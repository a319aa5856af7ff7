//! Core data model for failure triage.
//!
//! A validation run produces a [`FailureReport`]. Each evidence source turns
//! it into zero or more [`CandidateDiagnosis`] values, and the combiner folds
//! those into one ranked [`Diagnosis`]. The externally emitted form of a
//! diagnosis is the [`FixPlan`].
//!
//! ## Example
//!
//! ```
//! use triage::diagnosis::{CandidateDiagnosis, Category, EvidenceSource, FixerRole};
//!
//! let candidate = CandidateDiagnosis::new(
//!     Category::SyntaxError,
//!     0.9,
//!     FixerRole::Backend,
//!     EvidenceSource::Pattern,
//! );
//! assert_eq!(candidate.actions[0].as_str(), "fix_syntax_error");
//! ```

pub mod fix_plan;

pub use fix_plan::FixPlan;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Opaque handle to a generated artifact (file or module).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactRef(String);

impl ArtifactRef {
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Immutable input produced once per validation run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FailureReport {
    #[serde(default)]
    pub stderr_text: String,
    #[serde(default)]
    pub stdout_text: String,
    #[serde(default)]
    pub exit_code: i32,
    #[serde(default)]
    pub artifact_refs: Vec<ArtifactRef>,
    #[serde(default)]
    pub tests_run: u32,
    #[serde(default)]
    pub tests_failed: u32,
}

impl FailureReport {
    /// Create a report from raw process output.
    pub fn new(stderr_text: &str, stdout_text: &str, exit_code: i32) -> Self {
        Self {
            stderr_text: stderr_text.to_string(),
            stdout_text: stdout_text.to_string(),
            exit_code,
            ..Default::default()
        }
    }

    pub fn with_artifacts(mut self, refs: impl IntoIterator<Item = ArtifactRef>) -> Self {
        self.artifact_refs.extend(refs);
        self
    }

    pub fn with_test_counts(mut self, tests_run: u32, tests_failed: u32) -> Self {
        self.tests_run = tests_run;
        self.tests_failed = tests_failed;
        self
    }

    /// A run passes only when nothing failed and the runner exited cleanly.
    pub fn is_passing(&self) -> bool {
        self.tests_failed == 0 && self.exit_code == 0
    }

    /// Whether there is any process output to inspect.
    pub fn has_output(&self) -> bool {
        !self.stderr_text.trim().is_empty() || !self.stdout_text.trim().is_empty()
    }
}

/// Failure category.
///
/// Declaration order is the severity order used for tie-breaking: the first
/// five entries are the fixed table, later entries are extensions appended
/// after it, and `Other` always ranks last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    SyntaxError,
    ImportError,
    EndpointMissing,
    AssertionFailure,
    ConnectionError,
    SchemaMismatch,
    ValidationError,
    TypeMismatch,
    TestSetupError,
    MissingSection,
    ArtifactUnreadable,
    Other,
}

impl Category {
    pub const ALL: [Category; 12] = [
        Category::SyntaxError,
        Category::ImportError,
        Category::EndpointMissing,
        Category::AssertionFailure,
        Category::ConnectionError,
        Category::SchemaMismatch,
        Category::ValidationError,
        Category::TypeMismatch,
        Category::TestSetupError,
        Category::MissingSection,
        Category::ArtifactUnreadable,
        Category::Other,
    ];

    /// Position in the severity table; lower is more severe.
    pub fn severity_rank(self) -> usize {
        Self::ALL.iter().position(|c| *c == self).unwrap_or(Self::ALL.len())
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::SyntaxError => "syntax_error",
            Self::ImportError => "import_error",
            Self::EndpointMissing => "endpoint_missing",
            Self::AssertionFailure => "assertion_failure",
            Self::ConnectionError => "connection_error",
            Self::SchemaMismatch => "schema_mismatch",
            Self::ValidationError => "validation_error",
            Self::TypeMismatch => "type_mismatch",
            Self::TestSetupError => "test_setup_error",
            Self::MissingSection => "missing_section",
            Self::ArtifactUnreadable => "artifact_unreadable",
            Self::Other => "other",
        }
    }

    /// Map a free-form label onto a known category. Unknown labels become `Other`.
    pub fn from_label(label: &str) -> Self {
        let normalized = label.trim().to_lowercase().replace([' ', '-'], "_");
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == normalized)
            .unwrap_or(Self::Other)
    }

    /// Repair actions a fixer of `target` should take for this category.
    pub fn default_actions(self, target: FixerRole) -> Vec<ActionName> {
        let names: &[&str] = match (self, target) {
            (_, FixerRole::ManualReview) => &["escalate_to_human"],
            (Self::SyntaxError, _) => &["fix_syntax_error"],
            (Self::ImportError, FixerRole::Frontend) => &["fix_imports", "install_missing_package"],
            (Self::ImportError, _) => &["fix_imports", "add_missing_dependency"],
            (Self::EndpointMissing, _) => &["add_missing_endpoint", "register_router"],
            (Self::AssertionFailure, FixerRole::Test) => &["update_test_assertions"],
            (Self::AssertionFailure, _) => &["fix_business_logic"],
            (Self::ConnectionError, _) => &["fix_database_connection", "verify_database_config"],
            (Self::SchemaMismatch, _) => &["create_missing_tables", "run_migrations"],
            (Self::ValidationError, _) => &["fix_request_schema"],
            (Self::TypeMismatch, _) => &["fix_type_error"],
            (Self::TestSetupError, _) => &["fix_test_fixtures"],
            (Self::MissingSection, _) => &["regenerate_missing_section"],
            (Self::ArtifactUnreadable, _) => &["regenerate_artifact"],
            (Self::Other, _) => &["investigate_failure"],
        };
        names.iter().map(|n| ActionName::new(n)).collect()
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fixer role a plan is routed to. Always drawn from this fixed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FixerRole {
    #[serde(rename = "BackendSWEA")]
    Backend,
    #[serde(rename = "DatabaseSWEA")]
    Database,
    #[serde(rename = "FrontendSWEA")]
    Frontend,
    #[serde(rename = "TestSWEA")]
    Test,
    #[serde(rename = "manual_review")]
    ManualReview,
}

impl FixerRole {
    pub const ALL: [FixerRole; 5] = [
        FixerRole::Backend,
        FixerRole::Database,
        FixerRole::Frontend,
        FixerRole::Test,
        FixerRole::ManualReview,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Backend => "BackendSWEA",
            Self::Database => "DatabaseSWEA",
            Self::Frontend => "FrontendSWEA",
            Self::Test => "TestSWEA",
            Self::ManualReview => "manual_review",
        }
    }
}

impl fmt::Display for FixerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FixerRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "backendswea" | "backend" => Ok(Self::Backend),
            "databaseswea" | "database" => Ok(Self::Database),
            "frontendswea" | "frontend" => Ok(Self::Frontend),
            "testswea" | "test" => Ok(Self::Test),
            "manual_review" | "manual" => Ok(Self::ManualReview),
            _ => Err(format!(
                "Unknown fixer role '{}'. Valid values: BackendSWEA, DatabaseSWEA, FrontendSWEA, TestSWEA, manual_review",
                s
            )),
        }
    }
}

/// Name of a repair action understood by a fixer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionName(String);

impl ActionName {
    pub fn new(name: &str) -> Self {
        Self(name.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which component produced a candidate.
///
/// Ordering is registration order across sources: pattern signatures are
/// registered before quality checks, and the reasoner last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceSource {
    Pattern,
    Quality,
    Reasoner,
}

impl fmt::Display for EvidenceSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pattern => write!(f, "pattern"),
            Self::Quality => write!(f, "quality"),
            Self::Reasoner => write!(f, "reasoner"),
        }
    }
}

/// A single weighted hypothesis about why a run failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateDiagnosis {
    pub category: Category,
    /// Always within [0, 1].
    pub confidence: f64,
    pub suggested_target: FixerRole,
    pub evidence_source: EvidenceSource,
    pub actions: Vec<ActionName>,
    /// Identifier of the signature or check that produced this candidate.
    #[serde(default)]
    pub origin: String,
    /// Registration index of `origin` within its source's rule table.
    #[serde(default)]
    pub registration: usize,
    /// Excerpt of the evidence (matching line, artifact handle).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<String>,
}

impl CandidateDiagnosis {
    /// Create a candidate with the category's default actions for `target`.
    ///
    /// Confidence is clamped to the 0.0-1.0 range.
    pub fn new(
        category: Category,
        confidence: f64,
        target: FixerRole,
        source: EvidenceSource,
    ) -> Self {
        Self {
            category,
            confidence: clamp_confidence(confidence),
            suggested_target: target,
            evidence_source: source,
            actions: category.default_actions(target),
            origin: String::new(),
            registration: 0,
            evidence: None,
        }
    }

    pub fn with_origin(mut self, origin: &str, registration: usize) -> Self {
        self.origin = origin.to_string();
        self.registration = registration;
        self
    }

    pub fn with_evidence(mut self, evidence: &str) -> Self {
        self.evidence = Some(evidence.to_string());
        self
    }

    /// Replace the default actions. An empty list keeps the defaults.
    pub fn with_actions(mut self, actions: Vec<ActionName>) -> Self {
        if !actions.is_empty() {
            self.actions = actions;
        }
        self
    }

    /// Key for the "earliest-registered" tie-break.
    pub fn registration_key(&self) -> (EvidenceSource, usize) {
        (self.evidence_source, self.registration)
    }
}

/// Why the semantic reasoner was (or would have been) consulted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TriggerReason {
    /// No candidate reached the confidence threshold.
    BelowThreshold { top_confidence: f64, threshold: f64 },
    /// Candidates with different targets are within the ambiguity margin of the top score.
    Ambiguous {
        targets: Vec<FixerRole>,
        top_confidence: f64,
    },
}

impl fmt::Display for TriggerReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BelowThreshold {
                top_confidence,
                threshold,
            } => write!(
                f,
                "top confidence {:.2} below threshold {:.2}",
                top_confidence, threshold
            ),
            Self::Ambiguous {
                targets,
                top_confidence,
            } => {
                let names: Vec<&str> = targets.iter().map(|t| t.as_str()).collect();
                write!(
                    f,
                    "ambiguous between {} near {:.2}",
                    names.join(", "),
                    top_confidence
                )
            }
        }
    }
}

/// Audit record of how the semantic reasoner participated in a diagnosis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReasonerUsage {
    /// Local evidence was conclusive.
    NotTriggered,
    /// Local evidence was inconclusive but the reasoner is disabled.
    Disabled { trigger: TriggerReason },
    /// The reasoner answered and its candidate was merged.
    Used {
        trigger: TriggerReason,
        confidence: f64,
    },
    /// The reasoner failed; the best local candidate was used instead.
    FellBack {
        trigger: TriggerReason,
        failure: String,
    },
}

impl ReasonerUsage {
    pub fn fell_back(&self) -> bool {
        matches!(self, Self::FellBack { .. })
    }

    pub fn was_invoked(&self) -> bool {
        matches!(self, Self::Used { .. } | Self::FellBack { .. })
    }
}

/// Urgency derived from the primary confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    /// >= 0.8 is high, >= 0.5 is medium, anything lower is low.
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence >= 0.8 {
            Self::High
        } else if confidence >= 0.5 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::High => write!(f, "high"),
            Self::Medium => write!(f, "medium"),
            Self::Low => write!(f, "low"),
        }
    }
}

/// The combined, ranked explanation of a failure plus its routing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnosis {
    pub primary_category: Category,
    pub primary_target: FixerRole,
    pub primary_actions: Vec<ActionName>,
    pub primary_confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary_target: Option<FixerRole>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary_actions: Option<Vec<ActionName>>,
    pub root_cause_summary: String,
    /// Set when a human must look at this failure.
    #[serde(default)]
    pub escalate: bool,
    pub reasoner: ReasonerUsage,
    /// Number of grouped candidates that were ranked.
    #[serde(default)]
    pub candidates_considered: usize,
}

impl Diagnosis {
    /// The diagnosis used when no source produced any candidate.
    pub fn inconclusive(reasoner: ReasonerUsage) -> Self {
        Self {
            primary_category: Category::Other,
            primary_target: FixerRole::ManualReview,
            primary_actions: Category::Other.default_actions(FixerRole::ManualReview),
            primary_confidence: 0.0,
            secondary_target: None,
            secondary_actions: None,
            root_cause_summary: "No known failure signature or structural defect was found; \
                                 human review required"
                .to_string(),
            escalate: true,
            reasoner,
            candidates_considered: 0,
        }
    }

    pub fn priority(&self) -> Priority {
        Priority::from_confidence(self.primary_confidence)
    }

    /// Identity used for no-progress detection across iterations.
    pub fn progress_key(&self) -> (Category, FixerRole) {
        (self.primary_category, self.primary_target)
    }

    pub fn is_manual_review(&self) -> bool {
        self.primary_target == FixerRole::ManualReview
    }

    pub fn to_fix_plan(&self) -> FixPlan {
        FixPlan::from(self)
    }
}

impl fmt::Display for Diagnosis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {} ({:.0}% confidence, {} priority)",
            self.primary_category,
            self.primary_target,
            self.primary_confidence * 100.0,
            self.priority()
        )?;
        if let Some(secondary) = self.secondary_target {
            write!(f, ", secondary {}", secondary)?;
        }
        Ok(())
    }
}

/// Clamp confidence to the valid 0.0-1.0 range. NaN becomes 0.
pub fn clamp_confidence(confidence: f64) -> f64 {
    if confidence.is_nan() {
        0.0
    } else {
        confidence.clamp(0.0, 1.0)
    }
}
