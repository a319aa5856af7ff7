//! Typed error hierarchy for the triage engine.
//!
//! The enums follow the failure taxonomy of the repair loop:
//! - `GatewayFailure`: semantic reasoner unreachable, timed out or malformed (recovered locally)
//! - `FixExecutionFailure`: a fixer could not apply a plan (consumes one iteration)
//! - `ValidatorInfrastructureFailure`: the test runner itself broke (aborts the session)
//! - `SessionError`: illegal state-machine use
//! - `PlanError`: a `FixPlan` failed to parse or violates its invariants
//! - `ConfigError`: configuration could not be loaded
//!
//! There is no error for an inconclusive analysis. That outcome is a
//! `Diagnosis` routed to `manual_review`.

use thiserror::Error;

/// Failure of the semantic reasoner gateway. Always recovered by falling
/// back to the best local candidate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayFailure {
    #[error("Reasoner timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    #[error("Reasoner transport error: {0}")]
    Transport(String),

    #[error("Reasoner returned a malformed response: {0}")]
    Malformed(String),

    #[error("Reasoner response is missing required field '{0}'")]
    MissingField(String),
}

/// The external fixer reported it could not apply the plan.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FixExecutionFailure {
    #[error("Fixer {role} rejected the plan: {reason}")]
    Rejected { role: String, reason: String },

    #[error("Fix execution failed: {0}")]
    Failed(String),
}

/// The validator could not run the tests at all. Distinct from tests failing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidatorInfrastructureFailure {
    #[error("Validator transport error: {0}")]
    Transport(String),

    #[error("Test runner could not execute: {0}")]
    Runner(String),
}

/// Errors from driving a `RepairSession` state machine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("Session is terminal ({state}); no further transitions are permitted")]
    Terminal { state: String },

    #[error("Invalid session transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Session history already holds {max_iterations} iterations")]
    HistoryFull { max_iterations: u32 },

    #[error("A repair session for '{target}' is already running")]
    Busy { target: String },
}

/// Errors from parsing or validating a serialized `FixPlan`.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("Invalid fix plan JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Fix plan has secondary_actions without secondary_swea")]
    SecondaryActionsWithoutTarget,

    #[error("Fix plan confidence {0} is outside [0, 1]")]
    ConfidenceOutOfRange(f64),

    #[error("Fix plan has no fix_actions")]
    EmptyActions,
}

/// Errors from loading engine configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {source}")]
    Read {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse triage.toml: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}
