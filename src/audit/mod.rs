//! Archive of finished repair sessions.
//!
//! Sessions are written once, when they reach a terminal state. Statistics
//! are computed by reading the archive back; nothing here is shared with a
//! running session.

use crate::diagnosis::{Category, FixerRole};
use crate::session::{AbortReason, ExhaustionReason, SessionSnapshot, SessionState};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub mod logger;
pub use logger::AuditLogger;

/// Final outcome bucket used in statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionOutcome {
    Succeeded,
    BudgetSpent,
    NoProgress,
    ValidatorFailure,
    Cancelled,
    /// Archived before reaching a terminal state.
    Unfinished,
}

impl SessionOutcome {
    pub fn of(state: &SessionState) -> Self {
        match state {
            SessionState::Succeeded => Self::Succeeded,
            SessionState::Exhausted {
                reason: ExhaustionReason::BudgetSpent,
            } => Self::BudgetSpent,
            SessionState::Exhausted {
                reason: ExhaustionReason::NoProgress,
            } => Self::NoProgress,
            SessionState::Aborted {
                reason: AbortReason::ValidatorInfrastructure { .. },
            } => Self::ValidatorFailure,
            SessionState::Aborted {
                reason: AbortReason::Cancelled,
            } => Self::Cancelled,
            _ => Self::Unfinished,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::BudgetSpent => "budget_spent",
            Self::NoProgress => "no_progress",
            Self::ValidatorFailure => "validator_failure",
            Self::Cancelled => "cancelled",
            Self::Unfinished => "unfinished",
        }
    }
}

/// Cross-session aggregate over archived sessions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    pub sessions: usize,
    pub outcomes: BTreeMap<SessionOutcome, usize>,
    pub total_iterations: usize,
    /// How often each fixer role was the primary target of an iteration.
    pub targets: BTreeMap<FixerRole, usize>,
    /// How often each category was the primary category of an iteration.
    pub categories: BTreeMap<Category, usize>,
    /// Iterations in which the reasoner was consulted.
    pub reasoner_calls: usize,
    /// Reasoner consultations that fell back to local evidence.
    pub reasoner_fallbacks: usize,
}

impl SessionStats {
    pub fn from_sessions<'a>(sessions: impl IntoIterator<Item = &'a SessionSnapshot>) -> Self {
        let mut stats = Self::default();
        for session in sessions {
            stats.sessions += 1;
            *stats
                .outcomes
                .entry(SessionOutcome::of(&session.state))
                .or_default() += 1;
            stats.total_iterations += session.history.len();

            for record in &session.history {
                let diagnosis = &record.diagnosis;
                *stats.targets.entry(diagnosis.primary_target).or_default() += 1;
                *stats
                    .categories
                    .entry(diagnosis.primary_category)
                    .or_default() += 1;
                if diagnosis.reasoner.was_invoked() {
                    stats.reasoner_calls += 1;
                }
                if diagnosis.reasoner.fell_back() {
                    stats.reasoner_fallbacks += 1;
                }
            }
        }
        stats
    }

    pub fn mean_iterations(&self) -> f64 {
        if self.sessions == 0 {
            0.0
        } else {
            self.total_iterations as f64 / self.sessions as f64
        }
    }

    /// Fraction of sessions that succeeded, 0.0 when empty.
    pub fn success_rate(&self) -> f64 {
        if self.sessions == 0 {
            return 0.0;
        }
        let succeeded = self
            .outcomes
            .get(&SessionOutcome::Succeeded)
            .copied()
            .unwrap_or(0);
        succeeded as f64 / self.sessions as f64
    }
}
