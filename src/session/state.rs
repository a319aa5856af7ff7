//! Repair session state machine.
//!
//! ```text
//! Analyzing -> Routing -> Fixing -> Validating -> Succeeded
//!     ^                      |           |------> Exhausted
//!     |                      |           |------> Aborted
//!     +------ Iterating <----+-----------+
//! ```
//!
//! `Succeeded`, `Exhausted` and `Aborted` are terminal.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a session stopped iterating without success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExhaustionReason {
    /// `max_iterations` iterations were recorded.
    BudgetSpent,
    /// Two consecutive iterations produced the same category and target.
    NoProgress,
}

/// Why a session was stopped outside the normal flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AbortReason {
    /// The validator could not run the tests at all.
    ValidatorInfrastructure { message: String },
    /// Cancelled externally between iterations.
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionState {
    Analyzing,
    Routing,
    Fixing,
    Validating,
    Iterating,
    Succeeded,
    Exhausted { reason: ExhaustionReason },
    Aborted { reason: AbortReason },
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::Exhausted { .. } | Self::Aborted { .. }
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Analyzing => "analyzing",
            Self::Routing => "routing",
            Self::Fixing => "fixing",
            Self::Validating => "validating",
            Self::Iterating => "iterating",
            Self::Succeeded => "succeeded",
            Self::Exhausted { .. } => "exhausted",
            Self::Aborted { .. } => "aborted",
        }
    }

    /// Whether `self -> to` is an edge of the state machine.
    pub fn can_transition_to(&self, to: &SessionState) -> bool {
        use SessionState::*;

        if self.is_terminal() {
            return false;
        }
        // Cancellation is accepted from any live state. The orchestrator
        // requests it between iterations and when a run is abandoned midway.
        if matches!(to, Aborted { reason: AbortReason::Cancelled }) {
            return true;
        }
        matches!(
            (self, to),
            (Analyzing, Routing)
                | (Analyzing, Exhausted { .. })
                | (Routing, Fixing)
                | (Fixing, Validating)
                | (Fixing, Iterating)
                | (Fixing, Exhausted { .. })
                | (Validating, Succeeded)
                | (Validating, Exhausted { .. })
                | (Validating, Iterating)
                | (Validating, Aborted { .. })
                | (Iterating, Analyzing)
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exhausted { reason } => match reason {
                ExhaustionReason::BudgetSpent => write!(f, "exhausted (iteration budget spent)"),
                ExhaustionReason::NoProgress => write!(f, "exhausted (no progress)"),
            },
            Self::Aborted { reason } => match reason {
                AbortReason::ValidatorInfrastructure { message } => {
                    write!(f, "aborted (validator failure: {})", message)
                }
                AbortReason::Cancelled => write!(f, "aborted (cancelled)"),
            },
            other => f.write_str(other.name()),
        }
    }
}
