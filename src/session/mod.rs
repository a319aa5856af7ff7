//! `RepairSession`: aggregate root of one target's repair loop.
//!
//! A session owns a settings snapshot, the append-only history and the
//! current state. Once terminal it rejects every mutation; the history
//! stays readable for audit.

pub mod history;
pub mod state;

pub use history::{FixOutcome, IterationRecord, SessionHistory, ValidationOutcome};
pub use state::{AbortReason, ExhaustionReason, SessionState};

use crate::diagnosis::Diagnosis;
use crate::errors::SessionError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// Configuration captured when a session starts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SessionSettings {
    pub max_iterations: u32,
    pub enable_reasoner: bool,
    pub min_confidence_threshold: f64,
    pub reasoner_timeout_ms: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            max_iterations: 3,
            enable_reasoner: true,
            min_confidence_threshold: 0.6,
            reasoner_timeout_ms: 60_000,
        }
    }
}

impl SessionSettings {
    pub fn reasoner_timeout(&self) -> Duration {
        Duration::from_millis(self.reasoner_timeout_ms)
    }
}

/// Serializable view of a session, used for results and the audit archive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: Uuid,
    pub target: String,
    pub settings: SessionSettings,
    pub state: SessionState,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub history: Vec<IterationRecord>,
}

impl SessionSnapshot {
    pub fn iterations(&self) -> usize {
        self.history.len()
    }

    pub fn final_diagnosis(&self) -> Option<&Diagnosis> {
        self.history.last().map(|r| &r.diagnosis)
    }

    pub fn succeeded(&self) -> bool {
        self.state == SessionState::Succeeded
    }
}

#[derive(Debug)]
pub struct RepairSession {
    session_id: Uuid,
    target: String,
    settings: SessionSettings,
    created_at: DateTime<Utc>,
    history: SessionHistory,
    state: RwLock<SessionState>,
    finished_at: RwLock<Option<DateTime<Utc>>>,
    cancel_requested: AtomicBool,
}

impl RepairSession {
    /// Start a session in `Analyzing`.
    pub fn new(target: &str, settings: SessionSettings) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            target: target.to_string(),
            settings,
            created_at: Utc::now(),
            history: SessionHistory::new(),
            state: RwLock::new(SessionState::Analyzing),
            finished_at: RwLock::new(None),
            cancel_requested: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> Uuid {
        self.session_id
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn settings(&self) -> SessionSettings {
        self.settings
    }

    pub fn state(&self) -> SessionState {
        self.state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn is_terminal(&self) -> bool {
        self.state().is_terminal()
    }

    pub fn history(&self) -> &SessionHistory {
        &self.history
    }

    /// Move to `to`, enforcing the state machine.
    pub fn transition(&self, to: SessionState) -> Result<(), SessionError> {
        let mut state = self
            .state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if state.is_terminal() {
            return Err(SessionError::Terminal {
                state: state.to_string(),
            });
        }
        if !state.can_transition_to(&to) {
            return Err(SessionError::InvalidTransition {
                from: state.name().to_string(),
                to: to.name().to_string(),
            });
        }

        debug!(
            session_id = %self.session_id,
            from = state.name(),
            to = to.name(),
            "session transition"
        );
        if to.is_terminal() {
            *self
                .finished_at
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(Utc::now());
        }
        *state = to;
        Ok(())
    }

    /// Append an iteration. Rejected once terminal or when the budget is full.
    pub fn record_iteration(&self, record: IterationRecord) -> Result<(), SessionError> {
        let state = self.state();
        if state.is_terminal() {
            return Err(SessionError::Terminal {
                state: state.to_string(),
            });
        }
        if self.history.len() >= self.settings.max_iterations as usize {
            return Err(SessionError::HistoryFull {
                max_iterations: self.settings.max_iterations,
            });
        }
        self.history.append(record);
        Ok(())
    }

    /// Whether another iteration fits in the budget.
    pub fn has_budget(&self) -> bool {
        self.history.len() < self.settings.max_iterations as usize
    }

    /// Ask the session to stop at the next iteration boundary.
    pub fn request_cancel(&self) {
        self.cancel_requested.store(true, Ordering::SeqCst);
    }

    pub fn cancel_requested(&self) -> bool {
        self.cancel_requested.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.session_id,
            target: self.target.clone(),
            settings: self.settings,
            state: self.state(),
            created_at: self.created_at,
            finished_at: *self
                .finished_at
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
            history: self.history.snapshot(),
        }
    }
}
