//! Append-only iteration history.
//!
//! Observers read snapshots while the orchestrator appends. The write lock is
//! held only for the push itself.

use crate::diagnosis::{ActionName, Diagnosis, FixPlan};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::RwLock;

/// What the fix executor reported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FixOutcome {
    Applied,
    Failed { message: String },
}

/// What the validator reported after the fix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ValidationOutcome {
    Passed {
        tests_run: u32,
    },
    Failed {
        tests_run: u32,
        tests_failed: u32,
        exit_code: i32,
    },
    /// The test runner itself could not execute.
    InfrastructureFailure {
        message: String,
    },
    /// Validation was skipped because the fix was not applied.
    NotRun,
}

impl ValidationOutcome {
    pub fn passed(&self) -> bool {
        matches!(self, Self::Passed { .. })
    }
}

/// One pass through analyze, route, fix and validate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    /// 1-based.
    pub iteration_index: u32,
    pub diagnosis: Diagnosis,
    pub fix_plan: FixPlan,
    pub actions_applied: Vec<ActionName>,
    pub fix_outcome: FixOutcome,
    pub validation_outcome: ValidationOutcome,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

impl IterationRecord {
    pub fn duration_ms(&self) -> i64 {
        (self.ended_at - self.started_at).num_milliseconds()
    }
}

#[derive(Debug, Default)]
pub struct SessionHistory {
    records: RwLock<Vec<IterationRecord>>,
}

impl SessionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn append(&self, record: IterationRecord) {
        self.records
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(record);
    }

    /// Copy of every record so far, oldest first.
    pub fn snapshot(&self) -> Vec<IterationRecord> {
        self.records
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.records
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn last(&self) -> Option<IterationRecord> {
        self.records
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .last()
            .cloned()
    }
}
