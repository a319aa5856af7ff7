//! `FixPlan`: the serialized form of a [`Diagnosis`] handed to a fix executor.
//!
//! ```json
//! {
//!   "primary_swea": "BackendSWEA",
//!   "fix_actions": ["fix_syntax_error"],
//!   "priority": "high",
//!   "confidence": 0.9
//! }
//! ```
//!
//! `secondary_swea` and `secondary_actions` are omitted when there is no
//! secondary route.

use super::{ActionName, Diagnosis, FixerRole, Priority};
use crate::errors::PlanError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixPlan {
    pub primary_swea: FixerRole,
    pub fix_actions: Vec<ActionName>,
    pub priority: Priority,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary_swea: Option<FixerRole>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary_actions: Option<Vec<ActionName>>,
}

impl FixPlan {
    /// Parse and validate a plan received over the wire.
    pub fn from_json(json: &str) -> Result<Self, PlanError> {
        let plan: FixPlan = serde_json::from_str(json)?;
        plan.validate()?;
        Ok(plan)
    }

    pub fn to_json(&self) -> Result<String, PlanError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check the structural invariants of a plan.
    pub fn validate(&self) -> Result<(), PlanError> {
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(PlanError::ConfidenceOutOfRange(self.confidence));
        }
        if self.fix_actions.is_empty() {
            return Err(PlanError::EmptyActions);
        }
        if self.secondary_actions.is_some() && self.secondary_swea.is_none() {
            return Err(PlanError::SecondaryActionsWithoutTarget);
        }
        Ok(())
    }

    /// All fixer roles this plan dispatches to, primary first.
    pub fn targets(&self) -> Vec<FixerRole> {
        let mut targets = vec![self.primary_swea];
        if let Some(secondary) = self.secondary_swea {
            targets.push(secondary);
        }
        targets
    }
}

impl From<&Diagnosis> for FixPlan {
    fn from(diagnosis: &Diagnosis) -> Self {
        let secondary_actions = diagnosis
            .secondary_target
            .and(diagnosis.secondary_actions.clone());
        Self {
            primary_swea: diagnosis.primary_target,
            fix_actions: diagnosis.primary_actions.clone(),
            priority: diagnosis.priority(),
            confidence: diagnosis.primary_confidence,
            secondary_swea: diagnosis.secondary_target,
            secondary_actions,
        }
    }
}
