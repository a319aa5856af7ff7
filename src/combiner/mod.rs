//! Decision Combiner: merge candidates into one ranked [`Diagnosis`].
//!
//! 1. Union all candidates and group by category. A group's confidence is
//!    the max of its members, never the mean.
//! 2. Rank groups by confidence, then severity, then earliest registration.
//! 3. The top group is the primary route. The next group with a different
//!    target is the secondary. Groups sharing a route fold their actions
//!    into it in rank order without duplicates.
//!
//! [`evaluate_trigger`] decides, on local evidence alone, whether the
//! semantic reasoner should be consulted before combining.

use crate::diagnosis::{
    ActionName, CandidateDiagnosis, Category, Diagnosis, FixerRole, ReasonerUsage, TriggerReason,
    clamp_confidence,
};
use crate::reasoner::ReasonerVerdict;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Candidates with different targets this close to the top score are ambiguous.
pub const AMBIGUITY_MARGIN: f64 = 0.1;

/// Absorbs float noise so that 0.9 vs 0.8 counts as "within 0.1".
const MARGIN_EPSILON: f64 = 1e-9;

/// Group candidates by category, keeping the strongest member of each group.
///
/// Equal confidences keep the earliest-registered member. Output is in
/// category order, not ranked.
pub fn group_by_category<'a>(
    candidates: impl IntoIterator<Item = &'a CandidateDiagnosis>,
) -> Vec<CandidateDiagnosis> {
    let mut groups: BTreeMap<Category, CandidateDiagnosis> = BTreeMap::new();
    for candidate in candidates {
        let replace = match groups.get(&candidate.category) {
            None => true,
            Some(current) => match candidate.confidence.total_cmp(&current.confidence) {
                Ordering::Greater => true,
                Ordering::Equal => candidate.registration_key() < current.registration_key(),
                Ordering::Less => false,
            },
        };
        if replace {
            groups.insert(candidate.category, candidate.clone());
        }
    }
    groups.into_values().collect()
}

/// Total ranking order: confidence desc, severity, then registration.
pub fn rank_order(a: &CandidateDiagnosis, b: &CandidateDiagnosis) -> Ordering {
    b.confidence
        .total_cmp(&a.confidence)
        .then_with(|| a.category.severity_rank().cmp(&b.category.severity_rank()))
        .then_with(|| a.registration_key().cmp(&b.registration_key()))
}

/// Decide whether local evidence is inconclusive.
///
/// Returns `None` when the local ranking can be trusted as-is.
pub fn evaluate_trigger(
    local: &[CandidateDiagnosis],
    min_confidence_threshold: f64,
) -> Option<TriggerReason> {
    let grouped = group_by_category(local);
    let top_confidence = grouped
        .iter()
        .map(|c| c.confidence)
        .fold(0.0_f64, f64::max);

    if grouped.is_empty() || top_confidence < min_confidence_threshold {
        return Some(TriggerReason::BelowThreshold {
            top_confidence,
            threshold: min_confidence_threshold,
        });
    }

    let mut near_top: Vec<FixerRole> = grouped
        .iter()
        .filter(|c| top_confidence - c.confidence <= AMBIGUITY_MARGIN + MARGIN_EPSILON)
        .map(|c| c.suggested_target)
        .collect();
    near_top.sort();
    near_top.dedup();

    if near_top.len() >= 2 {
        Some(TriggerReason::Ambiguous {
            targets: near_top,
            top_confidence,
        })
    } else {
        None
    }
}

/// Combine all evidence into one diagnosis.
///
/// `reasoner` is the validated reasoner answer when one was obtained. When
/// the reasoner was disabled or failed the caller passes `None` and records
/// the reason in `usage`; the best local candidate then wins even below the
/// confidence threshold.
pub fn combine(
    pattern: &[CandidateDiagnosis],
    quality: &[CandidateDiagnosis],
    reasoner: Option<&ReasonerVerdict>,
    usage: ReasonerUsage,
) -> Diagnosis {
    let mut ranked = group_by_category(
        pattern
            .iter()
            .chain(quality.iter())
            .chain(reasoner.map(|v| &v.candidate)),
    );
    if ranked.is_empty() {
        return Diagnosis::inconclusive(usage);
    }
    ranked.sort_by(rank_order);

    let primary = &ranked[0];
    let mut primary_actions: Vec<ActionName> = Vec::new();
    let mut secondary: Option<&CandidateDiagnosis> = None;
    let mut secondary_actions: Vec<ActionName> = Vec::new();

    for entry in &ranked {
        if entry.suggested_target == primary.suggested_target {
            extend_unique(&mut primary_actions, &entry.actions);
        } else if secondary.is_none_or(|s| s.suggested_target == entry.suggested_target) {
            if secondary.is_none() {
                secondary = Some(entry);
            }
            extend_unique(&mut secondary_actions, &entry.actions);
        }
    }

    let mut secondary_target = secondary.map(|s| s.suggested_target);
    if secondary_target.is_none() {
        if let Some(hint) = reasoner
            .and_then(|v| v.secondary_target)
            .filter(|t| *t != primary.suggested_target)
        {
            let category = reasoner.map(|v| v.candidate.category).unwrap_or(Category::Other);
            secondary_target = Some(hint);
            secondary_actions = category.default_actions(hint);
        }
    }

    let root_cause_summary = match reasoner {
        Some(verdict) => verdict.root_cause_summary.clone(),
        None => summarize(primary, secondary),
    };

    Diagnosis {
        primary_category: primary.category,
        primary_target: primary.suggested_target,
        primary_actions,
        primary_confidence: clamp_confidence(primary.confidence),
        secondary_actions: secondary_target.map(|_| secondary_actions),
        secondary_target,
        root_cause_summary,
        escalate: primary.suggested_target == FixerRole::ManualReview,
        reasoner: usage,
        candidates_considered: ranked.len(),
    }
}

fn extend_unique(into: &mut Vec<ActionName>, actions: &[ActionName]) {
    for action in actions {
        if !into.contains(action) {
            into.push(action.clone());
        }
    }
}

fn summarize(primary: &CandidateDiagnosis, secondary: Option<&CandidateDiagnosis>) -> String {
    let mut summary = match &primary.evidence {
        Some(evidence) => format!(
            "{} detected by {} {}: {}",
            primary.category, primary.evidence_source, primary.origin, evidence
        ),
        None => format!(
            "{} detected by {} {}",
            primary.category, primary.evidence_source, primary.origin
        ),
    };
    if let Some(secondary) = secondary {
        summary.push_str(&format!(
            "; also {} for {}",
            secondary.category, secondary.suggested_target
        ));
    }
    summary
}
