//! Human-readable rendering of diagnoses, sessions and audit statistics.
//!
//! Renderers return strings so commands decide where output goes and tests
//! can inspect it.

pub mod icons;

use crate::audit::SessionStats;
use crate::diagnosis::{Diagnosis, ReasonerUsage};
use crate::patterns::Signature;
use crate::session::{SessionSnapshot, SessionState};
use console::style;
use icons::{CHECK, CROSS, REASONER, SECONDARY, STATS, STOP, TARGET, WARNING};
use std::fmt::Write;

pub fn render_diagnosis(diagnosis: &Diagnosis) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{}{} {} ({:.0}%, {} priority)",
        TARGET,
        style(diagnosis.primary_target).bold(),
        style(diagnosis.primary_category).yellow(),
        diagnosis.primary_confidence * 100.0,
        diagnosis.priority()
    );
    let actions: Vec<&str> = diagnosis.primary_actions.iter().map(|a| a.as_str()).collect();
    let _ = writeln!(out, "   actions: {}", actions.join(", "));

    if let Some(secondary) = diagnosis.secondary_target {
        let actions: Vec<&str> = diagnosis
            .secondary_actions
            .iter()
            .flatten()
            .map(|a| a.as_str())
            .collect();
        let _ = writeln!(
            out,
            "{}{} ({})",
            SECONDARY,
            style(secondary).bold(),
            actions.join(", ")
        );
    }

    let _ = writeln!(out, "   {}", style(&diagnosis.root_cause_summary).dim());

    match &diagnosis.reasoner {
        ReasonerUsage::NotTriggered => {}
        ReasonerUsage::Disabled { trigger } => {
            let _ = writeln!(out, "{}reasoner disabled ({})", REASONER, trigger);
        }
        ReasonerUsage::Used {
            trigger,
            confidence,
        } => {
            let _ = writeln!(
                out,
                "{}reasoner consulted ({}), answered at {:.0}%",
                REASONER,
                trigger,
                confidence * 100.0
            );
        }
        ReasonerUsage::FellBack { trigger, failure } => {
            let _ = writeln!(
                out,
                "{}reasoner failed ({}): {}; used local evidence",
                WARNING, trigger, failure
            );
        }
    }

    if diagnosis.escalate {
        let _ = writeln!(
            out,
            "{}{}",
            WARNING,
            style("escalated for human review").red()
        );
    }
    out
}

pub fn render_session(session: &SessionSnapshot) -> String {
    let mut out = String::new();
    let icon = match &session.state {
        SessionState::Succeeded => CHECK,
        SessionState::Aborted { .. } => STOP,
        _ => CROSS,
    };
    let _ = writeln!(
        out,
        "{}{} [{}] {}",
        icon,
        style(&session.target).bold(),
        &session.session_id.to_string()[..8],
        session.state
    );
    let _ = writeln!(
        out,
        "   started {}, {} of {} iterations",
        session.created_at.format("%Y-%m-%d %H:%M:%S"),
        session.iterations(),
        session.settings.max_iterations
    );
    for record in &session.history {
        let _ = writeln!(
            out,
            "   #{} {} -> {} ({:.0}%) fix: {:?} validation: {:?}",
            record.iteration_index,
            record.diagnosis.primary_category,
            record.diagnosis.primary_target,
            record.diagnosis.primary_confidence * 100.0,
            record.fix_outcome,
            record.validation_outcome
        );
    }
    out
}

pub fn render_stats(stats: &SessionStats) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}{} archived sessions", STATS, stats.sessions);
    if stats.sessions == 0 {
        return out;
    }
    let _ = writeln!(
        out,
        "   success rate {:.0}%, mean {:.1} iterations",
        stats.success_rate() * 100.0,
        stats.mean_iterations()
    );
    let _ = writeln!(out, "   outcomes:");
    for (outcome, count) in &stats.outcomes {
        let _ = writeln!(out, "     {:<20} {}", outcome.as_str(), count);
    }
    let _ = writeln!(out, "   primary targets:");
    for (target, count) in &stats.targets {
        let _ = writeln!(out, "     {:<20} {}", target.as_str(), count);
    }
    let _ = writeln!(out, "   categories:");
    for (category, count) in &stats.categories {
        let _ = writeln!(out, "     {:<20} {}", category.as_str(), count);
    }
    let _ = writeln!(
        out,
        "   reasoner consulted {} times, {} fallbacks",
        stats.reasoner_calls, stats.reasoner_fallbacks
    );
    out
}

pub fn render_signatures(signatures: &[Signature]) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<4} {:<22} {:<18} {:<14} {:<6} Description",
        "#", "Id", "Category", "Target", "Conf"
    );
    for (index, signature) in signatures.iter().enumerate() {
        let _ = writeln!(
            out,
            "{:<4} {:<22} {:<18} {:<14} {:<6.2} {}",
            index,
            signature.id,
            signature.category.as_str(),
            signature.target.as_str(),
            signature.confidence,
            signature.description
        );
    }
    out
}
