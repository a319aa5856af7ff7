//! Pattern Matcher: classify raw failure output against known signatures.
//!
//! | Submodule    | What it owns                                  |
//! |--------------|-----------------------------------------------|
//! | `signatures` | `Signature` type and the built-in table       |
//!
//! Matching is pure. Every firing signature yields exactly one candidate, so
//! a trace with a syntax error and a downstream import error produces both.

pub mod signatures;

pub use signatures::{Signature, default_signatures};

use crate::diagnosis::{CandidateDiagnosis, EvidenceSource, FailureReport};

/// Longest evidence excerpt kept on a candidate.
const MAX_EVIDENCE_CHARS: usize = 200;

/// Stateless classifier over `stderr_text` and `stdout_text`.
#[derive(Debug, Clone)]
pub struct PatternMatcher {
    signatures: Vec<Signature>,
}

impl Default for PatternMatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl PatternMatcher {
    /// Matcher over the built-in signature table.
    pub fn new() -> Self {
        Self {
            signatures: default_signatures().to_vec(),
        }
    }

    /// Matcher over a custom table. Registration order is the slice order.
    pub fn with_signatures(signatures: Vec<Signature>) -> Self {
        Self { signatures }
    }

    pub fn signatures(&self) -> &[Signature] {
        &self.signatures
    }

    /// Return one candidate per firing signature, sorted by descending
    /// confidence. Equal confidences keep registration order.
    pub fn match_failure(&self, report: &FailureReport) -> Vec<CandidateDiagnosis> {
        let mut candidates: Vec<CandidateDiagnosis> = self
            .signatures
            .iter()
            .enumerate()
            .filter_map(|(index, sig)| {
                let evidence = [&report.stderr_text, &report.stdout_text]
                    .into_iter()
                    .find_map(|text| sig.find(text).map(|(start, _)| line_at(text, start)))?;
                Some(
                    CandidateDiagnosis::new(
                        sig.category,
                        sig.confidence,
                        sig.target,
                        EvidenceSource::Pattern,
                    )
                    .with_origin(&sig.id, index)
                    .with_evidence(&evidence),
                )
            })
            .collect();

        // Stable sort keeps registration order among equals.
        candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        candidates
    }
}

/// The trimmed line of `text` containing byte offset `pos`.
fn line_at(text: &str, pos: usize) -> String {
    let start = text[..pos].rfind('\n').map(|i| i + 1).unwrap_or(0);
    let end = text[pos..].find('\n').map(|i| pos + i).unwrap_or(text.len());
    let line = text[start..end].trim();
    if line.chars().count() > MAX_EVIDENCE_CHARS {
        let truncated: String = line.chars().take(MAX_EVIDENCE_CHARS).collect();
        format!("{}...", truncated)
    } else {
        line.to_string()
    }
}
