//! Semantic Reasoner Gateway.
//!
//! The reasoner is consulted only when local evidence is inconclusive. It
//! sits behind the [`SemanticReasoner`] capability trait, so the engine does
//! not care whether the backend is an LLM CLI, a remote service or a stub.
//!
//! The gateway owns everything the backend must not be trusted with:
//!
//! - **Timeout**: the call runs under `tokio::time::timeout` and resolves to
//!   [`GatewayFailure::Timeout`] when it elapses
//! - **Parsing**: JSON is extracted from fenced or raw text, then checked for
//!   the required fields (`category`, `suggested_target`, `confidence`,
//!   `root_cause_summary`)
//! - **Routing safety**: `suggested_target` must be a known fixer role
//!
//! ## Response format
//!
//! ```json
//! {
//!   "category": "connection_error",
//!   "suggested_target": "DatabaseSWEA",
//!   "secondary_target": "BackendSWEA",
//!   "confidence": 0.8,
//!   "root_cause_summary": "DATABASE_URL points at a host that is not running",
//!   "actions": ["verify_database_config"]
//! }
//! ```

pub mod command;

pub use command::CommandReasoner;

use crate::diagnosis::{
    ActionName, CandidateDiagnosis, Category, EvidenceSource, FailureReport, FixerRole,
};
use crate::errors::GatewayFailure;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Longest slice of stderr/stdout forwarded to the reasoner.
const MAX_OUTPUT_CHARS: usize = 4000;

/// What the reasoner is told about a failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasonerRequest {
    pub stderr_excerpt: String,
    pub stdout_excerpt: String,
    pub exit_code: i32,
    pub tests_run: u32,
    pub tests_failed: u32,
    pub artifacts: Vec<String>,
    /// Local candidates gathered so far, best first.
    pub candidates: Vec<CandidateDiagnosis>,
    pub context_summary: String,
}

impl ReasonerRequest {
    pub fn new(
        report: &FailureReport,
        candidates: &[CandidateDiagnosis],
        context_summary: &str,
    ) -> Self {
        Self {
            stderr_excerpt: tail_chars(&report.stderr_text, MAX_OUTPUT_CHARS),
            stdout_excerpt: tail_chars(&report.stdout_text, MAX_OUTPUT_CHARS),
            exit_code: report.exit_code,
            tests_run: report.tests_run,
            tests_failed: report.tests_failed,
            artifacts: report
                .artifact_refs
                .iter()
                .map(|a| a.as_str().to_string())
                .collect(),
            candidates: candidates.to_vec(),
            context_summary: context_summary.to_string(),
        }
    }
}

/// Capability interface over a reasoning backend.
///
/// Implementations return raw response text; the gateway parses it.
#[async_trait]
pub trait SemanticReasoner: Send + Sync {
    async fn reason(&self, request: &ReasonerRequest) -> anyhow::Result<String>;
}

/// A parsed, validated reasoner answer.
#[derive(Debug, Clone, PartialEq)]
pub struct ReasonerVerdict {
    pub candidate: CandidateDiagnosis,
    pub secondary_target: Option<FixerRole>,
    pub root_cause_summary: String,
}

/// Timeout-bounded wrapper around a [`SemanticReasoner`].
#[derive(Clone)]
pub struct ReasonerGateway {
    reasoner: Arc<dyn SemanticReasoner>,
    timeout: Duration,
}

impl ReasonerGateway {
    pub fn new(reasoner: Arc<dyn SemanticReasoner>, timeout: Duration) -> Self {
        Self { reasoner, timeout }
    }

    /// Same reasoner, different deadline. Sessions apply their own timeout.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        Self {
            reasoner: Arc::clone(&self.reasoner),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Ask the reasoner for one diagnosis. Never panics and never hangs past
    /// the configured timeout.
    pub async fn reason(
        &self,
        report: &FailureReport,
        candidates: &[CandidateDiagnosis],
        context_summary: &str,
    ) -> Result<ReasonerVerdict, GatewayFailure> {
        let request = ReasonerRequest::new(report, candidates, context_summary);
        let start = Instant::now();

        let raw = match tokio::time::timeout(self.timeout, self.reasoner.reason(&request)).await {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => {
                warn!(error = %e, "reasoner transport failed");
                return Err(GatewayFailure::Transport(e.to_string()));
            }
            Err(_) => {
                let after_ms = self.timeout.as_millis() as u64;
                warn!(after_ms, "reasoner timed out");
                return Err(GatewayFailure::Timeout { after_ms });
            }
        };

        debug!(
            duration_ms = start.elapsed().as_millis() as u64,
            response_len = raw.len(),
            "reasoner responded"
        );
        parse_reasoner_response(&raw)
    }
}

impl std::fmt::Debug for ReasonerGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReasonerGateway")
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Build the prompt sent to an LLM-backed reasoner.
pub fn build_reasoner_prompt(request: &ReasonerRequest) -> String {
    let candidates_json =
        serde_json::to_string_pretty(&request.candidates).unwrap_or_else(|_| "[]".to_string());
    let categories: Vec<&str> = Category::ALL.iter().map(|c| c.as_str()).collect();
    let targets: Vec<&str> = FixerRole::ALL.iter().map(|t| t.as_str()).collect();
    let artifacts = if request.artifacts.is_empty() {
        "(none)".to_string()
    } else {
        request.artifacts.join(", ")
    };

    format!(
        r#"# Failure Triage

A generated application failed its automated tests. Local heuristics could not
decide the root cause with confidence. Decide which fixer should act.

## Context
{context}

## Run
- Exit code: {exit_code}
- Tests: {tests_failed} failed of {tests_run} run
- Artifacts: {artifacts}

## stderr (tail)
```
{stderr}
```

## stdout (tail)
```
{stdout}
```

## Local candidates
```json
{candidates_json}
```

## Output

Respond with ONLY a JSON object in this exact format:

```json
{{
  "category": "one of: {categories}",
  "suggested_target": "one of: {targets}",
  "secondary_target": "optional, one of the targets above",
  "confidence": 0.0-1.0,
  "root_cause_summary": "One or two sentences naming the root cause",
  "actions": ["optional repair action names"]
}}
```
"#,
        context = request.context_summary,
        exit_code = request.exit_code,
        tests_failed = request.tests_failed,
        tests_run = request.tests_run,
        artifacts = artifacts,
        stderr = request.stderr_excerpt,
        stdout = request.stdout_excerpt,
        candidates_json = candidates_json,
        categories = categories.join(", "),
        targets = targets.join(", "),
    )
}

/// Parse and validate a raw reasoner response.
pub fn parse_reasoner_response(response: &str) -> Result<ReasonerVerdict, GatewayFailure> {
    let json_str = extract_json(response)
        .ok_or_else(|| GatewayFailure::Malformed("no JSON object in response".to_string()))?;
    let value: serde_json::Value =
        serde_json::from_str(&json_str).map_err(|e| GatewayFailure::Malformed(e.to_string()))?;

    let required_str = |field: &str| -> Result<String, GatewayFailure> {
        value
            .get(field)
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .ok_or_else(|| GatewayFailure::MissingField(field.to_string()))
    };

    let category = Category::from_label(&required_str("category")?);
    let target: FixerRole = required_str("suggested_target")?
        .parse()
        .map_err(GatewayFailure::Malformed)?;
    let confidence = value
        .get("confidence")
        .and_then(|v| v.as_f64())
        .ok_or_else(|| GatewayFailure::MissingField("confidence".to_string()))?;
    let root_cause_summary = required_str("root_cause_summary")?;

    // Optional fields degrade to absent rather than failing the response.
    let secondary_target = value
        .get("secondary_target")
        .and_then(|v| v.as_str())
        .and_then(|s| s.parse::<FixerRole>().ok())
        .filter(|s| *s != target);
    let actions: Vec<ActionName> = value
        .get("actions")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|a| a.as_str())
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .map(ActionName::new)
                .collect()
        })
        .unwrap_or_default();

    let candidate = CandidateDiagnosis::new(category, confidence, target, EvidenceSource::Reasoner)
        .with_origin("reasoner", 0)
        .with_evidence(&root_cause_summary)
        .with_actions(actions);

    Ok(ReasonerVerdict {
        candidate,
        secondary_target,
        root_cause_summary,
    })
}

/// Extract JSON from a response that may contain markdown or other text.
pub(crate) fn extract_json(response: &str) -> Option<String> {
    if let Some(start) = response.find("```json") {
        let after_marker = &response[start + 7..];
        if let Some(end) = after_marker.find("```") {
            return Some(after_marker[..end].trim().to_string());
        }
    }

    if let Some(start) = response.find("```") {
        let after_marker = &response[start + 3..];
        if let Some(end) = after_marker.find("```") {
            if let Some(json_start) = after_marker[..end].find('{') {
                return Some(after_marker[json_start..end].trim().to_string());
            }
        }
    }

    // Raw object: match braces from the first '{', skipping string contents.
    let start = response.find('{')?;
    let mut depth = 0;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in response[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(response[start..start + i + 1].to_string());
                }
            }
            _ => {}
        }
    }
    None
}

fn tail_chars(text: &str, max: usize) -> String {
    let count = text.chars().count();
    if count <= max {
        text.to_string()
    } else {
        text.chars().skip(count - max).collect()
    }
}
