//! Quality Analyzer: inspect generated artifacts for structural defects.
//!
//! Works without any failure text, so a report whose output is silent can
//! still surface a diagnosis (an API module with no routes, a schema with no
//! tables). An artifact that cannot be read becomes a low-confidence
//! `artifact_unreadable` candidate instead of failing the pass.

pub mod checks;
pub mod source;

pub use checks::{ArtifactKind, DEFAULT_CHECKS, QualityCheck};
pub use source::{ArtifactSource, FsArtifactSource, MemoryArtifactSource};

use crate::diagnosis::{ArtifactRef, CandidateDiagnosis, Category, EvidenceSource};
use checks::Artifact;
use std::sync::Arc;
use tracing::debug;

/// Confidence of an `artifact_unreadable` candidate.
pub const UNREADABLE_CONFIDENCE: f64 = 0.2;

#[derive(Clone)]
pub struct QualityAnalyzer {
    source: Arc<dyn ArtifactSource>,
    checks: Vec<QualityCheck>,
}

impl QualityAnalyzer {
    pub fn new(source: Arc<dyn ArtifactSource>) -> Self {
        Self {
            source,
            checks: DEFAULT_CHECKS.to_vec(),
        }
    }

    pub fn with_checks(mut self, checks: Vec<QualityCheck>) -> Self {
        self.checks = checks;
        self
    }

    pub fn checks(&self) -> &[QualityCheck] {
        &self.checks
    }

    /// Run every applicable check over every artifact.
    ///
    /// Candidates are sorted by descending confidence; equal confidences keep
    /// artifact order, then check registration order.
    pub fn inspect(&self, artifacts: &[ArtifactRef]) -> Vec<CandidateDiagnosis> {
        let mut candidates = Vec::new();

        for handle in artifacts {
            let kind = ArtifactKind::from_path(handle.as_str());
            let content = match self.source.read(handle) {
                Ok(content) => content,
                Err(e) => {
                    debug!(artifact = %handle, error = %e, "artifact unreadable");
                    candidates.push(
                        CandidateDiagnosis::new(
                            Category::ArtifactUnreadable,
                            UNREADABLE_CONFIDENCE,
                            kind.owner(),
                            EvidenceSource::Quality,
                        )
                        .with_origin("artifact_unreadable", self.checks.len())
                        .with_evidence(&format!("{}: {}", handle, e)),
                    );
                    continue;
                }
            };

            let artifact = Artifact {
                path: handle.as_str(),
                kind,
                content: &content,
            };
            for (index, check) in self.checks.iter().enumerate() {
                if check.applies(kind) && (check.defect)(&artifact) {
                    candidates.push(
                        CandidateDiagnosis::new(
                            check.category,
                            check.confidence,
                            check.target,
                            EvidenceSource::Quality,
                        )
                        .with_origin(check.id, index)
                        .with_evidence(handle.as_str()),
                    );
                }
            }
        }

        candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        candidates
    }
}

impl std::fmt::Debug for QualityAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QualityAnalyzer")
            .field("checks", &self.checks.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnosis::FixerRole;

    fn analyzer(source: MemoryArtifactSource) -> QualityAnalyzer {
        QualityAnalyzer::new(Arc::new(source))
    }

    fn refs(handles: &[&str]) -> Vec<ArtifactRef> {
        handles.iter().map(|h| ArtifactRef::new(*h)).collect()
    }

    #[test]
    fn test_clean_artifacts_yield_nothing() {
        let source = MemoryArtifactSource::new()
            .with_file(
                "app/main.py",
                "from fastapi import FastAPI\napp = FastAPI()\n\n@app.get(\"/health\")\ndef health():\n    return {\"ok\": True}\n",
            )
            .with_file(
                "app/models.py",
                "class User(Base):\n    __tablename__ = \"users\"\n",
            )
            .with_file("tests/test_health.py", "def test_health(client):\n    assert client.get('/health').status_code == 200\n");
        let candidates = analyzer(source).inspect(&refs(&[
            "app/main.py",
            "app/models.py",
            "tests/test_health.py",
        ]));
        assert!(candidates.is_empty(), "unexpected: {:?}", candidates);
    }

    #[test]
    fn test_api_without_routes() {
        let source = MemoryArtifactSource::new()
            .with_file("app/main.py", "from fastapi import FastAPI\napp = FastAPI()\n");
        let candidates = analyzer(source).inspect(&refs(&["app/main.py"]));
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].category, Category::EndpointMissing);
        assert_eq!(candidates[0].suggested_target, FixerRole::Backend);
        assert_eq!(candidates[0].evidence_source, EvidenceSource::Quality);
        assert_eq!(candidates[0].evidence.as_deref(), Some("app/main.py"));
    }

    #[test]
    fn test_multiple_defects_sorted_by_confidence() {
        let source = MemoryArtifactSource::new()
            .with_file("src/components/List.tsx", "const List = () => { return null;\n")
            .with_file("db/schema.sql", "-- nothing here yet\n");
        let candidates = analyzer(source).inspect(&refs(&["src/components/List.tsx", "db/schema.sql"]));

        let origins: Vec<&str> = candidates.iter().map(|c| c.origin.as_str()).collect();
        assert_eq!(
            origins,
            vec!["unbalanced_delimiters_ui", "schema_without_tables", "ui_without_export"]
        );
        assert_eq!(candidates[0].suggested_target, FixerRole::Frontend);
        assert_eq!(candidates[1].suggested_target, FixerRole::Database);
    }

    #[test]
    fn test_prose_and_jsx_text_are_not_syntax_errors() {
        let source = MemoryArtifactSource::new()
            .with_file("README.md", "# Todo\n\n1) install deps\n2) run the server\n")
            .with_file(
                "src/components/TodoList.tsx",
                "export function TodoList() {\n  return <p>Don't panic, nothing here</p>}\n",
            );
        let candidates =
            analyzer(source).inspect(&refs(&["README.md", "src/components/TodoList.tsx"]));
        assert!(candidates.is_empty(), "unexpected: {:?}", candidates);
    }

    #[test]
    fn test_unreadable_artifact_is_low_confidence_candidate() {
        let candidates = analyzer(MemoryArtifactSource::new()).inspect(&refs(&["app/models.py"]));
        assert_eq!(candidates.len(), 1);
        let c = &candidates[0];
        assert_eq!(c.category, Category::ArtifactUnreadable);
        assert_eq!(c.confidence, UNREADABLE_CONFIDENCE);
        assert_eq!(c.suggested_target, FixerRole::Database);
        assert!(c.evidence.as_deref().unwrap().starts_with("app/models.py"));
    }

    #[test]
    fn test_unreadable_does_not_stop_other_artifacts() {
        let source = MemoryArtifactSource::new()
            .with_file("app/main.py", "app = FastAPI()\n");
        let candidates = analyzer(source).inspect(&refs(&["missing.py", "app/main.py"]));
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].category, Category::EndpointMissing);
        assert_eq!(candidates[1].category, Category::ArtifactUnreadable);
    }

    #[test]
    fn test_no_artifacts_yields_nothing() {
        assert!(analyzer(MemoryArtifactSource::new()).inspect(&[]).is_empty());
    }

    #[test]
    fn test_custom_checks_replace_defaults() {
        let qa = analyzer(MemoryArtifactSource::new().with_file("app/main.py", ""))
            .with_checks(Vec::new());
        assert!(qa.checks().is_empty());
        assert!(qa.inspect(&refs(&["app/main.py"])).is_empty());
    }
}
