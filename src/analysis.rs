//! One analysis pass: local evidence in parallel, the reasoner when that
//! evidence is inconclusive, then the combiner.
//!
//! Pattern matching and quality inspection are synchronous and CPU/disk
//! bound, so each runs on the blocking pool and the two are joined. A
//! panicked or cancelled local task contributes no candidates instead of
//! failing the pass.

use crate::combiner::{combine, evaluate_trigger};
use crate::diagnosis::{CandidateDiagnosis, Diagnosis, FailureReport, ReasonerUsage};
use crate::patterns::PatternMatcher;
use crate::quality::QualityAnalyzer;
use crate::reasoner::ReasonerGateway;
use crate::session::SessionSettings;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone)]
pub struct AnalysisEngine {
    matcher: Arc<PatternMatcher>,
    analyzer: Arc<QualityAnalyzer>,
    gateway: Option<ReasonerGateway>,
}

impl AnalysisEngine {
    pub fn new(matcher: PatternMatcher, analyzer: QualityAnalyzer) -> Self {
        Self {
            matcher: Arc::new(matcher),
            analyzer: Arc::new(analyzer),
            gateway: None,
        }
    }

    pub fn with_gateway(mut self, gateway: ReasonerGateway) -> Self {
        self.gateway = Some(gateway);
        self
    }

    pub fn has_gateway(&self) -> bool {
        self.gateway.is_some()
    }

    pub fn matcher(&self) -> &PatternMatcher {
        &self.matcher
    }

    /// Gather local evidence: pattern candidates and quality candidates.
    pub async fn local_evidence(
        &self,
        report: &FailureReport,
    ) -> (Vec<CandidateDiagnosis>, Vec<CandidateDiagnosis>) {
        let matcher = Arc::clone(&self.matcher);
        let pattern_report = report.clone();
        let pattern_task =
            tokio::task::spawn_blocking(move || matcher.match_failure(&pattern_report));

        let analyzer = Arc::clone(&self.analyzer);
        let artifacts = report.artifact_refs.clone();
        let quality_task = tokio::task::spawn_blocking(move || analyzer.inspect(&artifacts));

        let (pattern, quality) = tokio::join!(pattern_task, quality_task);
        let pattern = pattern.unwrap_or_else(|e| {
            warn!(error = %e, "pattern matcher task failed");
            Vec::new()
        });
        let quality = quality.unwrap_or_else(|e| {
            warn!(error = %e, "quality analyzer task failed");
            Vec::new()
        });
        (pattern, quality)
    }

    /// Produce one diagnosis for `report`.
    ///
    /// Never fails: reasoner problems degrade to the best local candidate and
    /// are recorded in [`Diagnosis::reasoner`].
    #[instrument(skip_all, fields(exit_code = report.exit_code))]
    pub async fn analyze(
        &self,
        report: &FailureReport,
        settings: &SessionSettings,
        context_summary: &str,
    ) -> Diagnosis {
        let (pattern, quality) = self.local_evidence(report).await;
        debug!(
            pattern = pattern.len(),
            quality = quality.len(),
            "local evidence gathered"
        );

        let local: Vec<CandidateDiagnosis> =
            pattern.iter().chain(quality.iter()).cloned().collect();
        let Some(trigger) = evaluate_trigger(&local, settings.min_confidence_threshold) else {
            return combine(&pattern, &quality, None, ReasonerUsage::NotTriggered);
        };

        let gateway = match &self.gateway {
            Some(gateway) if settings.enable_reasoner => gateway,
            _ => {
                debug!(%trigger, "reasoner trigger ignored: reasoner disabled");
                return combine(&pattern, &quality, None, ReasonerUsage::Disabled { trigger });
            }
        };

        info!(%trigger, "consulting semantic reasoner");
        let gateway = gateway.with_timeout(settings.reasoner_timeout());
        match gateway.reason(report, &local, context_summary).await {
            Ok(verdict) => {
                let usage = ReasonerUsage::Used {
                    trigger,
                    confidence: verdict.candidate.confidence,
                };
                combine(&pattern, &quality, Some(&verdict), usage)
            }
            Err(failure) => {
                warn!(error = %failure, "reasoner failed, falling back to local evidence");
                let usage = ReasonerUsage::FellBack {
                    trigger,
                    failure: failure.to_string(),
                };
                combine(&pattern, &quality, None, usage)
            }
        }
    }

    /// Analyze independent reports in parallel. Results keep input order.
    pub async fn analyze_all(
        &self,
        reports: &[FailureReport],
        settings: &SessionSettings,
        context_summary: &str,
    ) -> Vec<Diagnosis> {
        use futures::future::join_all;

        let futures: Vec<_> = reports
            .iter()
            .map(|report| self.analyze(report, settings, context_summary))
            .collect();
        join_all(futures).await
    }
}
