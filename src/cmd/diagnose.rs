//! One-shot analysis of failure reports: `triage diagnose` and `triage signatures`.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnoseOutput {
    Human,
    PlanOnly,
    Json,
}

pub async fn cmd_diagnose(
    project_dir: &Path,
    report_paths: &[PathBuf],
    no_reasoner: bool,
    threshold: Option<f64>,
    output: DiagnoseOutput,
) -> Result<()> {
    use triage::config::EngineConfig;
    use triage::diagnosis::FailureReport;
    use triage::patterns::PatternMatcher;
    use triage::quality::{FsArtifactSource, QualityAnalyzer};
    use triage::reasoner::{CommandReasoner, ReasonerGateway};
    use triage::ui::render_diagnosis;
    use triage::{AnalysisEngine, FixPlan};

    let mut config = EngineConfig::load(project_dir)?;
    if no_reasoner {
        config = config.with_reasoner_enabled(false);
    }
    if let Some(threshold) = threshold {
        config = config.with_min_confidence_threshold(threshold);
    }
    for warning in config.validate() {
        tracing::warn!("{}", warning);
    }

    let mut reports = Vec::with_capacity(report_paths.len());
    for path in report_paths {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read failure report: {}", path.display()))?;
        let report: FailureReport = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse failure report: {}", path.display()))?;
        reports.push(report);
    }

    let analyzer = QualityAnalyzer::new(Arc::new(FsArtifactSource::new(project_dir)));
    let mut engine = AnalysisEngine::new(PatternMatcher::new(), analyzer);
    if config.enable_reasoner {
        let reasoner = CommandReasoner::new(&config.reasoner_cmd).with_args(&config.reasoner_args);
        engine = engine.with_gateway(ReasonerGateway::new(
            Arc::new(reasoner),
            config.reasoner_timeout(),
        ));
    }

    let settings = config.session_settings();
    let diagnoses = engine
        .analyze_all(&reports, &settings, "One-shot diagnosis outside a repair session.")
        .await;

    match output {
        DiagnoseOutput::PlanOnly => {
            let plans: Vec<FixPlan> = diagnoses.iter().map(|d| d.to_fix_plan()).collect();
            print_json(&plans)?;
        }
        DiagnoseOutput::Json => print_json(&diagnoses)?,
        DiagnoseOutput::Human => {
            for (path, diagnosis) in report_paths.iter().zip(&diagnoses) {
                println!();
                println!("{}", path.display());
                print!("{}", render_diagnosis(diagnosis));
                println!();
                println!("{}", diagnosis.to_fix_plan().to_json()?);
            }
        }
    }

    Ok(())
}

/// One value prints as an object, several as an array.
fn print_json<T: serde::Serialize>(items: &[T]) -> Result<()> {
    let json = match items {
        [single] => serde_json::to_string_pretty(single)?,
        many => serde_json::to_string_pretty(many)?,
    };
    println!("{}", json);
    Ok(())
}

pub fn cmd_signatures() {
    use triage::patterns::default_signatures;
    use triage::ui::render_signatures;

    println!();
    print!("{}", render_signatures(default_signatures()));
    println!();
}
