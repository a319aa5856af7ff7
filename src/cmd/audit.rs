//! Session archive commands: `triage audit`.

use anyhow::Result;
use std::path::Path;

use super::super::AuditCommands;

pub fn cmd_audit(project_dir: &Path, command: AuditCommands) -> Result<()> {
    use triage::audit::AuditLogger;
    use triage::config::EngineConfig;
    use triage::ui::icons::FOLDER;
    use triage::ui::{render_session, render_stats};

    let config = EngineConfig::load(project_dir)?;
    let logger = AuditLogger::new(&config.audit_dir_for(project_dir));

    match command {
        AuditCommands::List => {
            let runs = logger.list_runs()?;
            if runs.is_empty() {
                println!("No archived sessions in {}", logger.runs_dir().display());
                return Ok(());
            }

            println!();
            println!("{}{}", FOLDER, logger.runs_dir().display());
            println!(
                "{:<36} {:<20} {:<12} Iterations",
                "File", "Target", "Outcome"
            );
            for path in runs {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default();
                match logger.load_run(&path) {
                    Ok(session) => println!(
                        "{:<36} {:<20} {:<12} {}",
                        name,
                        session.target,
                        session.state.name(),
                        session.iterations()
                    ),
                    Err(e) => println!("{:<36} (unreadable: {})", name, e),
                }
            }
            println!();
        }
        AuditCommands::Show { file, json } => {
            // Bare file names resolve against the runs directory.
            let path = if file.exists() {
                file
            } else {
                logger.runs_dir().join(&file)
            };
            let session = logger.load_run(&path)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&session)?);
            } else {
                println!();
                print!("{}", render_session(&session));
                println!();
            }
        }
        AuditCommands::Stats { json } => {
            let stats = logger.stats()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!();
                print!("{}", render_stats(&stats));
                println!();
            }
        }
    }

    Ok(())
}
