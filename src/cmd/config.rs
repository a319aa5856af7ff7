//! Configuration view and validation commands: `triage config`.

use anyhow::Result;

use super::super::ConfigCommands;

pub fn cmd_config(project_dir: &std::path::Path, command: Option<ConfigCommands>) -> Result<()> {
    use triage::config::{CONFIG_DIR, CONFIG_FILE, EngineConfig, TriageToml};

    let config_dir = project_dir.join(CONFIG_DIR);
    let config_path = config_dir.join(CONFIG_FILE);

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Triage Configuration");
            println!("====================");
            println!();

            if config_path.exists() {
                println!("Config file: {}", config_path.display());
            } else {
                println!("No triage.toml found at {}", config_path.display());
                println!("Using defaults. Run 'triage config init' to create one.");
            }
            println!();

            // Effective values include TRIAGE_* environment overrides.
            let config = EngineConfig::load(project_dir)?;
            println!("Effective values (with env overrides):");
            print!("{}", toml::to_string_pretty(&config.to_toml())?);
            println!();
            println!(
                "Audit archive: {}",
                config.audit_dir_for(project_dir).display()
            );
            println!();
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            let config = EngineConfig::load(project_dir)?;
            let warnings = config.validate();

            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!("triage.toml already exists at {}", config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }

            if !config_dir.exists() {
                std::fs::create_dir_all(&config_dir)?;
            }

            TriageToml::default().save(&config_path)?;

            println!("Created triage.toml at {}", config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [engine] max_iterations, enable_reasoner, min_confidence_threshold");
            println!("  - [reasoner] cmd, args, timeout_secs");
            println!();
        }
    }

    Ok(())
}
