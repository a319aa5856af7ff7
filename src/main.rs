use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use triage::telemetry;

mod cmd;

#[derive(Parser)]
#[command(name = "triage")]
#[command(version, about = "Failure triage and repair routing for generated projects")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Diagnose one or more failure reports and print the fix plan
    Diagnose {
        /// FailureReport JSON files
        #[arg(required = true)]
        reports: Vec<PathBuf>,

        /// Never consult the semantic reasoner
        #[arg(long)]
        no_reasoner: bool,

        /// Print only the FixPlan JSON
        #[arg(long)]
        plan_only: bool,

        /// Print the full diagnosis as JSON
        #[arg(long, conflicts_with = "plan_only")]
        json: bool,

        /// Override min_confidence_threshold (0.0-1.0)
        #[arg(long, value_parser = parse_threshold)]
        threshold: Option<f64>,
    },
    /// List the built-in failure signatures
    Signatures,
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
    /// Inspect archived repair sessions
    Audit {
        #[command(subcommand)]
        command: AuditCommands,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Create a default .triage/triage.toml
    Init,
}

#[derive(Subcommand, Clone)]
pub enum AuditCommands {
    /// List archived sessions, most recent first
    List,
    /// Show one archived session
    Show {
        /// File name under the runs directory, or a path
        file: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Aggregate statistics over every archived session
    Stats {
        #[arg(long)]
        json: bool,
    },
}

fn parse_threshold(raw: &str) -> Result<f64, String> {
    let value: f64 = raw.parse().map_err(|e| format!("{}", e))?;
    if !(0.0..=1.0).contains(&value) {
        return Err(format!("{} is not within 0.0-1.0", raw));
    }
    Ok(value)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    telemetry::init_tracing(cli.log_json, telemetry::level_for(cli.verbose));

    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    match &cli.command {
        Commands::Diagnose {
            reports,
            no_reasoner,
            plan_only,
            json,
            threshold,
        } => {
            let output = if *plan_only {
                cmd::DiagnoseOutput::PlanOnly
            } else if *json {
                cmd::DiagnoseOutput::Json
            } else {
                cmd::DiagnoseOutput::Human
            };
            cmd::cmd_diagnose(&project_dir, reports, *no_reasoner, *threshold, output).await?;
        }
        Commands::Signatures => cmd::cmd_signatures(),
        Commands::Config { command } => cmd::cmd_config(&project_dir, command.clone())?,
        Commands::Audit { command } => cmd::cmd_audit(&project_dir, command.clone())?,
    }

    Ok(())
}
