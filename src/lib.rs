pub mod analysis;
pub mod audit;
pub mod combiner;
pub mod config;
pub mod diagnosis;
pub mod errors;
pub mod orchestrator;
pub mod patterns;
pub mod quality;
pub mod reasoner;
pub mod session;
pub mod telemetry;
pub mod ui;

pub use analysis::AnalysisEngine;
pub use diagnosis::{Diagnosis, FailureReport, FixPlan, FixerRole};
pub use orchestrator::{FixExecutor, RepairOrchestrator, Validator};
pub use session::{RepairSession, SessionSettings, SessionSnapshot, SessionState};
