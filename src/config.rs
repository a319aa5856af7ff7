//! Engine configuration.
//!
//! Settings are layered, later sources overriding earlier ones:
//!
//! 1. `.triage/triage.toml` in the project directory
//! 2. `TRIAGE_*` environment variables
//! 3. CLI flags (applied by the binary through the `with_*` builders)
//!
//! # Configuration File Format
//!
//! ```toml
//! [engine]
//! max_iterations = 3
//! enable_reasoner = true
//! min_confidence_threshold = 0.6
//! audit_dir = ".triage/audit"
//!
//! [reasoner]
//! cmd = "claude"
//! args = ["--model", "sonnet"]
//! timeout_secs = 60
//! ```
//!
//! A [`SessionSettings`] snapshot is taken when a repair session starts, so
//! changing configuration never affects a session that is already running.

use crate::errors::ConfigError;
use crate::session::SessionSettings;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

pub const CONFIG_DIR: &str = ".triage";
pub const CONFIG_FILE: &str = "triage.toml";

pub const ENV_MAX_ITERATIONS: &str = "TRIAGE_MAX_ITERATIONS";
pub const ENV_ENABLE_REASONER: &str = "TRIAGE_ENABLE_REASONER";
pub const ENV_MIN_CONFIDENCE_THRESHOLD: &str = "TRIAGE_MIN_CONFIDENCE_THRESHOLD";
pub const ENV_REASONER_TIMEOUT_SECS: &str = "TRIAGE_REASONER_TIMEOUT_SECS";
pub const ENV_REASONER_CMD: &str = "TRIAGE_REASONER_CMD";
pub const ENV_AUDIT_DIR: &str = "TRIAGE_AUDIT_DIR";

fn default_max_iterations() -> u32 {
    3
}

fn default_enable_reasoner() -> bool {
    true
}

fn default_min_confidence_threshold() -> f64 {
    0.6
}

fn default_reasoner_cmd() -> String {
    "claude".to_string()
}

fn default_reasoner_timeout_secs() -> u64 {
    60
}

/// `[engine]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSection {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    #[serde(default = "default_enable_reasoner")]
    pub enable_reasoner: bool,
    #[serde(default = "default_min_confidence_threshold")]
    pub min_confidence_threshold: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit_dir: Option<PathBuf>,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            enable_reasoner: default_enable_reasoner(),
            min_confidence_threshold: default_min_confidence_threshold(),
            audit_dir: None,
        }
    }
}

/// `[reasoner]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasonerSection {
    #[serde(default = "default_reasoner_cmd")]
    pub cmd: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_reasoner_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ReasonerSection {
    fn default() -> Self {
        Self {
            cmd: default_reasoner_cmd(),
            args: Vec::new(),
            timeout_secs: default_reasoner_timeout_secs(),
        }
    }
}

/// Parsed `triage.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TriageToml {
    #[serde(default)]
    pub engine: EngineSection,
    #[serde(default)]
    pub reasoner: ReasonerSection,
}

impl TriageToml {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Load `triage.toml` from `config_dir`, or defaults when it does not exist.
    pub fn load_or_default(config_dir: &Path) -> Result<Self, ConfigError> {
        let path = config_dir.join(CONFIG_FILE);
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize triage.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }
}

/// Fully resolved engine settings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineConfig {
    pub max_iterations: u32,
    pub enable_reasoner: bool,
    pub min_confidence_threshold: f64,
    pub reasoner_timeout_secs: u64,
    pub reasoner_cmd: String,
    pub reasoner_args: Vec<String>,
    pub audit_dir: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from_toml(&TriageToml::default())
    }
}

impl EngineConfig {
    pub fn from_toml(toml: &TriageToml) -> Self {
        Self {
            max_iterations: toml.engine.max_iterations,
            enable_reasoner: toml.engine.enable_reasoner,
            min_confidence_threshold: toml.engine.min_confidence_threshold,
            reasoner_timeout_secs: toml.reasoner.timeout_secs,
            reasoner_cmd: toml.reasoner.cmd.clone(),
            reasoner_args: toml.reasoner.args.clone(),
            audit_dir: toml.engine.audit_dir.clone(),
        }
    }

    /// Load `<project_dir>/.triage/triage.toml` and apply the process environment.
    pub fn load(project_dir: &Path) -> Result<Self, ConfigError> {
        let toml = TriageToml::load_or_default(&project_dir.join(CONFIG_DIR))?;
        let config = Self::from_toml(&toml).apply_env()?;
        if !config.min_confidence_threshold.is_finite() {
            return Err(ConfigError::InvalidValue {
                key: "engine.min_confidence_threshold".to_string(),
                message: format!("{} is not a finite number", config.min_confidence_threshold),
            });
        }
        Ok(config)
    }

    pub fn apply_env(self) -> Result<Self, ConfigError> {
        self.apply_env_with(|key| std::env::var(key).ok())
    }

    /// Apply `TRIAGE_*` overrides read through `lookup`.
    pub fn apply_env_with(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(raw) = lookup(ENV_MAX_ITERATIONS) {
            self.max_iterations = parse_env(ENV_MAX_ITERATIONS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_ENABLE_REASONER) {
            self.enable_reasoner = parse_env_bool(ENV_ENABLE_REASONER, &raw)?;
        }
        if let Some(raw) = lookup(ENV_MIN_CONFIDENCE_THRESHOLD) {
            self.min_confidence_threshold = parse_env_finite(ENV_MIN_CONFIDENCE_THRESHOLD, &raw)?;
        }
        if let Some(raw) = lookup(ENV_REASONER_TIMEOUT_SECS) {
            self.reasoner_timeout_secs = parse_env(ENV_REASONER_TIMEOUT_SECS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_REASONER_CMD).filter(|v| !v.trim().is_empty()) {
            self.reasoner_cmd = raw.trim().to_string();
        }
        if let Some(raw) = lookup(ENV_AUDIT_DIR).filter(|v| !v.trim().is_empty()) {
            self.audit_dir = Some(PathBuf::from(raw.trim()));
        }
        Ok(self)
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_reasoner_enabled(mut self, enabled: bool) -> Self {
        self.enable_reasoner = enabled;
        self
    }

    pub fn with_min_confidence_threshold(mut self, threshold: f64) -> Self {
        self.min_confidence_threshold = threshold;
        self
    }

    pub fn with_reasoner_timeout_secs(mut self, secs: u64) -> Self {
        self.reasoner_timeout_secs = secs;
        self
    }

    pub fn with_audit_dir(mut self, dir: &Path) -> Self {
        self.audit_dir = Some(dir.to_path_buf());
        self
    }

    pub fn reasoner_timeout(&self) -> Duration {
        Duration::from_secs(self.reasoner_timeout_secs)
    }

    /// Audit directory, resolved against `project_dir` when relative.
    pub fn audit_dir_for(&self, project_dir: &Path) -> PathBuf {
        match &self.audit_dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => project_dir.join(dir),
            None => project_dir.join(CONFIG_DIR).join("audit"),
        }
    }

    /// Snapshot copied into each new repair session.
    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            max_iterations: self.max_iterations,
            enable_reasoner: self.enable_reasoner,
            min_confidence_threshold: self.min_confidence_threshold,
            reasoner_timeout_ms: self.reasoner_timeout_secs.saturating_mul(1000),
        }
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.max_iterations == 0 {
            warnings.push("max_iterations is 0: no repair iteration will ever run".to_string());
        }
        if !(0.0..=1.0).contains(&self.min_confidence_threshold) {
            warnings.push(format!(
                "min_confidence_threshold {} is outside [0, 1]",
                self.min_confidence_threshold
            ));
        }
        if self.enable_reasoner && self.reasoner_timeout_secs == 0 {
            warnings.push("reasoner timeout is 0s: every reasoner call will time out".to_string());
        }
        if self.enable_reasoner && self.reasoner_cmd.trim().is_empty() {
            warnings.push("reasoner is enabled but reasoner cmd is empty".to_string());
        }

        warnings
    }

    /// Render back to the file format, for `config show`.
    pub fn to_toml(&self) -> TriageToml {
        TriageToml {
            engine: EngineSection {
                max_iterations: self.max_iterations,
                enable_reasoner: self.enable_reasoner,
                min_confidence_threshold: self.min_confidence_threshold,
                audit_dir: self.audit_dir.clone(),
            },
            reasoner: ReasonerSection {
                cmd: self.reasoner_cmd.clone(),
                args: self.reasoner_args.clone(),
                timeout_secs: self.reasoner_timeout_secs,
            },
        }
    }
}

fn parse_env<T: FromStr>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("'{}': {}", raw, e),
    })
}

/// `f64` parsing accepts `NaN` and `inf`; neither is a usable threshold.
fn parse_env_finite(key: &str, raw: &str) -> Result<f64, ConfigError> {
    let value: f64 = parse_env(key, raw)?;
    if !value.is_finite() {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("'{}' is not a finite number", raw),
        });
    }
    Ok(value)
}

fn parse_env_bool(key: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("'{}' is not a boolean", raw),
        }),
    }
}
