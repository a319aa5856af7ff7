use super::SessionStats;
use crate::session::SessionSnapshot;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Writes terminal sessions to `<audit_dir>/runs/<timestamp>_<id8>.json`.
#[derive(Debug, Clone)]
pub struct AuditLogger {
    audit_dir: PathBuf,
}

impl AuditLogger {
    pub fn new(audit_dir: &Path) -> Self {
        Self {
            audit_dir: audit_dir.to_path_buf(),
        }
    }

    pub fn audit_dir(&self) -> &Path {
        &self.audit_dir
    }

    pub fn runs_dir(&self) -> PathBuf {
        self.audit_dir.join("runs")
    }

    /// Write one session snapshot and return the file it was written to.
    pub fn archive(&self, session: &SessionSnapshot) -> Result<PathBuf> {
        let runs_dir = self.runs_dir();
        fs::create_dir_all(&runs_dir)
            .with_context(|| format!("Failed to create audit dir: {}", runs_dir.display()))?;

        let filename = format!(
            "{}_{}.json",
            session.created_at.format("%Y-%m-%dT%H-%M-%S"),
            &session.session_id.to_string()[..8]
        );
        let run_file = runs_dir.join(&filename);

        let json =
            serde_json::to_string_pretty(session).context("Failed to serialize session")?;
        fs::write(&run_file, json).context("Failed to write audit run file")?;
        Ok(run_file)
    }

    /// Archived session files, most recent first.
    pub fn list_runs(&self) -> Result<Vec<PathBuf>> {
        let runs_dir = self.runs_dir();
        if !runs_dir.exists() {
            return Ok(Vec::new());
        }

        let mut runs: Vec<PathBuf> = fs::read_dir(&runs_dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().map(|e| e == "json").unwrap_or(false))
            .collect();

        runs.sort();
        runs.reverse(); // Most recent first
        Ok(runs)
    }

    pub fn load_run(&self, path: &Path) -> Result<SessionSnapshot> {
        let content = fs::read_to_string(path).context("Failed to read audit run file")?;
        let session: SessionSnapshot =
            serde_json::from_str(&content).context("Failed to parse audit run file")?;
        Ok(session)
    }

    /// Load every readable archive. Unparseable files are skipped with a warning.
    pub fn load_all(&self) -> Result<Vec<SessionSnapshot>> {
        let mut sessions = Vec::new();
        for path in self.list_runs()? {
            match self.load_run(&path) {
                Ok(session) => sessions.push(session),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping audit file"),
            }
        }
        Ok(sessions)
    }

    pub fn stats(&self) -> Result<SessionStats> {
        let sessions = self.load_all()?;
        Ok(SessionStats::from_sessions(&sessions))
    }
}
