//! Per-target session map.
//!
//! At most one live session exists per target. A terminal session stays in
//! the map for inspection until the next failure report for that target
//! replaces it with a fresh session.

use crate::errors::SessionError;
use crate::session::{RepairSession, SessionSettings};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, Arc<RepairSession>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session for `target`, replacing a terminal one.
    ///
    /// Fails with [`SessionError::Busy`] while a live session exists.
    pub async fn start(
        &self,
        target: &str,
        settings: SessionSettings,
    ) -> Result<Arc<RepairSession>, SessionError> {
        let mut sessions = self.sessions.lock().await;
        if let Some(existing) = sessions.get(target) {
            if !existing.is_terminal() {
                return Err(SessionError::Busy {
                    target: target.to_string(),
                });
            }
            debug!(
                repair_target = target,
                previous = %existing.id(),
                "replacing terminal session"
            );
        }

        let session = Arc::new(RepairSession::new(target, settings));
        sessions.insert(target.to_string(), Arc::clone(&session));
        Ok(session)
    }

    pub async fn get(&self, target: &str) -> Option<Arc<RepairSession>> {
        self.sessions.lock().await.get(target).cloned()
    }

    pub async fn targets(&self) -> Vec<String> {
        let mut targets: Vec<String> = self.sessions.lock().await.keys().cloned().collect();
        targets.sort();
        targets
    }

    /// Number of sessions that have not reached a terminal state.
    pub async fn live_count(&self) -> usize {
        self.sessions
            .lock()
            .await
            .values()
            .filter(|s| !s.is_terminal())
            .count()
    }

    /// Drop every terminal session. Returns how many were removed.
    pub async fn prune_terminal(&self) -> usize {
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();
        sessions.retain(|_, s| !s.is_terminal());
        before - sessions.len()
    }
}
