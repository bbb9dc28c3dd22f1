use crate::domain::{Result, SessionInfo, SessionState, SessionTotals};
use crate::ports::TrackingPort;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio::time::interval;
use tracing::{debug, info};
use uuid::Uuid;

/// How long a closed session stays listed before cleanup drops it.
const CLOSED_RETENTION: Duration = Duration::from_secs(4);

/// In-memory session registry
pub struct SessionTracker {
    sessions: Arc<RwLock<Vec<SessionInfo>>>,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Start background cleanup task
    pub fn start_cleanup(&self) -> tokio::task::JoinHandle<()> {
        let sessions = self.sessions.clone();

        tokio::spawn(async move {
            let mut ticker = interval(Duration::from_millis(250));

            loop {
                ticker.tick().await;
                prune_closed(&mut *sessions.write().await, Instant::now());
            }
        })
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

fn prune_closed(sessions: &mut Vec<SessionInfo>, now: Instant) {
    sessions.retain(|session| match session.closed_at {
        Some(closed_at) => now.duration_since(closed_at) < CLOSED_RETENTION,
        None => true,
    });
}

impl Default for SessionTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TrackingPort for SessionTracker {
    async fn track_session(&self, info: SessionInfo) -> Result<()> {
        info!(session = %info.id, peer = ?info.peer, "CONNECT {}", info.target);

        let mut sessions = self.sessions.write().await;
        sessions.push(info);

        Ok(())
    }

    async fn update_state(&self, id: Uuid, state: SessionState) -> Result<()> {
        let mut sessions = self.sessions.write().await;

        if let Some(session) = sessions.iter_mut().find(|s| s.id == id) {
            debug!(session = %id, "{} -> {}", session.state, state);
            session.state = state;
        }

        Ok(())
    }

    async fn close_session(&self, id: Uuid, totals: SessionTotals) -> Result<()> {
        let mut sessions = self.sessions.write().await;

        if let Some(session) = sessions.iter_mut().find(|s| s.id == id) {
            session.close(totals);
        }

        Ok(())
    }

    async fn active_sessions(&self) -> Result<Vec<SessionInfo>> {
        let sessions = self.sessions.read().await;
        Ok(sessions.iter().filter(|s| s.closed_at.is_none()).cloned().collect())
    }
}
