use crate::domain::{Result, SessionInfo, SessionState, SessionTotals};
use async_trait::async_trait;
use uuid::Uuid;

/// Port for tracking tunnel sessions
#[async_trait]
pub trait TrackingPort: Send + Sync {
    /// Register a new session
    async fn track_session(&self, info: SessionInfo) -> Result<()>;

    async fn update_state(&self, id: Uuid, state: SessionState) -> Result<()>;

    /// Mark a session as closed and record what it moved
    async fn close_session(&self, id: Uuid, totals: SessionTotals) -> Result<()>;

    /// Get all sessions that are not closed yet
    async fn active_sessions(&self) -> Result<Vec<SessionInfo>>;
}
