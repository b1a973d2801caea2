//! Persistence contract for session records.

use async_trait::async_trait;

use crate::error::Result;
use crate::record::SessionRecord;

/// Session persistence seam.
///
/// A missing session is `Ok(None)`, never an error, so the caller can decide
/// to start a fresh conversation. Built-in backends live in
/// `convoroute-storage`; implement this for anything else.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn save(&self, session_id: &str, record: &SessionRecord) -> Result<()>;
    async fn load(&self, session_id: &str) -> Result<Option<SessionRecord>>;
    async fn delete(&self, session_id: &str) -> Result<()>;
    async fn list_sessions(&self) -> Result<Vec<String>>;
}
