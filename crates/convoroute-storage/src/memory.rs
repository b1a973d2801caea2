//! In-memory session store, for tests and single-process embeddings.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use convoroute_core::{Result, SessionRecord, SessionStore};

#[derive(Clone, Default)]
pub struct MemoryStore {
    sessions: Arc<RwLock<HashMap<String, SessionRecord>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn save(&self, session_id: &str, record: &SessionRecord) -> Result<()> {
        self.sessions
            .write()
            .insert(session_id.to_string(), record.clone());
        Ok(())
    }

    async fn load(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        Ok(self.sessions.read().get(session_id).cloned())
    }

    async fn delete(&self, session_id: &str) -> Result<()> {
        self.sessions.write().remove(session_id);
        Ok(())
    }

    async fn list_sessions(&self) -> Result<Vec<String>> {
        Ok(self.sessions.read().keys().cloned().collect())
    }
}
