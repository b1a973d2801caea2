//! File-backed session store: one pretty-printed JSON file per session.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use convoroute_core::{Result, SessionRecord, SessionStore};

pub struct FileStore {
    base_path: PathBuf,
}

impl FileStore {
    pub fn new(base_path: impl AsRef<Path>) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
        }
    }

    fn session_path(&self, session_id: &str) -> PathBuf {
        self.base_path.join(format!("{}.json", session_id))
    }
}

#[async_trait]
impl SessionStore for FileStore {
    async fn save(&self, session_id: &str, record: &SessionRecord) -> Result<()> {
        tokio::fs::create_dir_all(&self.base_path).await?;
        let path = self.session_path(session_id);
        let json = serde_json::to_string_pretty(record)?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }

    async fn load(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        let path = self.session_path(session_id);
        if !path.exists() {
            return Ok(None);
        }
        let json = tokio::fs::read_to_string(path).await?;
        let record = serde_json::from_str(&json)?;
        Ok(Some(record))
    }

    async fn delete(&self, session_id: &str) -> Result<()> {
        let path = self.session_path(session_id);
        if path.exists() {
            tokio::fs::remove_file(path).await?;
        }
        Ok(())
    }

    async fn list_sessions(&self) -> Result<Vec<String>> {
        let mut sessions = Vec::new();
        if !self.base_path.exists() {
            return Ok(sessions);
        }

        let mut entries = tokio::fs::read_dir(&self.base_path).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().map(|e| e == "json").unwrap_or(false) {
                if let Some(name) = path.file_stem() {
                    sessions.push(name.to_string_lossy().to_string());
                }
            }
        }
        Ok(sessions)
    }
}
