//! Session store backends for the Convoroute framework

mod file;
mod memory;
mod redis;

pub use convoroute_core::{FlowError, Result, SessionRecord, SessionStore};
pub use file::FileStore;
pub use memory::MemoryStore;
pub use redis::RedisStore;

use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StorageConfig {
    #[serde(rename = "none")]
    None,
    #[serde(rename = "memory")]
    Memory,
    #[serde(rename = "file")]
    File { path: String },
    #[serde(rename = "redis")]
    Redis {
        url: String,
        #[serde(default)]
        prefix: Option<String>,
        #[serde(default)]
        ttl_seconds: Option<u64>,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::None
    }
}

pub fn create_store(config: &StorageConfig) -> Result<Option<Arc<dyn SessionStore>>> {
    match config {
        StorageConfig::None => Ok(None),
        StorageConfig::Memory => Ok(Some(Arc::new(MemoryStore::new()))),
        StorageConfig::File { path } => Ok(Some(Arc::new(FileStore::new(path)))),

        #[cfg(feature = "redis-storage")]
        StorageConfig::Redis {
            url,
            prefix,
            ttl_seconds,
        } => {
            let mut store = RedisStore::new(url)?;
            if let Some(p) = prefix {
                store = store.with_prefix(p);
            }
            if let Some(ttl) = ttl_seconds {
                store = store.with_ttl(*ttl);
            }
            Ok(Some(Arc::new(store)))
        }

        #[cfg(not(feature = "redis-storage"))]
        StorageConfig::Redis { .. } => Err(FlowError::Persistence(
            "Redis store requires the 'redis-storage' feature".into(),
        )),
    }
}
