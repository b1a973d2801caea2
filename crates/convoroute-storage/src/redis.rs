//! Redis session store.

use async_trait::async_trait;

use convoroute_core::{FlowError, Result, SessionRecord, SessionStore};

#[cfg(feature = "redis-storage")]
pub struct RedisStore {
    client: redis::Client,
    prefix: String,
    default_ttl: Option<u64>,
}

#[cfg(feature = "redis-storage")]
fn map_redis_err(e: redis::RedisError) -> FlowError {
    FlowError::Persistence(e.to_string())
}

#[cfg(feature = "redis-storage")]
impl RedisStore {
    pub fn new(url: &str) -> Result<Self> {
        let client = redis::Client::open(url).map_err(map_redis_err)?;
        Ok(Self {
            client,
            prefix: "convoroute:".to_string(),
            default_ttl: None,
        })
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_ttl(mut self, ttl_seconds: u64) -> Self {
        self.default_ttl = Some(ttl_seconds);
        self
    }

    fn session_key(&self, session_id: &str) -> String {
        format!("{}session:{}", self.prefix, session_id)
    }

    fn sessions_set_key(&self) -> String {
        format!("{}all_sessions", self.prefix)
    }

    async fn get_connection(&self) -> Result<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(map_redis_err)
    }

    pub async fn exists(&self, session_id: &str) -> Result<bool> {
        let mut conn = self.get_connection().await?;
        redis::cmd("EXISTS")
            .arg(self.session_key(session_id))
            .query_async(&mut conn)
            .await
            .map_err(map_redis_err)
    }

    pub async fn set_ttl(&self, session_id: &str, ttl_seconds: u64) -> Result<()> {
        let mut conn = self.get_connection().await?;
        redis::cmd("EXPIRE")
            .arg(self.session_key(session_id))
            .arg(ttl_seconds as i64)
            .query_async::<()>(&mut conn)
            .await
            .map_err(map_redis_err)
    }
}

#[cfg(feature = "redis-storage")]
#[async_trait]
impl SessionStore for RedisStore {
    async fn save(&self, session_id: &str, record: &SessionRecord) -> Result<()> {
        let mut conn = self.get_connection().await?;
        let data =
            serde_json::to_string(record).map_err(|e| FlowError::Persistence(e.to_string()))?;
        let session_key = self.session_key(session_id);

        if let Some(ttl) = self.default_ttl {
            redis::cmd("SETEX")
                .arg(&session_key)
                .arg(ttl)
                .arg(&data)
                .query_async::<()>(&mut conn)
                .await
                .map_err(map_redis_err)?;
        } else {
            redis::cmd("SET")
                .arg(&session_key)
                .arg(&data)
                .query_async::<()>(&mut conn)
                .await
                .map_err(map_redis_err)?;
        }

        redis::cmd("SADD")
            .arg(self.sessions_set_key())
            .arg(session_id)
            .query_async::<()>(&mut conn)
            .await
            .map_err(map_redis_err)?;

        Ok(())
    }

    async fn load(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        let mut conn = self.get_connection().await?;
        let data: Option<String> = redis::cmd("GET")
            .arg(self.session_key(session_id))
            .query_async(&mut conn)
            .await
            .map_err(map_redis_err)?;

        match data {
            Some(ref json) => {
                let record = serde_json::from_str(json)
                    .map_err(|e| FlowError::Persistence(e.to_string()))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, session_id: &str) -> Result<()> {
        let mut conn = self.get_connection().await?;
        redis::cmd("DEL")
            .arg(self.session_key(session_id))
            .query_async::<()>(&mut conn)
            .await
            .map_err(map_redis_err)?;
        redis::cmd("SREM")
            .arg(self.sessions_set_key())
            .arg(session_id)
            .query_async::<()>(&mut conn)
            .await
            .map_err(map_redis_err)?;
        Ok(())
    }

    async fn list_sessions(&self) -> Result<Vec<String>> {
        let mut conn = self.get_connection().await?;
        redis::cmd("SMEMBERS")
            .arg(self.sessions_set_key())
            .query_async(&mut conn)
            .await
            .map_err(map_redis_err)
    }
}

#[cfg(not(feature = "redis-storage"))]
pub struct RedisStore {
    _private: (),
}

#[cfg(not(feature = "redis-storage"))]
impl RedisStore {
    pub fn new(_url: &str) -> Result<Self> {
        Err(FlowError::Persistence(
            "Redis store requires the 'redis-storage' feature".to_string(),
        ))
    }
}
