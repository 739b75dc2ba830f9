//! Redis-backed [`KeyValueStore`].
//!
//! Each record is a Redis string holding its JSON encoding, so the
//! `codebase:*` namespaces map one-to-one onto Redis keys. Lists use native
//! Redis lists (`RPUSH`/`LRANGE`); a key holds either a string or a list,
//! never both. Writes go straight to the server, so `flush` is a no-op.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, ConnectionAddr, ConnectionInfo, RedisConnectionInfo};
use serde_json::Value;
use tracing::{debug, info};

use super::{KeyValueStore, StoreError};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Where to find the Redis server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisSettings {
    pub host: String,
    pub port: u16,
    pub db: i64,
    pub password: Option<String>,
}

impl Default for RedisSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6379,
            db: 0,
            password: None,
        }
    }
}

impl RedisSettings {
    fn connection_info(&self) -> ConnectionInfo {
        ConnectionInfo {
            addr: ConnectionAddr::Tcp(self.host.clone(), self.port),
            redis: RedisConnectionInfo {
                db: self.db,
                password: self.password.clone(),
                ..Default::default()
            },
        }
    }
}

/// Key-value store on a Redis server.
#[derive(Clone)]
pub struct RedisStore {
    conn: MultiplexedConnection,
    settings: RedisSettings,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("host", &self.settings.host)
            .field("port", &self.settings.port)
            .field("db", &self.settings.db)
            .finish()
    }
}

impl RedisStore {
    /// Connect and `PING` the server. Fails if it is unreachable within a
    /// few seconds or rejects the credentials.
    pub async fn connect(settings: RedisSettings) -> Result<Self, StoreError> {
        let client = redis::Client::open(settings.connection_info())?;

        let mut conn = tokio::time::timeout(CONNECT_TIMEOUT, async {
            let mut conn = client.get_multiplexed_tokio_connection().await?;
            redis::cmd("PING")
                .query_async::<_, String>(&mut conn)
                .await?;
            Ok::<_, redis::RedisError>(conn)
        })
        .await
        .map_err(|_| {
            redis::RedisError::from((redis::ErrorKind::IoError, "connection timed out"))
        })??;

        let db_size: i64 = redis::cmd("DBSIZE").query_async(&mut conn).await?;
        info!(
            "Connected to Redis at {}:{} (db {}, {} keys)",
            settings.host, settings.port, settings.db, db_size
        );

        Ok(Self { conn, settings })
    }

    pub fn settings(&self) -> &RedisSettings {
        &self.settings
    }
}

/// Decode a stored string; values written by other tools may not be JSON.
fn decode(raw: String) -> Value {
    serde_json::from_str(&raw).unwrap_or(Value::String(raw))
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn write(&self, key: &str, value: &Value) -> Result<bool, StoreError> {
        let encoded = serde_json::to_string(value)?;
        let mut conn = self.conn.clone();
        conn.set::<_, _, ()>(key, encoded).await?;
        Ok(true)
    }

    async fn read(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(key).await?;
        Ok(raw.map(decode))
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let removed: i64 = conn.del(key).await?;
        Ok(removed > 0)
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn.clone();
        let mut keys: Vec<String> = conn.keys(pattern).await?;
        keys.sort();
        debug!("KEYS {} matched {}", pattern, keys.len());
        Ok(keys)
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        Ok(conn.exists(key).await?)
    }

    async fn list_append(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let encoded = serde_json::to_string(&value)?;
        let mut conn = self.conn.clone();
        conn.rpush::<_, _, ()>(key, encoded).await?;
        Ok(())
    }

    async fn list_get(&self, key: &str) -> Result<Vec<Value>, StoreError> {
        let mut conn = self.conn.clone();
        let raw: Vec<String> = conn.lrange(key, 0, -1).await?;
        Ok(raw.into_iter().map(decode).collect())
    }
}
