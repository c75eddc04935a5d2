use super::{CacheStore, RedisConfig, DEFAULT_PREFIX};
use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::{aio::MultiplexedConnection, AsyncCommands, RedisResult};
use std::time::Duration;
use tracing::warn;

/// Keys requested per `SCAN` round trip.
const SCAN_BATCH: usize = 200;

/// A [`CacheStore`] on a Redis server, using native key expiry.
#[derive(Clone)]
pub struct RedisCache {
    conn: MultiplexedConnection,
    prefix: String,
    default_ttl: Option<Duration>,
}

impl RedisCache {
    pub async fn connect(config: &RedisConfig) -> Result<Self> {
        let info = redis::ConnectionInfo {
            addr: redis::ConnectionAddr::Tcp(config.host.clone(), config.port),
            redis: redis::RedisConnectionInfo {
                db: config.database,
                password: config.password.clone(),
                ..Default::default()
            },
        };
        let client = redis::Client::open(info)?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .with_context(|| format!("Failed to connect to redis at {}:{}", config.host, config.port))?;
        Ok(Self::with_connection(conn))
    }

    pub fn with_connection(conn: MultiplexedConnection) -> Self {
        Self {
            conn,
            prefix: DEFAULT_PREFIX.into(),
            default_ttl: None,
        }
    }

    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_default_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.default_ttl = ttl;
        self
    }

    fn key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    fn report<T>(op: &str, result: RedisResult<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Redis {} failed: {}", op, e);
                None
            }
        }
    }
}

#[async_trait]
impl CacheStore for RedisCache {
    async fn get(&self, key: &str) -> Option<String> {
        let mut conn = self.conn.clone();
        let value: RedisResult<Option<String>> = conn.get(self.key(key)).await;
        Self::report("GET", value).flatten()
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> bool {
        let mut conn = self.conn.clone();
        let key = self.key(key);
        let result: RedisResult<()> = match ttl.or(self.default_ttl) {
            Some(ttl) if ttl.is_zero() => conn.del(key).await,
            Some(ttl) => {
                // SETEX has whole-second resolution; round up.
                let seconds = ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0);
                conn.set_ex(key, value, seconds).await
            }
            None => conn.set(key, value).await,
        };
        Self::report("SET", result).is_some()
    }

    async fn delete(&self, key: &str) -> bool {
        let mut conn = self.conn.clone();
        let result: RedisResult<()> = conn.del(self.key(key)).await;
        Self::report("DEL", result).is_some()
    }

    async fn has(&self, key: &str) -> bool {
        let mut conn = self.conn.clone();
        let result: RedisResult<bool> = conn.exists(self.key(key)).await;
        Self::report("EXISTS", result).unwrap_or(false)
    }

    async fn clear(&self) -> bool {
        let mut conn = self.conn.clone();
        let pattern = format!("{}*", self.prefix);
        let mut cursor: u64 = 0;
        loop {
            let page: RedisResult<(u64, Vec<String>)> = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await;
            let Some((next, keys)) = Self::report("SCAN", page) else {
                return false;
            };
            if !keys.is_empty() {
                let deleted: RedisResult<()> = conn.del(keys).await;
                if Self::report("DEL", deleted).is_none() {
                    return false;
                }
            }
            if next == 0 {
                return true;
            }
            cursor = next;
        }
    }
}
