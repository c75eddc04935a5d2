//! Key-value stores used to persist console credentials.
//!
//! [`CacheStore`] is the seam between the session and wherever tokens live. The
//! stores never fail loudly: a read of missing, expired or corrupt data yields
//! `None`, and a failed write returns `false`, so a broken cache degrades to
//! "not logged in" instead of an error.
//!
//! Three backends ship with the crate:
//! - [`MemoryCache`]: process-local, mostly for tests and short-lived tools.
//! - [`FileCache`]: one file per key under a directory.
//! - `RedisCache`: native TTLs on a Redis server (cargo feature `redis`).
//!
//! ```
//! use dify_knowledge::cache::{CacheStore, MemoryCache};
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let cache = MemoryCache::new();
//! assert!(cache.set("access_token", "abc", Some(Duration::from_secs(60))).await);
//! assert_eq!(cache.get("access_token").await.as_deref(), Some("abc"));
//! assert!(cache.delete("access_token").await);
//! assert!(!cache.has("access_token").await);
//! # }
//! ```
mod file;
mod memory;
#[cfg(feature = "redis")]
mod redis;

pub use self::file::FileCache;
pub use self::memory::MemoryCache;
#[cfg(feature = "redis")]
pub use self::redis::RedisCache;

use async_trait::async_trait;
use std::{path::PathBuf, sync::Arc, time::Duration};

/// Prefix applied to every key unless configured otherwise.
pub const DEFAULT_PREFIX: &str = "dify_";

/// An expiring key-value store.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Returns the value, or `None` when absent, expired or unreadable.
    async fn get(&self, key: &str) -> Option<String>;

    /// Stores a value, overwriting any previous one.
    ///
    /// A `None` ttl falls back to the store's default ttl; when that is also
    /// `None` the entry never expires.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> bool;

    /// Removes a key. Removing an absent key succeeds.
    async fn delete(&self, key: &str) -> bool;

    async fn has(&self, key: &str) -> bool {
        self.get(key).await.is_some()
    }

    /// Removes every entry owned by this store.
    async fn clear(&self) -> bool;
}

/// Unix time in milliseconds at which an entry written now with `ttl` expires.
pub(crate) fn expiry_millis(ttl: Option<Duration>) -> Option<i64> {
    ttl.map(|ttl| {
        let ttl = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        now_millis().saturating_add(ttl)
    })
}

pub(crate) fn is_expired(expires_at: Option<i64>) -> bool {
    expires_at.map_or(false, |at| now_millis() >= at)
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Connection settings for the Redis backend.
#[derive(Clone, Debug)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    pub database: i64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 6379,
            password: None,
            database: 0,
        }
    }
}

/// Which backend [`create`] builds.
#[derive(Clone, Debug)]
pub enum CacheDriver {
    Memory,
    /// Files under `directory`, or under the system temp dir when `None`.
    File { directory: Option<PathBuf> },
    Redis(RedisConfig),
}

/// Cache selection and shared settings.
#[derive(Clone, Debug)]
pub struct CacheConfig {
    pub driver: CacheDriver,
    /// TTL applied when a write does not specify one.
    pub default_ttl: Option<Duration>,
    /// Prefix applied to every key.
    pub prefix: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            driver: CacheDriver::File { directory: None },
            default_ttl: None,
            prefix: DEFAULT_PREFIX.into(),
        }
    }
}

/// Builds the store selected by `config`.
///
/// # Errors
/// Fails when the cache directory cannot be created, when the Redis server is
/// unreachable, or when Redis is selected without the `redis` feature.
pub async fn create(config: &CacheConfig) -> anyhow::Result<Arc<dyn CacheStore>> {
    let store: Arc<dyn CacheStore> = match &config.driver {
        CacheDriver::Memory => Arc::new(
            MemoryCache::new()
                .with_prefix(&config.prefix)
                .with_default_ttl(config.default_ttl),
        ),
        CacheDriver::File { directory } => {
            let directory = directory.clone().unwrap_or_else(FileCache::default_directory);
            Arc::new(
                FileCache::new(directory)?
                    .with_prefix(&config.prefix)
                    .with_default_ttl(config.default_ttl),
            )
        }
        #[cfg(feature = "redis")]
        CacheDriver::Redis(redis_config) => Arc::new(
            RedisCache::connect(redis_config)
                .await?
                .with_prefix(&config.prefix)
                .with_default_ttl(config.default_ttl),
        ),
        #[cfg(not(feature = "redis"))]
        CacheDriver::Redis(_) => {
            anyhow::bail!("the redis cache driver requires the `redis` feature")
        }
    };
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiry_is_relative_to_now() {
        assert_eq!(expiry_millis(None), None);
        let at = expiry_millis(Some(Duration::from_secs(60))).unwrap();
        assert!(at > now_millis());
        assert!(!is_expired(Some(at)));
        assert!(is_expired(Some(now_millis() - 1)));
        assert!(!is_expired(None));
    }

    #[tokio::test]
    async fn creates_memory_store_with_prefix() {
        let config = CacheConfig {
            driver: CacheDriver::Memory,
            default_ttl: None,
            prefix: "test_".into(),
        };
        let store = create(&config).await.unwrap();
        assert!(store.set("k", "v", None).await);
        assert_eq!(store.get("k").await.as_deref(), Some("v"));
    }

    #[cfg(not(feature = "redis"))]
    #[tokio::test]
    async fn redis_without_feature_is_rejected() {
        let config = CacheConfig {
            driver: CacheDriver::Redis(RedisConfig::default()),
            ..CacheConfig::default()
        };
        assert!(create(&config).await.is_err());
    }
}
