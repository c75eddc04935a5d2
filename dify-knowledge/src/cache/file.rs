use super::{expiry_millis, is_expired, CacheStore, DEFAULT_PREFIX};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::{
    io::Write,
    path::{Path, PathBuf},
    time::Duration,
};
use tracing::{debug, warn};

const ENTRY_EXTENSION: &str = "cache";

#[derive(Debug, Serialize, Deserialize)]
struct CachedEntry {
    value: String,
    /// Unix millis; `None` never expires.
    expires_at: Option<i64>,
}

/// A [`CacheStore`] keeping one JSON file per key.
///
/// File names are the SHA-256 of the prefixed key, so arbitrary keys are safe
/// to use. Entries survive process restarts, which lets a console login be
/// reused by the next run.
#[derive(Debug, Clone)]
pub struct FileCache {
    directory: PathBuf,
    prefix: String,
    default_ttl: Option<Duration>,
}

impl FileCache {
    /// Opens (and creates, if needed) a cache rooted at `directory`.
    pub fn new<P: Into<PathBuf>>(directory: P) -> Result<Self> {
        let directory = directory.into();
        std::fs::create_dir_all(&directory).with_context(|| {
            format!("Failed to create cache directory: {}", directory.display())
        })?;
        Ok(Self {
            directory,
            prefix: DEFAULT_PREFIX.into(),
            default_ttl: None,
        })
    }

    /// `<temp dir>/dify_cache`
    pub fn default_directory() -> PathBuf {
        std::env::temp_dir().join("dify_cache")
    }

    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_default_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        let digest = Sha256::digest(format!("{}{}", self.prefix, key).as_bytes());
        self.directory
            .join(format!("{:x}.{}", digest, ENTRY_EXTENSION))
    }

    fn load(&self, path: &Path) -> Result<Option<CachedEntry>> {
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read cache file: {}", path.display()))?;
        let entry = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse cache file: {}", path.display()))?;
        Ok(Some(entry))
    }

    /// Writes to a fresh temp file in the cache directory and moves it over `path`.
    fn save(&self, path: &Path, entry: &CachedEntry) -> Result<()> {
        let contents = serde_json::to_vec(entry)?;
        let mut tmp = tempfile::Builder::new()
            .prefix(".entry")
            .suffix(".tmp")
            .tempfile_in(&self.directory)
            .with_context(|| {
                format!("Failed to create temp file in: {}", self.directory.display())
            })?;
        tmp.write_all(&contents)
            .with_context(|| format!("Failed to write temp file: {}", tmp.path().display()))?;
        tmp.persist(path)
            .with_context(|| format!("Failed to replace cache file: {}", path.display()))?;
        Ok(())
    }

    fn remove(&self, path: &Path) -> Result<()> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e)
                .with_context(|| format!("Failed to remove cache file: {}", path.display())),
        }
    }

    /// Runs blocking file work on the blocking thread pool.
    async fn blocking<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&FileCache) -> Result<T> + Send + 'static,
    {
        let cache = self.clone();
        tokio::task::spawn_blocking(move || op(&cache))
            .await
            .context("Cache file task failed")?
    }

    fn remove_all(&self) -> Result<()> {
        for dir_entry in std::fs::read_dir(&self.directory)? {
            let path = dir_entry?.path();
            let owned = path
                .extension()
                .map_or(false, |ext| ext == ENTRY_EXTENSION || ext == "tmp");
            if owned && path.is_file() {
                self.remove(&path)?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl CacheStore for FileCache {
    async fn get(&self, key: &str) -> Option<String> {
        let path = self.entry_path(key);
        let loaded = self
            .blocking(move |cache| {
                let Some(entry) = cache.load(&path)? else {
                    return Ok(None);
                };
                if is_expired(entry.expires_at) {
                    if let Err(e) = cache.remove(&path) {
                        warn!("Failed to evict expired cache entry: {:#}", e);
                    }
                    return Ok(None);
                }
                Ok(Some(entry.value))
            })
            .await;
        match loaded {
            Ok(value) => value,
            Err(e) => {
                debug!("Discarding unreadable cache entry: {:#}", e);
                None
            }
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> bool {
        let entry = CachedEntry {
            value: value.to_string(),
            expires_at: expiry_millis(ttl.or(self.default_ttl)),
        };
        let path = self.entry_path(key);
        match self.blocking(move |cache| cache.save(&path, &entry)).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to write cache entry: {:#}", e);
                false
            }
        }
    }

    async fn delete(&self, key: &str) -> bool {
        let path = self.entry_path(key);
        match self.blocking(move |cache| cache.remove(&path)).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to delete cache entry: {:#}", e);
                false
            }
        }
    }

    async fn clear(&self) -> bool {
        match self.blocking(|cache| cache.remove_all()).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to clear cache directory: {:#}", e);
                false
            }
        }
    }
}
