use super::{expiry_millis, is_expired, CacheStore, DEFAULT_PREFIX};
use async_trait::async_trait;
use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
    time::Duration,
};

#[derive(Debug)]
struct Entry {
    value: String,
    expires_at: Option<i64>,
}

/// A process-local [`CacheStore`]. Entries are lost when the process exits.
#[derive(Debug)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, Entry>>,
    prefix: String,
    default_ttl: Option<Duration>,
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCache {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
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

    fn entries(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> Option<String> {
        let key = self.key(key);
        let mut entries = self.entries();
        let entry = entries.get(&key)?;
        if !is_expired(entry.expires_at) {
            return Some(entry.value.clone());
        }
        entries.remove(&key);
        None
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> bool {
        let entry = Entry {
            value: value.to_string(),
            expires_at: expiry_millis(ttl.or(self.default_ttl)),
        };
        self.entries().insert(self.key(key), entry);
        true
    }

    async fn delete(&self, key: &str) -> bool {
        self.entries().remove(&self.key(key));
        true
    }

    async fn clear(&self) -> bool {
        let prefix = &self.prefix;
        self.entries().retain(|key, _| !key.starts_with(prefix.as_str()));
        true
    }
}
