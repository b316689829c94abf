//! TTL query cache
//!
//! `QueryCache` never fails its caller: store errors are logged and treated
//! as misses, so a broken cache only costs latency.

use crate::error::Result;
use crate::storage::Database;
use ahash::AHashMap;
use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Backing key-value store with per-entry expiry. Last write wins.
pub trait CacheStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    fn remove(&self, key: &str) -> Result<()>;

    /// Drop expired entries, returning how many were removed
    fn purge_expired(&self) -> Result<usize>;
}

/// Cache entries in the shared SQLite database
pub struct SqliteCacheStore {
    db: Database,
}

impl SqliteCacheStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

impl CacheStore for SqliteCacheStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.db.get_conn()?;
        let value = conn
            .query_row(
                "SELECT value FROM cache_entries WHERE key = ?1 AND expires_at > ?2",
                params![key, now_millis()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let conn = self.db.get_conn()?;
        let expires_at = now_millis().saturating_add(ttl.as_millis() as i64);
        conn.execute(
            "INSERT INTO cache_entries (key, value, expires_at) VALUES (?1, ?2, ?3)
             ON CONFLICT (key) DO UPDATE SET
                 value = excluded.value,
                 expires_at = excluded.expires_at",
            params![key, value, expires_at],
        )?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let conn = self.db.get_conn()?;
        conn.execute("DELETE FROM cache_entries WHERE key = ?1", params![key])?;
        Ok(())
    }

    fn purge_expired(&self) -> Result<usize> {
        let conn = self.db.get_conn()?;
        let removed = conn.execute(
            "DELETE FROM cache_entries WHERE expires_at <= ?1",
            params![now_millis()],
        )?;
        Ok(removed)
    }
}

/// Process-local cache
#[derive(Default)]
pub struct MemoryCacheStore {
    entries: Mutex<AHashMap<String, (String, Instant)>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, AHashMap<String, (String, Instant)>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl CacheStore for MemoryCacheStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let mut entries = self.entries();
        match entries.get(key) {
            Some((value, expires)) if *expires > Instant::now() => Ok(Some(value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.entries()
            .insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries().remove(key);
        Ok(())
    }

    fn purge_expired(&self) -> Result<usize> {
        let mut entries = self.entries();
        let before = entries.len();
        let now = Instant::now();
        entries.retain(|_, (_, expires)| *expires > now);
        Ok(before - entries.len())
    }
}

/// Hit/miss counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

/// JSON read-through cache over a [`CacheStore`]
pub struct QueryCache {
    store: Arc<dyn CacheStore>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl QueryCache {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self {
            store,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryCacheStore::new()))
    }

    /// Cached value for `key`, or `None` on miss, expiry, store failure, or
    /// an entry that no longer deserializes
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.store.get(key) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Cache read failed for {}: {}", key, e);
                None
            }
        };

        let value = raw.and_then(|raw| match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Discarding undecodable cache entry {}: {}", key, e);
                None
            }
        });

        if value.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!("Cache hit: {}", key);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            debug!("Cache miss: {}", key);
        }
        value
    }

    /// Store `value` under `key`. Failures are logged and dropped.
    pub fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Cache value for {} not serializable: {}", key, e);
                return;
            }
        };
        if let Err(e) = self.store.set(key, &raw, ttl) {
            warn!("Cache write failed for {}: {}", key, e);
        }
    }

    pub fn invalidate(&self, key: &str) {
        if let Err(e) = self.store.remove(key) {
            warn!("Cache invalidation failed for {}: {}", key, e);
        }
    }

    pub fn purge_expired(&self) -> usize {
        self.store.purge_expired().unwrap_or_else(|e| {
            warn!("Cache purge failed: {}", e);
            0
        })
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

/// Key for a search result list
pub fn search_key(query: &str, k: usize, user: Option<&str>) -> String {
    format!("search_{}_{}_{}", query.trim(), k, user.unwrap_or("anonymous"))
}

/// Key for an autocomplete prediction list
pub fn predict_key(partial: &str, limit: usize, user: Option<&str>) -> String {
    format!("predict_{}_{}_{}", partial, limit, user.unwrap_or("anonymous"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScholarError;
    use tempfile::TempDir;

    struct BrokenStore;

    impl CacheStore for BrokenStore {
        fn get(&self, _key: &str) -> Result<Option<String>> {
            Err(ScholarError::Config("store offline".to_string()))
        }

        fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<()> {
            Err(ScholarError::Config("store offline".to_string()))
        }

        fn remove(&self, _key: &str) -> Result<()> {
            Err(ScholarError::Config("store offline".to_string()))
        }

        fn purge_expired(&self) -> Result<usize> {
            Err(ScholarError::Config("store offline".to_string()))
        }
    }

    #[test]
    fn test_memory_roundtrip_and_stats() {
        let cache = QueryCache::in_memory();
        let key = search_key("malaria", 5, None);
        assert_eq!(cache.get::<Vec<String>>(&key), None);

        cache.set(&key, &vec!["doc-1".to_string()], Duration::from_secs(60));
        assert_eq!(cache.get::<Vec<String>>(&key), Some(vec!["doc-1".to_string()]));
        assert_eq!(cache.stats(), CacheStats { hits: 1, misses: 1 });

        cache.invalidate(&key);
        assert_eq!(cache.get::<Vec<String>>(&key), None);
    }

    #[test]
    fn test_memory_expiry() {
        let store = MemoryCacheStore::new();
        store.set("k", "v", Duration::from_millis(0)).unwrap();
        assert_eq!(store.get("k").unwrap(), None);

        store.set("a", "1", Duration::from_millis(0)).unwrap();
        store.set("b", "2", Duration::from_secs(60)).unwrap();
        assert_eq!(store.purge_expired().unwrap(), 1);
    }

    #[test]
    fn test_sqlite_store() {
        let temp = TempDir::new().unwrap();
        let db = Database::new(&temp.path().join("cache.db")).unwrap();
        let store = SqliteCacheStore::new(db);

        store.set("k", "first", Duration::from_secs(60)).unwrap();
        store.set("k", "second", Duration::from_secs(60)).unwrap();
        assert_eq!(store.get("k").unwrap(), Some("second".to_string()));

        store.set("old", "x", Duration::from_secs(0)).unwrap();
        assert_eq!(store.get("old").unwrap(), None);
        assert_eq!(store.purge_expired().unwrap(), 1);

        store.remove("k").unwrap();
        assert_eq!(store.get("k").unwrap(), None);
    }

    #[test]
    fn test_broken_store_degrades_to_miss() {
        let cache = QueryCache::new(Arc::new(BrokenStore));
        cache.set("k", &42u32, Duration::from_secs(60));
        assert_eq!(cache.get::<u32>("k"), None);
        assert_eq!(cache.purge_expired(), 0);
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn test_keys_include_scope() {
        assert_eq!(search_key(" malaria ", 5, None), "search_malaria_5_anonymous");
        assert_ne!(search_key("q", 5, Some("u1")), search_key("q", 5, Some("u2")));
        assert_ne!(search_key("q", 5, None), search_key("q", 10, None));
        assert_ne!(predict_key("ma", 5, None), search_key("ma", 5, None));
    }
}
