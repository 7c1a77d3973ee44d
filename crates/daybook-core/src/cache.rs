//! Client-side caches layered over the local store.
//!
//! Both caches treat every storage or parse failure as a miss. Corrupt
//! entries are deleted rather than repaired, and every read-modify-write
//! re-reads the stored value immediately before writing it back.

use serde::{Deserialize, Serialize};

use crate::models::NotePath;
use crate::store::SharedStore;
use crate::util::unix_millis_now;

pub const AUTH_CACHE_KEY: &str = "auth_cache";
/// Cached verdicts expire 24h after their last write.
pub const AUTH_CACHE_TTL_MS: i64 = 24 * 60 * 60 * 1000;
/// Reads of verdicts older than this refresh the timestamp in the background.
pub const AUTH_CACHE_REFRESH_AFTER_MS: i64 = 60 * 60 * 1000;

pub const NOTE_CACHE_INDEX_KEY: &str = "note_cache_index";
pub const NOTE_CACHE_ENTRY_PREFIX: &str = "note_cache:";
pub const DEFAULT_NOTE_CACHE_CAPACITY: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct AuthCacheRecord {
    timestamp: i64,
    status: bool,
}

/// Single-slot cache of the last auth verdict.
#[derive(Clone)]
pub struct AuthCache {
    store: SharedStore,
}

impl AuthCache {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    pub fn read(&self) -> Option<bool> {
        self.read_at(unix_millis_now())
    }

    /// Cached verdict as seen at `now` (unix ms).
    ///
    /// Past the TTL the slot is cleared and the read is a miss. Between the
    /// refresh threshold and the TTL the verdict is returned right away and a
    /// timestamp refresh runs on the runtime in the background.
    pub fn read_at(&self, now: i64) -> Option<bool> {
        let record = self.load()?;
        let age = now.saturating_sub(record.timestamp);
        if age >= AUTH_CACHE_TTL_MS {
            tracing::debug!(age_ms = age, "Auth cache expired");
            self.clear();
            return None;
        }
        if age > AUTH_CACHE_REFRESH_AFTER_MS {
            self.spawn_refresh(now);
        }
        Some(record.status)
    }

    pub fn write(&self, status: bool) {
        self.write_at(status, unix_millis_now());
    }

    pub fn write_at(&self, status: bool, now: i64) {
        let record = AuthCacheRecord {
            timestamp: now,
            status,
        };
        let result = serde_json::to_string(&record)
            .map_err(crate::error::StoreError::from)
            .and_then(|raw| self.store.set(AUTH_CACHE_KEY, &raw));
        if let Err(error) = result {
            tracing::warn!("Failed to update auth cache: {}", error);
        }
    }

    /// Extend the staleness window of a positive verdict without re-verifying.
    pub fn refresh(&self) {
        self.refresh_at(unix_millis_now());
    }

    pub fn refresh_at(&self, now: i64) {
        if let Some(record) = self.load() {
            if record.status {
                self.write_at(true, now);
                tracing::debug!("Refreshed auth cache timestamp");
            }
        }
    }

    pub fn clear(&self) {
        if let Err(error) = self.store.remove(AUTH_CACHE_KEY) {
            tracing::warn!("Failed to clear auth cache: {}", error);
        }
    }

    /// Unix ms of the last write, if a valid record exists.
    pub fn written_at(&self) -> Option<i64> {
        self.load().map(|record| record.timestamp)
    }

    fn load(&self) -> Option<AuthCacheRecord> {
        let raw = match self.store.get(AUTH_CACHE_KEY) {
            Ok(raw) => raw?,
            Err(error) => {
                tracing::warn!("Failed to read auth cache: {}", error);
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(record) => Some(record),
            Err(error) => {
                tracing::warn!("Dropping corrupt auth cache: {}", error);
                self.clear();
                None
            }
        }
    }

    fn spawn_refresh(&self, now: i64) {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let cache = self.clone();
                handle.spawn(async move { cache.refresh_at(now) });
            }
            Err(_) => self.refresh_at(now),
        }
    }
}

/// Cached copy of a note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedNote {
    pub content: String,
    /// Unix ms of the write that produced this entry
    pub timestamp: i64,
    /// Whether `content` matches the last known server copy
    #[serde(default = "default_synced")]
    pub synced: bool,
}

const fn default_synced() -> bool {
    true
}

/// Bounded note cache with strict least-recently-used eviction.
///
/// The recency index lives under [`NOTE_CACHE_INDEX_KEY`], most recent
/// first; each entry lives under `note_cache:<path>`.
#[derive(Clone)]
pub struct NoteCache {
    store: SharedStore,
    capacity: usize,
}

impl NoteCache {
    pub fn new(store: SharedStore) -> Self {
        Self::with_capacity(store, DEFAULT_NOTE_CACHE_CAPACITY)
    }

    pub fn with_capacity(store: SharedStore, capacity: usize) -> Self {
        Self {
            store,
            capacity: capacity.max(1),
        }
    }

    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Read an entry and mark it most recently used.
    pub fn get(&self, path: &NotePath) -> Option<CachedNote> {
        let key = entry_key(path);
        let raw = match self.store.get(&key) {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                self.forget(path);
                return None;
            }
            Err(error) => {
                tracing::warn!(path = %path, "Failed to read note cache: {}", error);
                return None;
            }
        };

        match serde_json::from_str::<CachedNote>(&raw) {
            Ok(entry) => {
                self.touch(path);
                Some(entry)
            }
            Err(error) => {
                tracing::warn!(path = %path, "Dropping corrupt note cache entry: {}", error);
                self.remove(path);
                None
            }
        }
    }

    /// Write an entry and mark it most recently used, evicting past capacity.
    pub fn put(&self, path: &NotePath, content: &str, synced: bool) {
        let entry = CachedNote {
            content: content.to_string(),
            timestamp: unix_millis_now(),
            synced,
        };
        let result = serde_json::to_string(&entry)
            .map_err(crate::error::StoreError::from)
            .and_then(|raw| self.store.set(&entry_key(path), &raw));
        match result {
            Ok(()) => self.touch(path),
            Err(error) => tracing::warn!(path = %path, "Failed to write note cache: {}", error),
        }
    }

    pub fn remove(&self, path: &NotePath) {
        if let Err(error) = self.store.remove(&entry_key(path)) {
            tracing::warn!(path = %path, "Failed to remove note cache entry: {}", error);
        }
        self.forget(path);
    }

    pub fn clear(&self) {
        for key in self.entry_keys() {
            if let Err(error) = self.store.remove(&key) {
                tracing::warn!(key, "Failed to remove note cache entry: {}", error);
            }
        }
        if let Err(error) = self.store.remove(NOTE_CACHE_INDEX_KEY) {
            tracing::warn!("Failed to remove note cache index: {}", error);
        }
    }

    /// Cached paths, most recently used first.
    pub fn paths(&self) -> Vec<String> {
        self.load_index()
    }

    fn touch(&self, path: &NotePath) {
        let mut index = self.load_index();
        index.retain(|existing| existing != path.as_str());
        index.insert(0, path.to_string());

        let evicted = if index.len() > self.capacity {
            index.split_off(self.capacity)
        } else {
            Vec::new()
        };
        self.save_index(&index);

        for victim in evicted {
            tracing::debug!(path = victim, "Evicting note from cache");
            if let Err(error) = self.store.remove(&format!("{NOTE_CACHE_ENTRY_PREFIX}{victim}")) {
                tracing::warn!(path = victim, "Failed to evict note cache entry: {}", error);
            }
        }

        self.sweep_orphans(&index);
    }

    fn forget(&self, path: &NotePath) {
        let mut index = self.load_index();
        let before = index.len();
        index.retain(|existing| existing != path.as_str());
        if index.len() != before {
            self.save_index(&index);
        }
    }

    /// Drop entries the index no longer references, e.g. after the index was
    /// found corrupt and reset.
    fn sweep_orphans(&self, index: &[String]) {
        for key in self.entry_keys() {
            let Some(path) = key.strip_prefix(NOTE_CACHE_ENTRY_PREFIX) else {
                continue;
            };
            if !index.iter().any(|kept| kept == path) {
                let _ = self.store.remove(&key);
            }
        }
    }

    fn entry_keys(&self) -> Vec<String> {
        match self.store.keys() {
            Ok(keys) => keys
                .into_iter()
                .filter(|key| key.starts_with(NOTE_CACHE_ENTRY_PREFIX))
                .collect(),
            Err(error) => {
                tracing::warn!("Failed to list note cache entries: {}", error);
                Vec::new()
            }
        }
    }

    fn load_index(&self) -> Vec<String> {
        let raw = match self.store.get(NOTE_CACHE_INDEX_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(error) => {
                tracing::warn!("Failed to read note cache index: {}", error);
                return Vec::new();
            }
        };
        match serde_json::from_str(&raw) {
            Ok(index) => index,
            Err(error) => {
                tracing::warn!("Dropping corrupt note cache index: {}", error);
                let _ = self.store.remove(NOTE_CACHE_INDEX_KEY);
                Vec::new()
            }
        }
    }

    fn save_index(&self, index: &[String]) {
        let result = serde_json::to_string(index)
            .map_err(crate::error::StoreError::from)
            .and_then(|raw| self.store.set(NOTE_CACHE_INDEX_KEY, &raw));
        if let Err(error) = result {
            tracing::warn!("Failed to write note cache index: {}", error);
        }
    }
}

fn entry_key(path: &NotePath) -> String {
    format!("{NOTE_CACHE_ENTRY_PREFIX}{path}")
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::store::{KeyValueStore, MemoryStore};

    fn path(raw: &str) -> NotePath {
        NotePath::parse(raw).unwrap()
    }

    const WRITTEN: i64 = 1_700_000_000_000;

    fn cache_written_at(status: bool, at: i64) -> AuthCache {
        let cache = AuthCache::new(MemoryStore::shared());
        cache.write_at(status, at);
        cache
    }

    #[test]
    fn auth_cache_hits_until_the_ttl() {
        assert_eq!(cache_written_at(true, WRITTEN).read_at(WRITTEN + 1_000), Some(true));
        assert_eq!(
            cache_written_at(true, WRITTEN).read_at(WRITTEN + AUTH_CACHE_TTL_MS - 1),
            Some(true)
        );
    }

    #[test]
    fn auth_cache_misses_and_clears_at_the_ttl() {
        let cache = cache_written_at(true, WRITTEN);
        assert_eq!(cache.read_at(WRITTEN + AUTH_CACHE_TTL_MS), None);
        assert_eq!(cache.written_at(), None);
    }

    #[test]
    fn stale_read_extends_the_ttl_window() {
        // outside a runtime the refresh runs inline
        let cache = cache_written_at(true, WRITTEN);
        let stale_read = WRITTEN + AUTH_CACHE_TTL_MS - 1;
        assert_eq!(cache.read_at(stale_read), Some(true));
        assert_eq!(cache.written_at(), Some(stale_read));
        assert_eq!(cache.read_at(WRITTEN + AUTH_CACHE_TTL_MS), Some(true));
    }

    #[test]
    fn auth_cache_caches_negative_verdicts() {
        let cache = AuthCache::new(MemoryStore::shared());
        cache.write_at(false, 10);
        assert_eq!(cache.read_at(20), Some(false));
    }

    #[tokio::test]
    async fn auth_cache_refreshes_stale_reads_in_background() {
        let cache = AuthCache::new(MemoryStore::shared());
        let written = 1_700_000_000_000;
        cache.write_at(true, written);

        let read_time = written + 61 * 60 * 1000;
        assert_eq!(cache.read_at(read_time), Some(true));
        tokio::task::yield_now().await;

        assert_eq!(cache.written_at(), Some(read_time));
    }

    #[tokio::test]
    async fn auth_cache_leaves_fresh_reads_alone() {
        let cache = AuthCache::new(MemoryStore::shared());
        let written = 1_700_000_000_000;
        cache.write_at(true, written);

        assert_eq!(cache.read_at(written + 59 * 60 * 1000), Some(true));
        tokio::task::yield_now().await;

        assert_eq!(cache.written_at(), Some(written));
    }

    #[test]
    fn auth_cache_refresh_ignores_negative_verdict() {
        let cache = AuthCache::new(MemoryStore::shared());
        cache.write_at(false, 5);
        cache.refresh_at(100);
        assert_eq!(cache.written_at(), Some(5));
    }

    #[test]
    fn auth_cache_deletes_corrupt_record() {
        let store = MemoryStore::shared();
        store.set(AUTH_CACHE_KEY, "{oops").unwrap();
        let cache = AuthCache::new(store.clone());

        assert_eq!(cache.read(), None);
        assert_eq!(store.get(AUTH_CACHE_KEY).unwrap(), None);
    }

    #[test]
    fn note_cache_evicts_least_recently_used() {
        let store = MemoryStore::shared();
        let cache = NoteCache::new(store.clone());

        cache.put(&path("20240101"), "one", true);
        cache.put(&path("20240102"), "two", true);
        cache.put(&path("20240103"), "three", true);
        // touching the oldest makes 20240102 the LRU victim
        assert!(cache.get(&path("20240101")).is_some());
        cache.put(&path("20240104"), "four", true);

        assert_eq!(
            cache.paths(),
            vec!["20240104", "20240101", "20240103"]
        );
        assert!(cache.get(&path("20240102")).is_none());
        assert_eq!(store.get("note_cache:20240102").unwrap(), None);
    }

    #[test]
    fn note_cache_never_exceeds_capacity() {
        let store = MemoryStore::shared();
        let cache = NoteCache::new(store.clone());
        for day in 1..=9 {
            cache.put(&path(&format!("2024010{day}")), "x", true);
            let stored = store
                .keys()
                .unwrap()
                .into_iter()
                .filter(|key| key.starts_with(NOTE_CACHE_ENTRY_PREFIX))
                .count();
            assert!(stored <= DEFAULT_NOTE_CACHE_CAPACITY);
        }
        assert_eq!(cache.paths(), vec!["20240109", "20240108", "20240107"]);
    }

    #[test]
    fn note_cache_deletes_corrupt_entries() {
        let store = MemoryStore::shared();
        let cache = NoteCache::new(store.clone());
        cache.put(&path("inbox"), "hello", true);
        store.set("note_cache:inbox", "not json").unwrap();

        assert_eq!(cache.get(&path("inbox")), None);
        assert_eq!(store.get("note_cache:inbox").unwrap(), None);
        assert!(cache.paths().is_empty());
    }

    #[test]
    fn note_cache_recovers_from_corrupt_index() {
        let store = MemoryStore::shared();
        let cache = NoteCache::new(store.clone());
        cache.put(&path("a"), "a", true);
        cache.put(&path("b"), "b", true);
        store.set(NOTE_CACHE_INDEX_KEY, "[broken").unwrap();

        cache.put(&path("c"), "c", true);
        assert_eq!(cache.paths(), vec!["c"]);
        assert_eq!(store.get("note_cache:a").unwrap(), None);
    }

    #[test]
    fn note_cache_tracks_sync_flag() {
        let cache = NoteCache::new(MemoryStore::shared());
        cache.put(&path("20240101"), "draft", false);
        let entry = cache.get(&path("20240101")).unwrap();
        assert_eq!(entry.content, "draft");
        assert!(!entry.synced);
    }

    #[test]
    fn legacy_entries_without_sync_flag_read_as_synced() {
        let store = MemoryStore::shared();
        store
            .set("note_cache:20240101", r#"{"content":"abc","timestamp":1}"#)
            .unwrap();
        let cache = NoteCache::new(store);
        assert!(cache.get(&path("20240101")).unwrap().synced);
    }
}
