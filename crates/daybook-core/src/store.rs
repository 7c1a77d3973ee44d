//! Local key-value persistence.
//!
//! The editor session keeps its caches, settings copy and session credential
//! in a flat string-to-string store. [`MemoryStore`] backs tests and
//! throwaway sessions; [`FileStore`] keeps a single JSON document on disk and
//! re-reads it before every mutation so concurrent writers never clobber each
//! other with a stale copy.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::error::StoreError;

/// Shared handle used by every component that touches local state.
pub type SharedStore = Arc<dyn KeyValueStore>;

/// Flat string key-value store.
pub trait KeyValueStore: Send + Sync + 'static {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    fn remove(&self, key: &str) -> Result<(), StoreError>;
    fn keys(&self) -> Result<Vec<String>, StoreError>;
}

/// In-memory store; contents vanish with the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedStore {
        Arc::new(Self::new())
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let guard = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(guard.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut guard = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        guard.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut guard = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        guard.remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        let guard = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(guard.keys().cloned().collect())
    }
}

/// JSON-file store.
///
/// A missing file reads as empty. A file that fails to parse is logged and
/// treated as empty; the next write replaces it.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_entries(&self) -> Result<BTreeMap<String, String>, StoreError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(error) => return Err(error.into()),
        };
        if raw.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        match serde_json::from_str(&raw) {
            Ok(entries) => Ok(entries),
            Err(error) => {
                tracing::warn!(
                    path = %self.path.display(),
                    "Local store is corrupt, starting empty: {}",
                    error
                );
                Ok(BTreeMap::new())
            }
        }
    }

    fn write_entries(&self, entries: &BTreeMap<String, String>) -> Result<(), StoreError> {
        let serialized = serde_json::to_string_pretty(entries)?;
        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, serialized)?;
        fs::rename(&temp_path, &self.path)?;
        Ok(())
    }

    fn mutate(
        &self,
        apply: impl FnOnce(&mut BTreeMap<String, String>) -> bool,
    ) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().map_err(|_| StoreError::Poisoned)?;
        let mut entries = self.read_entries()?;
        if apply(&mut entries) {
            self.write_entries(&entries)?;
        }
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.read_entries()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.mutate(|entries| {
            entries.insert(key.to_string(), value.to_string());
            true
        })
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.mutate(|entries| entries.remove(key).is_some())
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.read_entries()?.into_keys().collect())
    }
}
