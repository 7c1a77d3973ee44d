//! Filesystem layout under the data directory:
//!
//! ```text
//! notes/<path>.md
//! history/<path>/<unix-ms>.md
//! settings/<device>.json
//! ```

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tokio::fs;
use tokio::sync::Mutex;

use daybook_core::util::unix_millis_now;
use daybook_core::{DeviceClass, HistorySnapshot, NotePath, NoteSummary};

use crate::auth::sanitize;
use crate::error::AppError;

const NOTE_EXTENSION: &str = "md";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredNote {
    pub content: String,
    pub modified: DateTime<Utc>,
}

pub struct NoteStore {
    root: PathBuf,
    history_retention: Duration,
    write_lock: Mutex<()>,
}

impl NoteStore {
    pub fn new(root: impl Into<PathBuf>, history_retention: Duration) -> Self {
        Self {
            root: root.into(),
            history_retention,
            write_lock: Mutex::new(()),
        }
    }

    pub async fn ensure_layout(&self) -> Result<(), AppError> {
        for dir in ["notes", "history", "settings"] {
            fs::create_dir_all(self.root.join(dir))
                .await
                .map_err(|error| io_error("create data directory", &error))?;
        }
        Ok(())
    }

    pub async fn read_note(&self, path: &NotePath) -> Result<Option<StoredNote>, AppError> {
        let file = self.note_file(path);
        let content = match fs::read_to_string(&file).await {
            Ok(content) => content,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(io_error("read note", &error)),
        };
        let modified = modified_at(&file).await?;
        Ok(Some(StoredNote { content, modified }))
    }

    /// Persists `content`; with `create_history` also snapshots it and prunes
    /// snapshots past the retention window. Returns the snapshot timestamp.
    pub async fn write_note(
        &self,
        path: &NotePath,
        content: &str,
        create_history: bool,
    ) -> Result<Option<i64>, AppError> {
        let _guard = self.write_lock.lock().await;

        let file = self.note_file(path);
        write_atomic(&file, content).await?;

        if !create_history {
            return Ok(None);
        }

        let dir = self.history_dir(path);
        fs::create_dir_all(&dir)
            .await
            .map_err(|error| io_error("create history directory", &error))?;

        let existing = history_timestamps(&dir).await?;
        let latest = existing.iter().copied().max().unwrap_or(0);
        let timestamp = unix_millis_now().max(latest + 1);
        write_atomic(&dir.join(format!("{timestamp}.{NOTE_EXTENSION}")), content).await?;

        let retention_ms = i64::try_from(self.history_retention.as_millis()).unwrap_or(i64::MAX);
        let cutoff = timestamp.saturating_sub(retention_ms);
        let mut pruned = 0_usize;
        for stale in existing.into_iter().filter(|ts| *ts < cutoff) {
            match fs::remove_file(dir.join(format!("{stale}.{NOTE_EXTENSION}"))).await {
                Ok(()) => pruned += 1,
                Err(error) if error.kind() == ErrorKind::NotFound => {}
                Err(error) => {
                    tracing::warn!(path = %path, snapshot = stale, "Failed to prune snapshot: {}", sanitize(&error));
                }
            }
        }
        if pruned > 0 {
            tracing::info!(path = %path, pruned, "Pruned expired history snapshots");
        }

        Ok(Some(timestamp))
    }

    /// Returns `false` when the note did not exist. History removal is best effort.
    pub async fn delete_note(&self, path: &NotePath) -> Result<bool, AppError> {
        let _guard = self.write_lock.lock().await;

        match fs::remove_file(self.note_file(path)).await {
            Ok(()) => {}
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(false),
            Err(error) => return Err(io_error("delete note", &error)),
        }
        if let Err(error) = fs::remove_dir_all(self.history_dir(path)).await {
            if error.kind() != ErrorKind::NotFound {
                tracing::warn!(path = %path, "Failed to remove history: {}", sanitize(&error));
            }
        }
        Ok(true)
    }

    /// Most recently modified first.
    pub async fn list_notes(&self) -> Result<Vec<NoteSummary>, AppError> {
        let dir = self.root.join("notes");
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(error) => return Err(io_error("list notes", &error)),
        };

        let mut notes = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|error| io_error("list notes", &error))?
        {
            let file = entry.path();
            let Some(path) = note_path_of(&file) else {
                continue;
            };
            let metadata = entry
                .metadata()
                .await
                .map_err(|error| io_error("stat note", &error))?;
            if !metadata.is_file() {
                continue;
            }
            let last_modified = metadata
                .modified()
                .map(DateTime::<Utc>::from)
                .map_err(|error| io_error("stat note", &error))?;
            notes.push(NoteSummary {
                path: path.to_string(),
                last_modified,
                size: metadata.len(),
            });
        }

        notes.sort_by(|a, b| {
            b.last_modified
                .cmp(&a.last_modified)
                .then_with(|| a.path.cmp(&b.path))
        });
        Ok(notes)
    }

    /// Newest first; empty when the note has no history.
    pub async fn list_history(&self, path: &NotePath) -> Result<Vec<HistorySnapshot>, AppError> {
        let dir = self.history_dir(path);
        let mut timestamps = history_timestamps(&dir).await?;
        timestamps.sort_unstable_by(|a, b| b.cmp(a));

        let mut snapshots = Vec::with_capacity(timestamps.len());
        for timestamp in timestamps {
            match fs::read_to_string(dir.join(format!("{timestamp}.{NOTE_EXTENSION}"))).await {
                Ok(content) => snapshots.push(HistorySnapshot { timestamp, content }),
                Err(error) if error.kind() == ErrorKind::NotFound => {}
                Err(error) => return Err(io_error("read snapshot", &error)),
            }
        }
        Ok(snapshots)
    }

    pub async fn read_history(
        &self,
        path: &NotePath,
        timestamp: i64,
    ) -> Result<Option<String>, AppError> {
        match fs::read_to_string(self.snapshot_file(path, timestamp)).await {
            Ok(content) => Ok(Some(content)),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
            Err(error) => Err(io_error("read snapshot", &error)),
        }
    }

    pub async fn delete_history(&self, path: &NotePath, timestamp: i64) -> Result<bool, AppError> {
        match fs::remove_file(self.snapshot_file(path, timestamp)).await {
            Ok(()) => Ok(true),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(false),
            Err(error) => Err(io_error("delete snapshot", &error)),
        }
    }

    pub async fn delete_all_history(&self, path: &NotePath) -> Result<(), AppError> {
        match fs::remove_dir_all(self.history_dir(path)).await {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(()),
            Err(error) => Err(io_error("delete history", &error)),
        }
    }

    pub async fn read_settings(
        &self,
        device: DeviceClass,
    ) -> Result<Option<Map<String, Value>>, AppError> {
        let raw = match fs::read_to_string(self.settings_file(device)).await {
            Ok(raw) => raw,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(io_error("read settings", &error)),
        };
        match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Object(map)) => Ok(Some(map)),
            Ok(_) | Err(_) => {
                tracing::warn!(device = %device, "Ignoring corrupt settings file");
                Ok(None)
            }
        }
    }

    pub async fn write_settings(
        &self,
        device: DeviceClass,
        settings: &Map<String, Value>,
    ) -> Result<(), AppError> {
        let raw = serde_json::to_string_pretty(settings)
            .map_err(|error| AppError::internal(format!("encode settings: {}", sanitize(&error))))?;
        let _guard = self.write_lock.lock().await;
        write_atomic(&self.settings_file(device), &raw).await
    }

    fn note_file(&self, path: &NotePath) -> PathBuf {
        self.root
            .join("notes")
            .join(format!("{}.{NOTE_EXTENSION}", path.as_str()))
    }

    fn history_dir(&self, path: &NotePath) -> PathBuf {
        self.root.join("history").join(path.as_str())
    }

    fn snapshot_file(&self, path: &NotePath, timestamp: i64) -> PathBuf {
        self.history_dir(path)
            .join(format!("{timestamp}.{NOTE_EXTENSION}"))
    }

    fn settings_file(&self, device: DeviceClass) -> PathBuf {
        self.root
            .join("settings")
            .join(format!("{}.json", device.as_str()))
    }
}

async fn write_atomic(file: &Path, content: &str) -> Result<(), AppError> {
    if let Some(parent) = file.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|error| io_error("create directory", &error))?;
    }
    let tmp = file.with_extension("tmp");
    fs::write(&tmp, content)
        .await
        .map_err(|error| io_error("write file", &error))?;
    fs::rename(&tmp, file)
        .await
        .map_err(|error| io_error("replace file", &error))
}

async fn modified_at(file: &Path) -> Result<DateTime<Utc>, AppError> {
    let metadata = fs::metadata(file)
        .await
        .map_err(|error| io_error("stat note", &error))?;
    metadata
        .modified()
        .map(DateTime::<Utc>::from)
        .map_err(|error| io_error("stat note", &error))
}

async fn history_timestamps(dir: &Path) -> Result<Vec<i64>, AppError> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(error) if error.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(error) => return Err(io_error("list history", &error)),
    };
    let mut timestamps = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|error| io_error("list history", &error))?
    {
        let file = entry.path();
        if file.extension().and_then(|ext| ext.to_str()) != Some(NOTE_EXTENSION) {
            continue;
        }
        if let Some(timestamp) = file
            .file_stem()
            .and_then(|stem| stem.to_str())
            .and_then(|stem| stem.parse::<i64>().ok())
        {
            timestamps.push(timestamp);
        }
    }
    Ok(timestamps)
}

fn note_path_of(file: &Path) -> Option<NotePath> {
    if file.extension().and_then(|ext| ext.to_str()) != Some(NOTE_EXTENSION) {
        return None;
    }
    let stem = file.file_stem()?.to_str()?;
    NotePath::parse(stem).ok()
}

fn io_error(action: &str, error: &std::io::Error) -> AppError {
    AppError::internal(format!("Failed to {action}: {}", sanitize(error)))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    const DAY: Duration = Duration::from_secs(24 * 60 * 60);

    fn path(raw: &str) -> NotePath {
        NotePath::parse(raw).unwrap()
    }

    async fn store(dir: &tempfile::TempDir) -> NoteStore {
        let store = NoteStore::new(dir.path(), 30 * DAY);
        store.ensure_layout().await.unwrap();
        store
    }

    #[tokio::test]
    async fn missing_note_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;
        assert_eq!(store.read_note(&path("20240101")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn write_then_read_note() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;

        let snapshot = store.write_note(&path("20240101"), "hello", false).await.unwrap();
        assert_eq!(snapshot, None);

        let note = store.read_note(&path("20240101")).await.unwrap().unwrap();
        assert_eq!(note.content, "hello");
        assert!(dir.path().join("notes/20240101.md").exists());
        assert!(!dir.path().join("history/20240101").exists());
    }

    #[tokio::test]
    async fn history_saves_get_unique_increasing_timestamps() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;

        let first = store.write_note(&path("a"), "one", true).await.unwrap().unwrap();
        let second = store.write_note(&path("a"), "two", true).await.unwrap().unwrap();
        assert!(second > first);

        let history = store.list_history(&path("a")).await.unwrap();
        let contents: Vec<_> = history.iter().map(|s| s.content.as_str()).collect();
        assert_eq!(contents, vec!["two", "one"]);
    }

    #[tokio::test]
    async fn history_creating_save_prunes_expired_snapshots() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;
        let history = dir.path().join("history/a");
        std::fs::create_dir_all(&history).unwrap();

        let day_ms = i64::try_from(DAY.as_millis()).unwrap();
        let old = unix_millis_now() - 31 * day_ms;
        let recent = unix_millis_now() - 29 * day_ms;
        std::fs::write(history.join(format!("{old}.md")), "old").unwrap();
        std::fs::write(history.join(format!("{recent}.md")), "recent").unwrap();

        store.write_note(&path("a"), "now", false).await.unwrap();
        assert_eq!(store.list_history(&path("a")).await.unwrap().len(), 2);

        store.write_note(&path("a"), "now", true).await.unwrap();
        let contents: Vec<_> = store
            .list_history(&path("a"))
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.content)
            .collect();
        assert_eq!(contents, vec!["now".to_string(), "recent".to_string()]);
    }

    #[tokio::test]
    async fn delete_note_removes_history_and_reports_missing() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;

        store.write_note(&path("a"), "x", true).await.unwrap();
        assert!(store.delete_note(&path("a")).await.unwrap());
        assert!(!dir.path().join("history/a").exists());
        assert!(!store.delete_note(&path("a")).await.unwrap());
    }

    #[tokio::test]
    async fn single_snapshot_read_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;

        let ts = store.write_note(&path("a"), "x", true).await.unwrap().unwrap();
        assert_eq!(store.read_history(&path("a"), ts).await.unwrap().as_deref(), Some("x"));
        assert!(store.delete_history(&path("a"), ts).await.unwrap());
        assert!(!store.delete_history(&path("a"), ts).await.unwrap());
        assert_eq!(store.read_history(&path("a"), ts).await.unwrap(), None);

        store.delete_all_history(&path("never-saved")).await.unwrap();
    }

    #[tokio::test]
    async fn list_notes_skips_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;

        store.write_note(&path("20240101"), "abc", false).await.unwrap();
        std::fs::write(dir.path().join("notes/readme.txt"), "ignored").unwrap();

        let notes = store.list_notes().await.unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].path, "20240101");
        assert_eq!(notes[0].size, 3);
    }

    #[tokio::test]
    async fn settings_are_partitioned_by_device() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;

        let mut settings = Map::new();
        settings.insert("theme".to_string(), Value::String("dark".to_string()));
        store.write_settings(DeviceClass::Mobile, &settings).await.unwrap();

        assert_eq!(store.read_settings(DeviceClass::Mobile).await.unwrap(), Some(settings));
        assert_eq!(store.read_settings(DeviceClass::Desktop).await.unwrap(), None);

        std::fs::write(dir.path().join("settings/desktop.json"), "[1,2").unwrap();
        assert_eq!(store.read_settings(DeviceClass::Desktop).await.unwrap(), None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_settings_writes_all_succeed() {
        let dir = tempfile::tempdir().unwrap();
        let store = std::sync::Arc::new(store(&dir).await);

        let writers: Vec<_> = (0..16)
            .map(|size| {
                let store = store.clone();
                tokio::spawn(async move {
                    let mut settings = Map::new();
                    settings.insert("editorFontSize".to_string(), Value::from(size));
                    store.write_settings(DeviceClass::Desktop, &settings).await
                })
            })
            .collect();
        for writer in writers {
            writer.await.unwrap().unwrap();
        }

        let stored = store.read_settings(DeviceClass::Desktop).await.unwrap().unwrap();
        assert!(stored["editorFontSize"].is_u64());
    }
}
