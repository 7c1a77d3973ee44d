//! Editor settings synchronization.
//!
//! The local copy is authoritative for what the editor shows. The server copy
//! is only read when no valid local copy exists, and writes reach it through
//! a debounced best-effort push.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::Value;

use crate::client::NoteClient;
use crate::debounce::Debouncer;
use crate::error::{Error, Result};
use crate::events::ErrorReporter;
use crate::models::{DeviceClass, EditorSettings};
use crate::store::SharedStore;

pub const EDITOR_SETTINGS_KEY: &str = "editor_settings";
pub const SETTINGS_PUSH_DELAY: Duration = Duration::from_millis(500);

pub struct SettingsSync {
    store: SharedStore,
    client: NoteClient,
    reporter: ErrorReporter,
    device: DeviceClass,
    current: Mutex<EditorSettings>,
    pusher: Debouncer<Value>,
}

impl SettingsSync {
    /// Must be called inside a tokio runtime.
    pub fn new(
        store: SharedStore,
        client: NoteClient,
        reporter: ErrorReporter,
        device: DeviceClass,
    ) -> Self {
        let pusher = Debouncer::spawn(SETTINGS_PUSH_DELAY, {
            let client = client.clone();
            let reporter = reporter.clone();
            move |document: Value| {
                let client = client.clone();
                let reporter = reporter.clone();
                async move {
                    match client.put_settings(&document).await {
                        Ok(()) => tracing::debug!("Pushed settings to server"),
                        Err(error) => reporter.foreground("Failed to save settings", &error),
                    }
                }
            }
        });

        Self {
            store,
            client,
            reporter,
            device,
            current: Mutex::new(EditorSettings::defaults_for(device)),
            pusher,
        }
    }

    pub const fn device(&self) -> DeviceClass {
        self.device
    }

    pub fn current(&self) -> EditorSettings {
        self.lock_current().clone()
    }

    /// Resolve the settings to apply: local copy, then server, then defaults.
    pub async fn load(&self) -> EditorSettings {
        if let Some(local) = self.read_local() {
            tracing::debug!("Applying local settings copy");
            *self.lock_current() = local.clone();
            self.push_in_background(&local);
            return local;
        }

        let settings = match self.client.get_settings().await {
            Ok(stored) => match EditorSettings::from_stored(self.device, stored) {
                Ok(settings) => {
                    self.write_local(&settings);
                    settings
                }
                Err(error) => {
                    self.reporter.background("Server settings are malformed", &error);
                    EditorSettings::defaults_for(self.device)
                }
            },
            Err(error) => {
                self.reporter.background("Failed to load settings", &error);
                EditorSettings::defaults_for(self.device)
            }
        };
        *self.lock_current() = settings.clone();
        settings
    }

    /// Persist locally now and schedule a debounced server push.
    pub fn save(&self, settings: EditorSettings) {
        self.write_local(&settings);
        match serde_json::to_value(&settings) {
            Ok(document) => self.pusher.call(document),
            Err(error) => tracing::error!("Failed to serialize settings: {}", error),
        }
        *self.lock_current() = settings;
    }

    /// Apply a change to the current settings and save the result.
    pub fn update(
        &self,
        change: impl FnOnce(&mut EditorSettings) -> Result<()>,
    ) -> Result<EditorSettings> {
        let mut next = self.current();
        change(&mut next)?;
        self.save(next.clone());
        Ok(next)
    }

    /// Send any pending push now.
    pub async fn flush(&self) {
        self.pusher.flush().await;
    }

    /// Forget the local copy and any pending push.
    pub fn clear_local(&self) {
        self.pusher.cancel();
        if let Err(error) = self.store.remove(EDITOR_SETTINGS_KEY) {
            tracing::warn!("Failed to remove local settings: {}", error);
        }
        *self.lock_current() = EditorSettings::defaults_for(self.device);
    }

    fn read_local(&self) -> Option<EditorSettings> {
        let raw = match self.store.get(EDITOR_SETTINGS_KEY) {
            Ok(raw) => raw?,
            Err(error) => {
                tracing::warn!("Failed to read local settings: {}", error);
                return None;
            }
        };
        let parsed = serde_json::from_str::<Value>(&raw)
            .map_err(Error::from)
            .and_then(|value| match value {
                Value::Object(map) => EditorSettings::from_stored(self.device, map),
                _ => Err(Error::Parse("settings are not an object".to_string())),
            });
        match parsed {
            Ok(settings) => Some(settings),
            Err(error) => {
                tracing::warn!("Dropping corrupt local settings: {}", error);
                let _ = self.store.remove(EDITOR_SETTINGS_KEY);
                None
            }
        }
    }

    fn write_local(&self, settings: &EditorSettings) {
        let result = serde_json::to_string(settings)
            .map_err(crate::error::StoreError::from)
            .and_then(|raw| self.store.set(EDITOR_SETTINGS_KEY, &raw));
        if let Err(error) = result {
            tracing::warn!("Failed to write local settings: {}", error);
        }
    }

    fn push_in_background(&self, settings: &EditorSettings) {
        let document = match serde_json::to_value(settings) {
            Ok(document) => document,
            Err(error) => {
                tracing::error!("Failed to serialize settings: {}", error);
                return;
            }
        };
        let client = self.client.clone();
        let reporter = self.reporter.clone();
        tokio::spawn(async move {
            if let Err(error) = client.put_settings(&document).await {
                reporter.background("Background settings push failed", &error);
            }
        });
    }

    fn lock_current(&self) -> MutexGuard<'_, EditorSettings> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::cache::AuthCache;
    use crate::events::{EventBus, NotificationLevel, SessionEvent};
    use crate::models::{Pane, Theme, ViewMode};
    use crate::request::RequestManager;
    use crate::store::{KeyValueStore, MemoryStore};
    use crate::test_support::FakeServer;

    struct Harness {
        store: SharedStore,
        server: Arc<FakeServer>,
        events: EventBus,
        sync: SettingsSync,
    }

    fn harness(device: DeviceClass) -> Harness {
        let store = MemoryStore::shared();
        let server = FakeServer::authed();
        let events = EventBus::new();
        let client = NoteClient::new(Arc::new(RequestManager::new(server.clone())));
        let reporter = ErrorReporter::new(AuthCache::new(store.clone()), events.clone());
        let sync = SettingsSync::new(store.clone(), client, reporter, device);
        Harness {
            store,
            server,
            events,
            sync,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn local_copy_wins_and_is_pushed() {
        let h = harness(DeviceClass::Desktop);
        h.server.put_settings(json!({"theme": "light"}));
        h.store
            .set(EDITOR_SETTINGS_KEY, r#"{"theme":"dark","editorFontSize":20}"#)
            .unwrap();

        let loaded = h.sync.load().await;
        assert_eq!(loaded.theme, Theme::Dark);
        assert_eq!(loaded.editor_font_size, 20);

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(h.server.stored_settings().unwrap()["theme"], json!("dark"));
    }

    #[tokio::test(start_paused = true)]
    async fn server_copy_is_used_and_stored_without_local_copy() {
        let h = harness(DeviceClass::Mobile);
        h.server.put_settings(json!({"viewMode": "preview"}));

        let loaded = h.sync.load().await;
        assert_eq!(loaded.view_mode, ViewMode::Preview);
        assert_eq!(loaded.editor_font_size, 16);

        let local = h.store.get(EDITOR_SETTINGS_KEY).unwrap().unwrap();
        assert!(local.contains("\"viewMode\":\"preview\""));
    }

    #[tokio::test(start_paused = true)]
    async fn defaults_when_offline_without_local_copy() {
        let h = harness(DeviceClass::Mobile);
        h.server.set_offline(true);
        assert_eq!(
            h.sync.load().await,
            EditorSettings::defaults_for(DeviceClass::Mobile)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn corrupt_local_copy_is_deleted() {
        let h = harness(DeviceClass::Desktop);
        h.store.set(EDITOR_SETTINGS_KEY, "{not json").unwrap();
        h.server.put_settings(json!({"codeTheme": "monokai"}));

        let loaded = h.sync.load().await;
        assert_eq!(loaded.code_theme, "monokai");
        assert!(!h.store.get(EDITOR_SETTINGS_KEY).unwrap().unwrap().contains("not json"));
    }

    #[tokio::test(start_paused = true)]
    async fn saves_write_locally_and_push_once_after_quiet_window() {
        let h = harness(DeviceClass::Desktop);
        for size in [15, 16, 17] {
            h.sync
                .update(|settings| settings.set_font_size(Pane::Editor, size))
                .unwrap();
        }
        let local = h.store.get(EDITOR_SETTINGS_KEY).unwrap().unwrap();
        assert!(local.contains("\"editorFontSize\":17"));
        assert!(h.server.settings_writes().is_empty());

        tokio::time::sleep(SETTINGS_PUSH_DELAY + Duration::from_millis(10)).await;
        let writes = h.server.settings_writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0]["editorFontSize"], json!(17));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_push_notifies_and_keeps_local_copy() {
        let h = harness(DeviceClass::Desktop);
        let mut receiver = h.events.subscribe();
        h.server.set_offline(true);

        h.sync.update(|settings| {
            settings.toggle_theme();
            Ok(())
        })
        .unwrap();
        h.sync.flush().await;

        let SessionEvent::Notification(notification) = receiver.recv().await.unwrap() else {
            panic!("expected a notification");
        };
        assert_eq!(notification.level, NotificationLevel::Error);
        assert_eq!(h.sync.current().theme, Theme::Dark);
        assert!(h.store.get(EDITOR_SETTINGS_KEY).unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_update_changes_nothing() {
        let h = harness(DeviceClass::Desktop);
        assert!(h
            .sync
            .update(|settings| settings.set_font_size(Pane::Preview, 500))
            .is_err());
        assert_eq!(h.store.get(EDITOR_SETTINGS_KEY).unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn clear_local_drops_copy_and_pending_push() {
        let h = harness(DeviceClass::Desktop);
        h.sync.save(EditorSettings::defaults_for(DeviceClass::Desktop));
        h.sync.clear_local();
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(h.store.get(EDITOR_SETTINGS_KEY).unwrap(), None);
        assert!(h.server.settings_writes().is_empty());
    }
}
