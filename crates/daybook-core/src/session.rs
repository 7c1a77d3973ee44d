//! The editor session: one "tab" worth of state.
//!
//! [`EditorSession`] owns the local store, caches, request manager, settings
//! synchronizer and the autosave engine of the open note. Front-ends drive
//! it and render what it emits on [`EventBus`].

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;

use crate::autosave::{AutosaveEngine, AutosaveTimings, Baseline, EngineContext, SaveState};
use crate::bootstrap::{BootstrapOutcome, BootstrapSequencer, LoadingTimings};
use crate::cache::{AuthCache, NoteCache};
use crate::client::NoteClient;
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::events::{ErrorReporter, EventBus, SessionEvent};
use crate::models::{HistorySnapshot, NotePath, NoteSummary};
use crate::request::RequestManager;
use crate::settings::SettingsSync;
use crate::store::SharedStore;
use crate::transport::{CredentialJar, HttpTransport, Transport};

/// Pause between attempts to read a note that opened without its server copy.
const DEFERRED_LOAD_RETRY: Duration = Duration::from_secs(5);

/// Where the content shown after opening a note came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteSource {
    /// Local cache; the server copy is reconciled in the background
    Cache,
    Server,
    /// The server could not be reached and nothing was cached
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenedNote {
    pub path: NotePath,
    pub content: String,
    pub source: NoteSource,
}

pub struct EditorSession {
    requests: Arc<RequestManager>,
    client: NoteClient,
    auth_cache: AuthCache,
    notes: NoteCache,
    credentials: CredentialJar,
    events: EventBus,
    reporter: ErrorReporter,
    settings: SettingsSync,
    sequencer: BootstrapSequencer,
    autosave_timings: AutosaveTimings,
    editor: Mutex<Option<AutosaveEngine>>,
}

impl EditorSession {
    /// Session talking to the configured server over HTTP.
    pub fn connect(config: &ClientConfig, store: SharedStore) -> Result<Self> {
        let credentials = CredentialJar::new(store.clone());
        let transport = HttpTransport::new(&config.server_url, config.device, credentials)?;
        Ok(Self::new(config, store, Arc::new(transport)))
    }

    /// Must be called inside a tokio runtime.
    pub fn new(config: &ClientConfig, store: SharedStore, transport: Arc<dyn Transport>) -> Self {
        let requests = Arc::new(RequestManager::with_timeout(
            transport,
            config.request_timeout,
        ));
        let client = NoteClient::new(requests.clone());
        let auth_cache = AuthCache::new(store.clone());
        let notes = NoteCache::new(store.clone());
        let events = EventBus::new();
        let reporter = ErrorReporter::new(auth_cache.clone(), events.clone());
        let settings = SettingsSync::new(
            store.clone(),
            client.clone(),
            reporter.clone(),
            config.device,
        );
        let sequencer = BootstrapSequencer::new(
            client.clone(),
            auth_cache.clone(),
            events.clone(),
            LoadingTimings::default(),
            config.request_timeout,
        );

        Self {
            requests,
            client,
            auth_cache,
            notes,
            credentials: CredentialJar::new(store),
            events,
            reporter,
            settings,
            sequencer,
            autosave_timings: AutosaveTimings::default(),
            editor: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn with_autosave_timings(mut self, timings: AutosaveTimings) -> Self {
        self.autosave_timings = timings;
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub const fn settings(&self) -> &SettingsSync {
        &self.settings
    }

    pub const fn requests(&self) -> &Arc<RequestManager> {
        &self.requests
    }

    pub const fn auth_cache(&self) -> &AuthCache {
        &self.auth_cache
    }

    pub const fn note_cache(&self) -> &NoteCache {
        &self.notes
    }

    /// Cold start: resolve auth, then load settings and open `path`.
    pub async fn bootstrap(&self, path: NotePath) -> Result<BootstrapOutcome> {
        self.sequencer.run(|| self.initialize(path)).await
    }

    /// Resolve auth like [`Self::bootstrap`] without loading settings or
    /// opening a note, for one-off requests.
    pub async fn resolve_auth(&self) -> Result<BootstrapOutcome> {
        self.sequencer.run(|| async { Ok(()) }).await
    }

    /// Log in and open `path`.
    pub async fn login(&self, password: &str, path: NotePath) -> Result<()> {
        self.sequencer
            .login(password, || self.initialize(path))
            .await
    }

    async fn initialize(&self, path: NotePath) -> Result<()> {
        self.settings.load().await;
        self.open_note(path).await.map(|_| ())
    }

    /// End the session on the server and forget every local trace of it.
    pub async fn logout(&self) {
        self.close_note().await;
        if let Err(error) = self.client.logout().await {
            tracing::warn!("Logout request failed: {}", error);
        }
        self.auth_cache.clear();
        self.settings.clear_local();
        self.credentials.clear();
        self.sequencer.abort();
        self.requests.abort_all();
        tracing::info!("Logged out");
    }

    /// Open `path`, closing (and flushing) the current note first.
    ///
    /// A cached copy is shown right away and reconciled with the server in
    /// the background. Without one, the server copy is loaded in the
    /// foreground; if that times out or the server is unreachable the note
    /// opens empty, an error notification is raised, and autosave holds
    /// until a background retry has read the server copy.
    pub async fn open_note(&self, path: NotePath) -> Result<OpenedNote> {
        let mut editor = self.editor.lock().await;
        if let Some(previous) = editor.take() {
            previous.close().await;
        }

        if let Some(cached) = self.notes.get(&path) {
            tracing::debug!(path = %path, synced = cached.synced, "Serving note from cache");
            let baseline = if cached.synced {
                Baseline::Saved(cached.content.clone())
            } else {
                Baseline::Unconfirmed
            };
            let engine = self.start_engine(&path, cached.content.clone(), baseline);
            let task = self.spawn_reconcile(&engine, cached.content.clone(), cached.synced);
            engine.attach_reconcile(task);
            *editor = Some(engine);
            return Ok(OpenedNote {
                path,
                content: cached.content,
                source: NoteSource::Cache,
            });
        }

        match self.client.load_note(&path).await {
            Ok(loaded) => {
                self.notes.put(&path, &loaded.content, true);
                let content = loaded.content;
                *editor = Some(self.start_engine(
                    &path,
                    content.clone(),
                    Baseline::Saved(content.clone()),
                ));
                Ok(OpenedNote {
                    path,
                    content,
                    source: NoteSource::Server,
                })
            }
            Err(error @ (Error::Cancelled(_) | Error::Network(_))) => {
                self.reporter.foreground("Failed to load note", &error);
                let engine = self.start_engine(&path, String::new(), Baseline::Unknown);
                engine.attach_reconcile(self.spawn_deferred_load(&engine));
                *editor = Some(engine);
                Ok(OpenedNote {
                    path,
                    content: String::new(),
                    source: NoteSource::Unavailable,
                })
            }
            Err(error) => {
                self.reporter.foreground("Failed to load note", &error);
                Err(error)
            }
        }
    }

    /// Open the note `offset` days away from the current date note.
    pub async fn navigate_day(&self, offset: i64) -> Result<OpenedNote> {
        let current = self.current_path().await.unwrap_or_else(NotePath::today);
        self.open_note(current.shift_days(offset)?).await
    }

    pub async fn current_path(&self) -> Option<NotePath> {
        self.editor
            .lock()
            .await
            .as_ref()
            .map(|engine| engine.path().clone())
    }

    pub async fn content(&self) -> Option<String> {
        self.editor.lock().await.as_ref().map(AutosaveEngine::content)
    }

    pub async fn save_state(&self) -> Option<SaveState> {
        self.editor.lock().await.as_ref().map(AutosaveEngine::state)
    }

    /// Record an edit of the open note.
    pub async fn edit(&self, content: impl Into<String>) -> Result<()> {
        let editor = self.editor.lock().await;
        let engine = editor.as_ref().ok_or_else(no_open_note)?;
        engine.edit(content);
        Ok(())
    }

    /// Manual save with a history snapshot.
    pub async fn save_now(&self) -> Result<SaveState> {
        let editor = self.editor.lock().await;
        let engine = editor.as_ref().ok_or_else(no_open_note)?;
        Ok(engine.save_now().await)
    }

    /// Flush pending saves of the open note and close it.
    pub async fn close_note(&self) -> Option<SaveState> {
        let engine = self.editor.lock().await.take()?;
        Some(engine.close().await)
    }

    pub async fn list_notes(&self) -> Result<Vec<NoteSummary>> {
        self.observe(self.client.list_notes().await)
    }

    /// Delete a note and its history, dropping it from the cache.
    pub async fn delete_note(&self, path: &NotePath) -> Result<()> {
        let mut editor = self.editor.lock().await;
        let was_open = editor.as_ref().is_some_and(|engine| engine.path() == path);
        if was_open {
            if let Some(engine) = editor.take() {
                engine.discard();
            }
        }
        drop(editor);

        let result = self.observe(self.client.delete_note(path).await);
        self.notes.remove(path);
        result?;
        tracing::info!(path = %path, "Deleted note");

        if was_open {
            self.open_note(path.clone()).await?;
        }
        Ok(())
    }

    pub async fn list_history(&self, path: &NotePath) -> Result<Vec<HistorySnapshot>> {
        self.observe(self.client.list_history(path).await)
    }

    pub async fn view_history(&self, path: &NotePath, timestamp: i64) -> Result<String> {
        self.observe(self.client.get_history(path, timestamp).await)
    }

    pub async fn delete_history(&self, path: &NotePath, timestamp: i64) -> Result<()> {
        self.observe(self.client.delete_history(path, timestamp).await)
    }

    pub async fn delete_all_history(&self, path: &NotePath) -> Result<()> {
        self.observe(self.client.delete_all_history(path).await)
    }

    /// Load a snapshot of the open note into the editor and save it.
    pub async fn restore_history(&self, timestamp: i64) -> Result<SaveState> {
        let editor = self.editor.lock().await;
        let engine = editor.as_ref().ok_or_else(no_open_note)?;
        let content = self.observe(self.client.get_history(engine.path(), timestamp).await)?;
        engine.edit(content);
        Ok(engine.save_now().await)
    }

    /// Flush pending work and cancel everything still in flight.
    pub async fn teardown(&self) {
        self.close_note().await;
        self.settings.flush().await;
        self.sequencer.abort();
        self.requests.abort_all();
    }

    fn start_engine(&self, path: &NotePath, content: String, baseline: Baseline) -> AutosaveEngine {
        AutosaveEngine::start(
            EngineContext {
                client: self.client.clone(),
                cache: self.notes.clone(),
                reporter: self.reporter.clone(),
            },
            path.clone(),
            content,
            baseline,
            self.autosave_timings,
        )
    }

    fn spawn_reconcile(
        &self,
        engine: &AutosaveEngine,
        shown: String,
        synced: bool,
    ) -> JoinHandle<()> {
        let client = self.client.clone();
        let cache = self.notes.clone();
        let reporter = self.reporter.clone();
        let handle = engine.handle();
        let path = engine.path().clone();

        tokio::spawn(async move {
            let server = match client.load_note(&path).await {
                Ok(loaded) => loaded.content,
                Err(error) => {
                    reporter.background("Background note refresh failed", &error);
                    return;
                }
            };
            if synced {
                if server != shown {
                    tracing::info!(path = %path, "Server copy differs from cache, replacing");
                    handle.replace_from_server(&shown, &server);
                }
            } else if server == shown {
                cache.put(&path, &server, true);
                handle.set_baseline(&server);
            } else {
                tracing::info!(path = %path, "Retrying unsynced local changes");
                handle.set_baseline(&server);
            }
        })
    }

    /// Retry reading the server copy of a note that opened empty. An
    /// untouched editor takes the server copy; typed content stays local
    /// and unsynced until the user saves it.
    fn spawn_deferred_load(&self, engine: &AutosaveEngine) -> JoinHandle<()> {
        let client = self.client.clone();
        let cache = self.notes.clone();
        let reporter = self.reporter.clone();
        let handle = engine.handle();
        let path = engine.path().clone();

        tokio::spawn(async move {
            let server = loop {
                tokio::time::sleep(DEFERRED_LOAD_RETRY).await;
                match client.load_note(&path).await {
                    Ok(loaded) => break loaded.content,
                    Err(error @ (Error::Cancelled(_) | Error::Network(_))) => {
                        tracing::debug!(path = %path, "Server copy still unavailable: {}", error);
                    }
                    Err(error) => {
                        reporter.background("Loading the server copy failed", &error);
                        return;
                    }
                }
            };

            if server.is_empty() {
                handle.set_baseline(&server);
            } else if handle.replace_if_untouched("", &server) {
                tracing::info!(path = %path, "Loaded server copy after a failed open");
            } else {
                cache.put(&path, &handle.content(), false);
                reporter.events().error(format!(
                    "{path} has newer content on the server; save to replace it with your edits"
                ));
            }
        })
    }

    fn observe<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(Error::AuthInvalid) = &result {
            self.auth_cache.clear();
            self.events.emit(SessionEvent::ReauthRequired);
        }
        result
    }
}

fn no_open_note() -> Error {
    Error::Validation("no note is open".to_string())
}
