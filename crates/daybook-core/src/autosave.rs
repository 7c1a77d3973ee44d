//! Autosave and reconciliation for the open note.
//!
//! Every save for a note runs on one debounce worker, so writes are strictly
//! serialized: the debounced edit path, manual saves and the periodic
//! history snapshot all queue behind each other.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::cache::NoteCache;
use crate::client::NoteClient;
use crate::debounce::Debouncer;
use crate::events::{ErrorReporter, SessionEvent};
use crate::models::NotePath;

/// Save status of the open note.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveState {
    Clean,
    Dirty,
    Saving,
    SaveFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutosaveTimings {
    /// Quiet window after the last edit before saving
    pub debounce: Duration,
    /// Interval of forced history snapshots while content is unsaved
    pub snapshot_interval: Duration,
}

impl Default for AutosaveTimings {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(1000),
            snapshot_interval: Duration::from_secs(5 * 60),
        }
    }
}

/// What the engine knows about the server copy of the note.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Baseline {
    /// The content last confirmed on the server
    Saved(String),
    /// Local content that never reached the server; autosave pushes it
    Unconfirmed,
    /// The server copy has not been read yet; only manual saves are sent
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct SaveRequest {
    content: String,
    manual: bool,
    create_history: bool,
}

/// Collaborators shared by every engine of a session.
#[derive(Clone)]
pub struct EngineContext {
    pub client: NoteClient,
    pub cache: NoteCache,
    pub reporter: ErrorReporter,
}

struct Shared {
    path: NotePath,
    context: EngineContext,
    content: Mutex<String>,
    baseline: Mutex<Baseline>,
    state: watch::Sender<SaveState>,
}

impl Shared {
    async fn perform_save(&self, request: SaveRequest) {
        let baseline = lock(&self.baseline).clone();
        match baseline {
            Baseline::Saved(saved) if !request.manual && request.content == saved => {
                tracing::trace!(path = %self.path, "Skipping save of unchanged content");
                self.settle_state();
                return;
            }
            Baseline::Unknown if !request.manual => {
                tracing::debug!(path = %self.path, "Holding save until the server copy is read");
                if !request.content.is_empty() {
                    self.context.cache.put(&self.path, &request.content, false);
                }
                self.settle_state();
                return;
            }
            _ => {}
        }

        self.state.send_replace(SaveState::Saving);
        let result = self
            .context
            .client
            .save_note(&self.path, &request.content, request.create_history)
            .await;

        match result {
            Ok(()) => {
                *lock(&self.baseline) = Baseline::Saved(request.content.clone());
                self.context.cache.put(&self.path, &request.content, true);
                self.settle_state();
                if request.manual {
                    self.context.reporter.events().info("Saved");
                }
            }
            Err(error) => {
                self.state.send_replace(SaveState::SaveFailed);
                let current = lock(&self.content).clone();
                self.context.cache.put(&self.path, &current, false);
                self.context.reporter.foreground("Failed to save note", &error);
            }
        }
    }

    /// Clean when the editor matches the last save, Dirty otherwise.
    fn settle_state(&self) {
        let dirty = self.is_dirty();
        self.state
            .send_replace(if dirty { SaveState::Dirty } else { SaveState::Clean });
    }

    /// Whether the editor holds content the server has not confirmed.
    fn is_dirty(&self) -> bool {
        let baseline = lock(&self.baseline).clone();
        let content = lock(&self.content);
        match baseline {
            Baseline::Saved(saved) => *content != saved,
            Baseline::Unconfirmed => true,
            Baseline::Unknown => !content.is_empty(),
        }
    }
}

/// Autosave engine for one open note.
pub struct AutosaveEngine {
    shared: Arc<Shared>,
    saver: Debouncer<SaveRequest>,
    periodic: JoinHandle<()>,
    reconcile: Mutex<Option<JoinHandle<()>>>,
}

impl AutosaveEngine {
    /// Start editing `path` showing `content`, with `baseline` describing
    /// what the server is known to hold.
    pub fn start(
        context: EngineContext,
        path: NotePath,
        content: String,
        baseline: Baseline,
        timings: AutosaveTimings,
    ) -> Self {
        let (state, _) = watch::channel(SaveState::Clean);
        let shared = Arc::new(Shared {
            path,
            context,
            content: Mutex::new(content),
            baseline: Mutex::new(baseline),
            state,
        });
        shared.settle_state();
        let initial = *shared.state.borrow();

        let saver = Debouncer::spawn(timings.debounce, {
            let shared = shared.clone();
            move |request: SaveRequest| {
                let shared = shared.clone();
                async move { shared.perform_save(request).await }
            }
        });

        let periodic = tokio::spawn(run_snapshots(
            shared.clone(),
            saver.clone(),
            timings.snapshot_interval,
        ));

        let engine = Self {
            shared,
            saver,
            periodic,
            reconcile: Mutex::new(None),
        };
        if initial == SaveState::Dirty {
            engine.schedule(engine.content());
        }
        engine
    }

    pub fn path(&self) -> &NotePath {
        &self.shared.path
    }

    pub fn content(&self) -> String {
        lock(&self.shared.content).clone()
    }

    /// Content last confirmed on the server, when known.
    pub fn last_saved(&self) -> Option<String> {
        match &*lock(&self.shared.baseline) {
            Baseline::Saved(saved) => Some(saved.clone()),
            Baseline::Unconfirmed | Baseline::Unknown => None,
        }
    }

    pub fn state(&self) -> SaveState {
        *self.shared.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SaveState> {
        self.shared.state.subscribe()
    }

    /// Record an edit and schedule a debounced save.
    pub fn edit(&self, content: impl Into<String>) {
        let content = content.into();
        lock(&self.shared.content).clone_from(&content);
        if self.state() != SaveState::Saving {
            self.shared.settle_state();
        }
        self.schedule(content);
    }

    /// Save now with a history snapshot, skipping the debounce window.
    pub async fn save_now(&self) -> SaveState {
        let request = SaveRequest {
            content: self.content(),
            manual: true,
            create_history: true,
        };
        self.saver.call_now(request).await;
        self.state()
    }

    /// Run any pending debounced save.
    pub async fn flush(&self) {
        self.saver.flush().await;
    }

    /// Handle used by background reconciliation.
    pub fn handle(&self) -> EngineHandle {
        EngineHandle {
            shared: self.shared.clone(),
            saver: self.saver.clone(),
        }
    }

    /// Track the reconciliation task so closing the note stops it.
    pub fn attach_reconcile(&self, task: JoinHandle<()>) {
        if let Some(previous) = lock(&self.reconcile).replace(task) {
            previous.abort();
        }
    }

    /// Flush pending work and stop the timers.
    pub async fn close(self) -> SaveState {
        if let Some(task) = lock(&self.reconcile).take() {
            task.abort();
        }
        self.periodic.abort();
        self.saver.flush().await;
        self.state()
    }

    /// Stop without saving pending content, e.g. after the note was deleted.
    pub fn discard(self) {
        self.saver.cancel();
    }

    fn schedule(&self, content: String) {
        self.saver.call(SaveRequest {
            content,
            manual: false,
            create_history: false,
        });
    }
}

impl Drop for AutosaveEngine {
    fn drop(&mut self) {
        self.periodic.abort();
        if let Some(task) = lock(&self.reconcile).take() {
            task.abort();
        }
    }
}

/// Cloneable view of an engine for reconciling with the server copy.
#[derive(Clone)]
pub struct EngineHandle {
    shared: Arc<Shared>,
    saver: Debouncer<SaveRequest>,
}

impl EngineHandle {
    pub fn content(&self) -> String {
        lock(&self.shared.content).clone()
    }

    /// Replace the editor content with the server copy, unless the user has
    /// typed since `shown` was displayed. Typed content is then retried
    /// against the server copy. Returns whether it replaced.
    pub fn replace_from_server(&self, shown: &str, server: &str) -> bool {
        let replaced = self.replace_if_untouched(shown, server);
        if !replaced {
            self.set_baseline(server);
        }
        replaced
    }

    /// Like [`Self::replace_from_server`], but leaves typed content and the
    /// baseline alone.
    pub fn replace_if_untouched(&self, shown: &str, server: &str) -> bool {
        {
            let mut content = lock(&self.shared.content);
            if *content != shown {
                return false;
            }
            server.clone_into(&mut content);
        }
        *lock(&self.shared.baseline) = Baseline::Saved(server.to_string());
        self.shared.context.cache.put(&self.shared.path, server, true);
        self.shared.settle_state();
        self.shared.context.reporter.events().emit(SessionEvent::NoteReplaced {
            path: self.shared.path.to_string(),
            content: server.to_string(),
        });
        true
    }

    /// Adopt `server` as the last saved content; unsaved editor content is
    /// then retried by autosave.
    pub fn set_baseline(&self, server: &str) {
        *lock(&self.shared.baseline) = Baseline::Saved(server.to_string());
        self.shared.settle_state();
        if self.shared.is_dirty() {
            self.saver.call(SaveRequest {
                content: lock(&self.shared.content).clone(),
                manual: false,
                create_history: false,
            });
        }
    }
}

async fn run_snapshots(shared: Arc<Shared>, saver: Debouncer<SaveRequest>, every: Duration) {
    let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + every, every);
    loop {
        interval.tick().await;
        if shared.is_dirty() {
            tracing::debug!(path = %shared.path, "Taking periodic history snapshot");
            let content = lock(&shared.content).clone();
            saver
                .call_now(SaveRequest {
                    content,
                    manual: false,
                    create_history: true,
                })
                .await;
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
