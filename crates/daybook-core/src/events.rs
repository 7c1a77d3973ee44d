//! Session events and error reporting.
//!
//! Front-ends subscribe to [`EventBus`] to render notifications, the loading
//! indicator and login prompts. Nothing in the core blocks on a subscriber.

use tokio::sync::broadcast;

use crate::cache::AuthCache;
use crate::error::Error;

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
}

/// Loading indicator visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadingState {
    Hidden,
    Visible,
    FadingOut,
}

/// Steps of session bootstrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapPhase {
    Init,
    CacheCheck,
    FastPath,
    NetworkCheck,
    EditorReady,
    LoginPrompt,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Notification(Notification),
    Loading(LoadingState),
    Bootstrap(BootstrapPhase),
    /// The server copy replaced what the editor showed.
    NoteReplaced { path: String, content: String },
    /// The credential is no longer valid; the front-end should show the login prompt.
    ReauthRequired,
}

#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SessionEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: SessionEvent) {
        // no subscribers is fine
        let _ = self.sender.send(event);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.emit(SessionEvent::Notification(Notification {
            level: NotificationLevel::Info,
            message: message.into(),
        }));
    }

    pub fn error(&self, message: impl Into<String>) {
        self.emit(SessionEvent::Notification(Notification {
            level: NotificationLevel::Error,
            message: message.into(),
        }));
    }
}

/// Applies the error propagation rules shared by every component.
#[derive(Clone)]
pub struct ErrorReporter {
    auth_cache: AuthCache,
    events: EventBus,
}

impl ErrorReporter {
    pub fn new(auth_cache: AuthCache, events: EventBus) -> Self {
        Self { auth_cache, events }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Report a failure of a user-visible operation.
    pub fn foreground(&self, context: &str, error: &Error) {
        if self.handle_common(context, error) {
            return;
        }
        tracing::error!("{}: {}", context, error);
        self.events.error(format!("{context}: {error}"));
    }

    /// Report a failure of a best-effort background operation.
    pub fn background(&self, context: &str, error: &Error) {
        if self.handle_common(context, error) {
            return;
        }
        tracing::warn!("{}: {}", context, error);
    }

    /// Auth and cancellation handling; returns true when fully handled.
    fn handle_common(&self, context: &str, error: &Error) -> bool {
        match error {
            Error::AuthInvalid => {
                tracing::warn!("{}: session is no longer valid", context);
                self.auth_cache.clear();
                self.events.emit(SessionEvent::ReauthRequired);
                true
            }
            Error::Cancelled(cause) if !error.is_timeout() => {
                tracing::debug!("{}: {}", context, cause);
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CancelCause;
    use crate::store::MemoryStore;

    fn reporter() -> (AuthCache, EventBus, ErrorReporter) {
        let cache = AuthCache::new(MemoryStore::shared());
        let events = EventBus::new();
        let reporter = ErrorReporter::new(cache.clone(), events.clone());
        (cache, events, reporter)
    }

    #[tokio::test]
    async fn auth_failures_clear_cache_and_request_login() {
        let (cache, events, reporter) = reporter();
        let mut receiver = events.subscribe();
        cache.write(true);

        reporter.background("Settings push failed", &Error::AuthInvalid);

        assert_eq!(cache.read(), None);
        assert_eq!(receiver.recv().await.unwrap(), SessionEvent::ReauthRequired);
    }

    #[tokio::test]
    async fn superseded_requests_are_only_logged() {
        let (_, events, reporter) = reporter();
        let mut receiver = events.subscribe();

        reporter.foreground("Load failed", &Error::Cancelled(CancelCause::Superseded));
        assert!(receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn foreground_errors_notify() {
        let (_, events, reporter) = reporter();
        let mut receiver = events.subscribe();

        reporter.foreground("Save failed", &Error::Network("offline".to_string()));
        let SessionEvent::Notification(notification) = receiver.recv().await.unwrap() else {
            panic!("expected a notification");
        };
        assert_eq!(notification.level, NotificationLevel::Error);
        assert!(notification.message.starts_with("Save failed"));
    }
}
