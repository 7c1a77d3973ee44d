//! Cold-start sequencing.
//!
//! `Init -> CacheCheck -> {FastPath | NetworkCheck} -> {EditorReady | LoginPrompt}`
//!
//! A cached positive verdict opens the editor without waiting for the
//! network and re-verifies in the background. Editor initialization drives
//! the loading indicator through [`SessionEvent::Loading`].

use std::future::Future;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::cache::AuthCache;
use crate::client::NoteClient;
use crate::error::{Error, Result};
use crate::events::{BootstrapPhase, EventBus, LoadingState, SessionEvent};

/// Loading indicator timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadingTimings {
    /// Show the indicator only when initialization takes longer than this
    pub show_after: Duration,
    /// Initialization finishing within this hides without fading
    pub fast_cutoff: Duration,
    pub fade: Duration,
}

impl Default for LoadingTimings {
    fn default() -> Self {
        Self {
            show_after: Duration::from_millis(800),
            fast_cutoff: Duration::from_millis(50),
            fade: Duration::from_millis(300),
        }
    }
}

/// How the editor came to be opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyVia {
    /// Cached verdict, verified in the background
    Cache,
    Network,
    /// Auth check timed out but a cached verdict was found
    FallbackCache,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginReason {
    /// The cache holds a negative verdict
    CachedDenied,
    /// The server rejected the credential
    Unauthenticated,
    /// The server could not be asked
    Unreachable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapOutcome {
    EditorReady { via: ReadyVia },
    LoginPrompt { reason: LoginReason },
}

pub struct BootstrapSequencer {
    client: NoteClient,
    auth_cache: AuthCache,
    events: EventBus,
    timings: LoadingTimings,
    auth_timeout: Duration,
    verification: Mutex<Option<JoinHandle<()>>>,
}

impl BootstrapSequencer {
    pub fn new(
        client: NoteClient,
        auth_cache: AuthCache,
        events: EventBus,
        timings: LoadingTimings,
        auth_timeout: Duration,
    ) -> Self {
        Self {
            client,
            auth_cache,
            events,
            timings,
            auth_timeout,
            verification: Mutex::new(None),
        }
    }

    /// Run the cold-start sequence. `initialize` opens the editor.
    pub async fn run<F, Fut>(&self, initialize: F) -> Result<BootstrapOutcome>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        self.phase(BootstrapPhase::Init);
        self.phase(BootstrapPhase::CacheCheck);

        match self.auth_cache.read() {
            Some(true) => {
                self.phase(BootstrapPhase::FastPath);
                let result = self.initialize_editor(initialize).await;
                self.spawn_verification();
                result?;
                Ok(self.ready(ReadyVia::Cache))
            }
            Some(false) => Ok(self.login_prompt(LoginReason::CachedDenied)),
            None => {
                self.phase(BootstrapPhase::NetworkCheck);
                self.network_check(initialize).await
            }
        }
    }

    async fn network_check<F, Fut>(&self, initialize: F) -> Result<BootstrapOutcome>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        match self.client.check_auth_with_timeout(self.auth_timeout).await {
            Ok(true) => {
                self.auth_cache.write(true);
                self.initialize_editor(initialize).await?;
                Ok(self.ready(ReadyVia::Network))
            }
            Ok(false) => {
                self.auth_cache.write(false);
                Ok(self.login_prompt(LoginReason::Unauthenticated))
            }
            Err(error) if error.is_timeout() => {
                tracing::warn!("Auth check timed out, trying cached verdict");
                if self.auth_cache.read() == Some(true) {
                    self.initialize_editor(initialize).await?;
                    Ok(self.ready(ReadyVia::FallbackCache))
                } else {
                    self.auth_cache.clear();
                    Ok(self.login_prompt(LoginReason::Unreachable))
                }
            }
            Err(error) => {
                tracing::warn!("Auth check failed: {}", error);
                self.auth_cache.clear();
                Ok(self.login_prompt(LoginReason::Unreachable))
            }
        }
    }

    /// Exchange the password for a session and open the editor.
    ///
    /// A rejected password fails with [`Error::AuthInvalid`] and leaves the
    /// auth cache untouched.
    pub async fn login<F, Fut>(&self, password: &str, initialize: F) -> Result<()>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        self.client.login(password).await?;
        if !self.client.check_auth().await? {
            return Err(Error::AuthInvalid);
        }
        self.auth_cache.write(true);
        tracing::info!("Logged in");
        self.initialize_editor(initialize).await?;
        self.phase(BootstrapPhase::EditorReady);
        Ok(())
    }

    /// Run `initialize` under the loading indicator contract.
    pub async fn initialize_editor<F, Fut>(&self, initialize: F) -> Result<()>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let started = Instant::now();
        let initialization = initialize();
        tokio::pin!(initialization);

        let early = tokio::select! {
            biased;
            result = &mut initialization => Some(result),
            () = tokio::time::sleep(self.timings.show_after) => None,
        };
        let (result, shown) = match early {
            Some(result) => (result, false),
            None => {
                self.events.emit(SessionEvent::Loading(LoadingState::Visible));
                (initialization.await, true)
            }
        };

        let elapsed = started.elapsed();
        tracing::debug!(elapsed_ms = elapsed.as_millis(), shown, "Editor initialized");

        if result.is_err() || elapsed <= self.timings.fast_cutoff || !shown {
            self.events.emit(SessionEvent::Loading(LoadingState::Hidden));
        } else {
            self.events.emit(SessionEvent::Loading(LoadingState::FadingOut));
            let events = self.events.clone();
            let fade = self.timings.fade;
            tokio::spawn(async move {
                tokio::time::sleep(fade).await;
                events.emit(SessionEvent::Loading(LoadingState::Hidden));
            });
        }
        result
    }

    /// Stop a pending background verification.
    pub fn abort(&self) {
        if let Some(task) = self
            .verification
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
        }
    }

    fn spawn_verification(&self) {
        let client = self.client.clone();
        let auth_cache = self.auth_cache.clone();
        let events = self.events.clone();
        let task = tokio::spawn(async move {
            match client.check_auth().await {
                Ok(true) => {
                    tracing::debug!("Background verification confirmed session");
                    auth_cache.write(true);
                }
                Ok(false) | Err(Error::AuthInvalid) => {
                    tracing::warn!("Background verification rejected cached session");
                    auth_cache.clear();
                    events.emit(SessionEvent::ReauthRequired);
                }
                Err(error @ (Error::Cancelled(_) | Error::Network(_))) => {
                    tracing::debug!("Background verification skipped: {}", error);
                }
                Err(error) => {
                    tracing::warn!("Background verification failed: {}", error);
                    auth_cache.clear();
                    events.emit(SessionEvent::ReauthRequired);
                }
            }
        });

        if let Some(previous) = self
            .verification
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(task)
        {
            previous.abort();
        }
    }

    fn ready(&self, via: ReadyVia) -> BootstrapOutcome {
        self.phase(BootstrapPhase::EditorReady);
        BootstrapOutcome::EditorReady { via }
    }

    fn login_prompt(&self, reason: LoginReason) -> BootstrapOutcome {
        tracing::info!(?reason, "Login required");
        self.phase(BootstrapPhase::LoginPrompt);
        BootstrapOutcome::LoginPrompt { reason }
    }

    fn phase(&self, phase: BootstrapPhase) {
        tracing::debug!(?phase, "Bootstrap phase");
        self.events.emit(SessionEvent::Bootstrap(phase));
    }
}
