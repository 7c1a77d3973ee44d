//! daybook-core - client-side editing pipeline for Daybook
//!
//! This crate holds everything a front-end needs to edit date-keyed notes
//! against the Daybook API: the local store and caches, request lifecycle
//! management, settings synchronization, debounced autosave with
//! reconciliation, and the cold-start bootstrap sequence. [`EditorSession`]
//! ties them together.

pub mod autosave;
pub mod bootstrap;
pub mod cache;
pub mod client;
pub mod config;
pub mod debounce;
pub mod error;
pub mod events;
pub mod models;
pub mod request;
pub mod session;
pub mod settings;
pub mod store;
pub mod transport;
pub mod util;

#[cfg(test)]
mod test_support;

pub use autosave::{AutosaveTimings, Baseline, SaveState};
pub use bootstrap::{BootstrapOutcome, LoginReason, ReadyVia};
pub use config::{ClientConfig, ConfigError};
pub use error::{CancelCause, Error, Result, StoreError};
pub use events::{LoadingState, Notification, NotificationLevel, SessionEvent};
pub use models::{DeviceClass, EditorSettings, HistorySnapshot, NotePath, NoteSummary};
pub use session::{EditorSession, NoteSource, OpenedNote};
pub use store::{FileStore, KeyValueStore, MemoryStore, SharedStore};
