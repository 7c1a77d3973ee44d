use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] daybook_core::Error),
    #[error(transparent)]
    Config(#[from] daybook_core::ConfigError),
    #[error(transparent)]
    Store(#[from] daybook_core::StoreError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("No note content provided")]
    EmptyContent,
    #[error("Password cannot be empty")]
    EmptyPassword,
    #[error("Editor command failed: {0}")]
    EditorFailed(String),
    #[error("Not logged in ({0}). Run `daybook login` first.")]
    NotLoggedIn(&'static str),
    #[error("Save did not reach the server; the note is kept in the local cache")]
    SaveFailed,
}
