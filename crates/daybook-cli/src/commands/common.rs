use std::env;
use std::io::{self, BufRead, IsTerminal, Read, Write};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{Local, TimeZone, Utc};
use daybook_core::events::BootstrapPhase;
use daybook_core::{
    BootstrapOutcome, ClientConfig, EditorSession, FileStore, HistorySnapshot, LoginReason,
    NotePath, NoteSummary, NotificationLevel, SessionEvent,
};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::cli::NoteArgs;
use crate::error::CliError;

/// Everything a command needs to build a session.
#[derive(Debug, Clone)]
pub struct Context {
    pub config: ClientConfig,
    pub store_path: PathBuf,
}

impl Context {
    pub fn resolve(
        cli_store_path: Option<PathBuf>,
        cli_server: Option<String>,
    ) -> Result<Self, CliError> {
        let mut config = ClientConfig::from_env()?;
        if let Some(server) = cli_server {
            config.server_url = server.trim().trim_end_matches('/').to_string();
        }
        let store_path = resolve_store_path(cli_store_path, config.store_path.clone());
        Ok(Self { config, store_path })
    }

    pub fn open_session(&self) -> Result<EditorSession, CliError> {
        let store = Arc::new(FileStore::open(&self.store_path)?);
        Ok(EditorSession::connect(&self.config, store)?)
    }

    /// Session with `path` open, or an error when login is required.
    pub async fn ready_session(&self, path: NotePath) -> Result<EditorSession, CliError> {
        let session = self.open_session()?;
        let outcome = session.bootstrap(path).await;
        require_ready(session, outcome).await
    }

    /// Logged-in session with no note open, for commands that only make
    /// one-off requests.
    pub async fn authed_session(&self) -> Result<EditorSession, CliError> {
        let session = self.open_session()?;
        let outcome = session.resolve_auth().await;
        require_ready(session, outcome).await
    }
}

async fn require_ready(
    session: EditorSession,
    outcome: daybook_core::Result<BootstrapOutcome>,
) -> Result<EditorSession, CliError> {
    match outcome {
        Ok(BootstrapOutcome::EditorReady { via }) => {
            tracing::debug!(?via, "Session ready");
            Ok(session)
        }
        Ok(BootstrapOutcome::LoginPrompt { reason }) => {
            session.teardown().await;
            Err(CliError::NotLoggedIn(login_reason_label(reason)))
        }
        Err(error) => {
            session.teardown().await;
            Err(error.into())
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteListItem {
    pub path: String,
    pub date: Option<String>,
    pub last_modified: String,
    pub relative_time: String,
    pub size: u64,
}

pub fn resolve_note_path(args: &NoteArgs) -> Result<NotePath, CliError> {
    let base = match args.path.as_deref().map(str::trim) {
        Some(raw) if !raw.is_empty() => NotePath::from_user_input(raw)?,
        _ => NotePath::today(),
    };
    match args.days {
        Some(offset) if offset != 0 => Ok(base.shift_days(offset)?),
        _ => Ok(base),
    }
}

pub const fn login_reason_label(reason: LoginReason) -> &'static str {
    match reason {
        LoginReason::CachedDenied => "the last login check was rejected",
        LoginReason::Unauthenticated => "no valid session",
        LoginReason::Unreachable => "the server could not be reached",
    }
}

/// Prints notifications to stderr while a command runs.
pub fn spawn_event_printer(
    mut events: broadcast::Receiver<SessionEvent>,
    verbose: bool,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(SessionEvent::Notification(notification)) => match notification.level {
                    NotificationLevel::Error => eprintln!("! {}", notification.message),
                    NotificationLevel::Info if verbose => eprintln!("{}", notification.message),
                    NotificationLevel::Info => {}
                },
                Ok(SessionEvent::ReauthRequired) => {
                    eprintln!("! Session expired. Run `daybook login` again.");
                }
                Ok(SessionEvent::NoteReplaced { path, .. }) if verbose => {
                    eprintln!("Newer copy of {path} loaded from the server");
                }
                Ok(SessionEvent::Bootstrap(BootstrapPhase::FastPath)) if verbose => {
                    eprintln!("Using cached login");
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "Event printer lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

pub fn format_note_lines(notes: &[NoteSummary]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    notes
        .iter()
        .map(|note| {
            let label = display_label(&note.path);
            let relative_time =
                format_relative_time(note.last_modified.timestamp_millis(), now_ms);
            format!(
                "{label:<20}  {size:>8}  {relative_time}",
                size = format_size(note.size)
            )
        })
        .collect()
}

pub fn note_to_list_item(note: &NoteSummary) -> NoteListItem {
    let now_ms = Utc::now().timestamp_millis();
    NoteListItem {
        path: note.path.clone(),
        date: NotePath::parse(&note.path)
            .ok()
            .and_then(|path| path.date())
            .map(|date| date.format("%Y-%m-%d").to_string()),
        last_modified: note.last_modified.to_rfc3339(),
        relative_time: format_relative_time(note.last_modified.timestamp_millis(), now_ms),
        size: note.size,
    }
}

pub fn format_history_lines(snapshots: &[HistorySnapshot]) -> Vec<String> {
    snapshots
        .iter()
        .map(|snapshot| {
            format!(
                "{:<13}  {:<19}  {}",
                snapshot.timestamp,
                format_snapshot_time(snapshot.timestamp),
                content_preview(&snapshot.content, 40)
            )
        })
        .collect()
}

pub fn format_snapshot_time(timestamp_ms: i64) -> String {
    Local
        .timestamp_millis_opt(timestamp_ms)
        .single()
        .map_or_else(|| timestamp_ms.to_string(), |at| at.format("%Y-%m-%d %H:%M:%S").to_string())
}

fn display_label(path: &str) -> String {
    NotePath::parse(path).map_or_else(|_| path.to_string(), |path| path.display_label())
}

pub fn content_preview(content: &str, max_chars: usize) -> String {
    let first_line = content
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("");
    let collapsed = first_line.split_whitespace().collect::<Vec<_>>().join(" ");

    if collapsed.chars().count() <= max_chars {
        collapsed
    } else {
        let take_len = max_chars.saturating_sub(3);
        let mut truncated = collapsed.chars().take(take_len).collect::<String>();
        truncated.push_str("...");
        truncated
    }
}

#[allow(clippy::cast_precision_loss)]
pub fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < month {
        format!("{}w ago", diff / week)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}

/// `current` with `addition` on a new line.
pub fn append_line(current: &str, addition: &str) -> String {
    if current.is_empty() {
        addition.to_string()
    } else if current.ends_with('\n') {
        format!("{current}{addition}")
    } else {
        format!("{current}\n{addition}")
    }
}

pub fn resolve_appended_content(content_parts: &[String]) -> Result<String, CliError> {
    if let Some(content) = normalize_content(&content_parts.join(" ")) {
        return Ok(content);
    }

    if let Some(content) = read_piped_stdin()? {
        return Ok(content);
    }

    Err(CliError::EmptyContent)
}

pub fn normalize_content(content: &str) -> Option<String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub fn read_piped_stdin() -> Result<Option<String>, CliError> {
    let stdin = io::stdin();
    if stdin.is_terminal() {
        return Ok(None);
    }

    let mut buffer = String::new();
    stdin.lock().read_to_string(&mut buffer)?;
    Ok(normalize_content(&buffer))
}

pub fn read_password(provided: Option<String>) -> Result<String, CliError> {
    let password = if let Some(password) = provided {
        password
    } else {
        let stdin = io::stdin();
        if stdin.is_terminal() {
            eprint!("Password: ");
            io::stderr().flush()?;
        }
        let mut line = String::new();
        stdin.lock().read_line(&mut line)?;
        line
    };

    let password = password.trim_end_matches(['\r', '\n']).to_string();
    if password.is_empty() {
        Err(CliError::EmptyPassword)
    } else {
        Ok(password)
    }
}

/// Open `initial_content` in the user's editor and return the result verbatim.
pub fn capture_editor_input_with_initial(initial_content: &str) -> Result<String, CliError> {
    let editor = preferred_editor();
    let temp_file = create_temp_note_file_path();
    std::fs::write(&temp_file, initial_content)?;

    let launch_result = launch_editor(&editor, &temp_file);
    let note_content = std::fs::read_to_string(&temp_file)?;
    let _ = std::fs::remove_file(&temp_file);

    launch_result?;
    Ok(note_content)
}

pub fn launch_editor(editor: &str, file_path: &Path) -> Result<(), CliError> {
    match Command::new(editor).arg(file_path).status() {
        Ok(status) => {
            if status.success() {
                Ok(())
            } else {
                Err(CliError::EditorFailed(format!(
                    "`{editor}` exited with status {status}"
                )))
            }
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            // Fallback for editor commands with args, e.g. "code --wait"
            let mut parts = editor.split_whitespace();
            let Some(program) = parts.next() else {
                return Err(CliError::EditorFailed("empty EDITOR command".into()));
            };

            let mut command = Command::new(program);
            command.args(parts).arg(file_path);

            let status = command.status()?;
            if status.success() {
                Ok(())
            } else {
                Err(CliError::EditorFailed(format!(
                    "`{editor}` exited with status {status}"
                )))
            }
        }
        Err(err) => Err(CliError::Io(err)),
    }
}

pub fn preferred_editor() -> String {
    env::var("VISUAL")
        .or_else(|_| env::var("EDITOR"))
        .unwrap_or_else(|_| default_editor().to_string())
}

pub const fn default_editor() -> &'static str {
    if cfg!(windows) {
        "notepad"
    } else {
        "vi"
    }
}

pub fn create_temp_note_file_path() -> PathBuf {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_nanos());
    env::temp_dir().join(format!("daybook-note-{}-{now}.md", std::process::id()))
}

pub fn resolve_store_path(
    cli_store_path: Option<PathBuf>,
    env_store_path: Option<PathBuf>,
) -> PathBuf {
    cli_store_path
        .or(env_store_path)
        .unwrap_or_else(default_store_path)
}

pub fn default_store_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("daybook")
        .join("local-store.json")
}
