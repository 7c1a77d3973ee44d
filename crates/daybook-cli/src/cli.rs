use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "daybook")]
#[command(about = "Date-oriented markdown notes from the command line")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Optional path to the local store file
    #[arg(long, global = true, value_name = "PATH")]
    pub store_path: Option<PathBuf>,

    /// Server URL (overrides DAYBOOK_SERVER_URL)
    #[arg(long, global = true, value_name = "URL")]
    pub server: Option<String>,

    /// Quick append to today's note: daybook "my thought here"
    #[arg(trailing_var_arg = true)]
    pub note: Vec<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Log in and remember the session
    Login {
        /// Password (read from stdin when omitted)
        #[arg(long, value_name = "PASSWORD")]
        password: Option<String>,
    },
    /// End the session and clear local state
    Logout,
    /// Show how the session resolves on start-up
    Status,
    /// Print a note
    Show {
        #[command(flatten)]
        note: NoteArgs,
    },
    /// Edit a note in $VISUAL/$EDITOR
    Edit {
        #[command(flatten)]
        note: NoteArgs,
    },
    /// Replace a note's content
    Write {
        #[command(flatten)]
        note: NoteArgs,
        /// New content (read from stdin when omitted)
        #[arg(long, short)]
        content: Option<String>,
    },
    /// Append a line to a note
    #[command(alias = "add")]
    Append {
        /// Text to append
        content: Vec<String>,
        /// Note path or YYYY-MM-DD date (defaults to today)
        #[arg(long, value_name = "PATH")]
        path: Option<String>,
    },
    /// Type into a note line by line with autosave
    Live {
        #[command(flatten)]
        note: NoteArgs,
    },
    /// List notes, most recently modified first
    List {
        /// Number of notes to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a note and its history
    Delete {
        /// Note path or YYYY-MM-DD date
        path: String,
    },
    /// Browse and restore history snapshots
    History {
        #[command(subcommand)]
        command: HistoryCommands,
    },
    /// Show or change editor settings
    Settings {
        #[command(subcommand)]
        command: Option<SettingsCommands>,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

/// Which note a command works on.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct NoteArgs {
    /// Note path or YYYY-MM-DD date (defaults to today)
    pub path: Option<String>,
    /// Shift the date by this many days, e.g. -1 for the previous day
    #[arg(long, short = 'd', allow_hyphen_values = true, value_name = "DAYS")]
    pub days: Option<i64>,
}

#[derive(Subcommand)]
pub enum HistoryCommands {
    /// List snapshots of a note, newest first
    List {
        #[command(flatten)]
        note: NoteArgs,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print one snapshot
    Show {
        /// Snapshot timestamp (unix ms)
        timestamp: i64,
        #[command(flatten)]
        note: NoteArgs,
    },
    /// Delete one snapshot
    Delete {
        /// Snapshot timestamp (unix ms)
        timestamp: i64,
        #[command(flatten)]
        note: NoteArgs,
    },
    /// Delete every snapshot of a note
    Clear {
        #[command(flatten)]
        note: NoteArgs,
    },
    /// Load a snapshot back into the note and save it
    Restore {
        /// Snapshot timestamp (unix ms)
        timestamp: i64,
        #[command(flatten)]
        note: NoteArgs,
    },
}

#[derive(Subcommand)]
pub enum SettingsCommands {
    /// Print the settings for this device
    Show,
    /// Set one option by its name, e.g. `editorFontSize 16`
    Set { key: String, value: String },
    /// Switch between the light and dark theme
    ToggleTheme,
    /// Set the split between editor and preview, e.g. `40% 60%`
    Split { editor: String, preview: String },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}
