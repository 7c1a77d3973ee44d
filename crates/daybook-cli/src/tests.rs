use std::path::PathBuf;
use std::time::Duration;

use chrono::DateTime;
use clap::Parser;
use daybook_core::{ClientConfig, LoginReason, NoteSummary, SaveState};
use pretty_assertions::assert_eq;

use crate::cli::{Cli, Commands, CompletionShell, HistoryCommands, NoteArgs, SettingsCommands};
use crate::commands::common::{
    append_line, content_preview, default_editor, format_note_lines, format_relative_time,
    format_size, login_reason_label, normalize_content, note_to_list_item, read_password,
    resolve_note_path, resolve_store_path, Context,
};
use crate::commands::completions::render_completions;
use crate::commands::live::describe_state;
use crate::error::CliError;

#[test]
fn normalize_content_trims_and_rejects_empty() {
    assert_eq!(normalize_content("  hello  "), Some("hello".to_string()));
    assert_eq!(normalize_content(" \n\t "), None);
}

#[test]
fn normalize_content_keeps_multiline_text() {
    assert_eq!(
        normalize_content("line 1\nline 2\n"),
        Some("line 1\nline 2".to_string())
    );
}

#[test]
fn default_editor_is_defined() {
    assert!(!default_editor().is_empty());
}

#[test]
fn format_relative_time_units() {
    let now = 10_000_000;
    assert_eq!(format_relative_time(now - 30_000, now), "just now");
    assert_eq!(format_relative_time(now - 120_000, now), "2m ago");
    assert_eq!(format_relative_time(now - 2 * 60 * 60_000, now), "2h ago");
}

#[test]
fn content_preview_skips_blank_lines_and_truncates() {
    assert_eq!(content_preview("\n\n  # Title  \nbody", 40), "# Title");
    assert_eq!(
        content_preview("This is a very long sentence that should be shortened", 20),
        "This is a very lo..."
    );
}

#[test]
fn append_line_joins_with_single_newline() {
    assert_eq!(append_line("", "first"), "first");
    assert_eq!(append_line("first", "second"), "first\nsecond");
    assert_eq!(append_line("first\n", "second"), "first\nsecond");
}

#[test]
fn format_size_picks_unit() {
    assert_eq!(format_size(512), "512 B");
    assert_eq!(format_size(2048), "2.0 KB");
    assert_eq!(format_size(3 * 1024 * 1024), "3.0 MB");
}

#[test]
fn note_lines_show_dates_with_dashes() {
    let notes = vec![NoteSummary {
        path: "20240101".to_string(),
        last_modified: DateTime::from_timestamp(1_704_067_200, 0).unwrap(),
        size: 12,
    }];
    let lines = format_note_lines(&notes);
    assert!(lines[0].starts_with("2024-01-01"));
    assert!(lines[0].contains("12 B"));

    let item = note_to_list_item(&notes[0]);
    assert_eq!(item.date.as_deref(), Some("2024-01-01"));
    assert_eq!(item.path, "20240101");
}

#[test]
fn note_path_resolution_accepts_dates_and_offsets() {
    let args = NoteArgs {
        path: Some("2024-03-01".to_string()),
        days: Some(-1),
    };
    assert_eq!(resolve_note_path(&args).unwrap().as_str(), "20240229");

    let named = NoteArgs {
        path: Some("ideas".to_string()),
        days: None,
    };
    assert_eq!(resolve_note_path(&named).unwrap().as_str(), "ideas");

    let shifted_named = NoteArgs {
        path: Some("ideas".to_string()),
        days: Some(1),
    };
    assert!(matches!(
        resolve_note_path(&shifted_named),
        Err(CliError::Core(daybook_core::Error::Validation(_)))
    ));

    assert!(resolve_note_path(&NoteArgs {
        path: Some("../etc".to_string()),
        days: None,
    })
    .is_err());
}

#[test]
fn store_path_prefers_flag_then_env_then_default() {
    let flag = PathBuf::from("/tmp/flag.json");
    let env = PathBuf::from("/tmp/env.json");
    assert_eq!(
        resolve_store_path(Some(flag.clone()), Some(env.clone())),
        flag
    );
    assert_eq!(resolve_store_path(None, Some(env.clone())), env);
    assert!(resolve_store_path(None, None).ends_with("daybook/local-store.json"));
}

#[test]
fn password_strips_line_ending_and_rejects_empty() {
    assert_eq!(
        read_password(Some("secret\r\n".to_string())).unwrap(),
        "secret"
    );
    assert!(matches!(
        read_password(Some("\n".to_string())),
        Err(CliError::EmptyPassword)
    ));
}

#[test]
fn login_reasons_have_distinct_labels() {
    let labels = [
        login_reason_label(LoginReason::CachedDenied),
        login_reason_label(LoginReason::Unauthenticated),
        login_reason_label(LoginReason::Unreachable),
    ];
    assert_ne!(labels[0], labels[1]);
    assert_ne!(labels[1], labels[2]);
}

#[test]
fn save_states_are_described() {
    assert_eq!(describe_state(SaveState::Clean), "All changes saved");
    assert!(describe_state(SaveState::SaveFailed).contains("local cache"));
}

#[test]
fn cli_parses_note_and_history_commands() {
    let cli = Cli::try_parse_from(["daybook", "show", "2024-01-02", "--days", "-1"]).unwrap();
    let Some(Commands::Show { note }) = cli.command else {
        panic!("expected show command");
    };
    assert_eq!(note.path.as_deref(), Some("2024-01-02"));
    assert_eq!(note.days, Some(-1));

    let cli = Cli::try_parse_from(["daybook", "history", "restore", "1704067200000", "20240101"])
        .unwrap();
    let Some(Commands::History {
        command: HistoryCommands::Restore { timestamp, note },
    }) = cli.command
    else {
        panic!("expected history restore command");
    };
    assert_eq!(timestamp, 1_704_067_200_000);
    assert_eq!(note.path.as_deref(), Some("20240101"));

    let cli =
        Cli::try_parse_from(["daybook", "settings", "set", "editorFontSize", "16"]).unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Settings {
            command: Some(SettingsCommands::Set { .. })
        })
    ));
}

#[test]
fn cli_quick_append_collects_trailing_words() {
    let cli =
        Cli::try_parse_from(["daybook", "--store-path", "/tmp/s.json", "buy", "milk"]).unwrap();
    assert!(cli.command.is_none());
    assert_eq!(cli.store_path, Some(PathBuf::from("/tmp/s.json")));
    assert_eq!(cli.note, vec!["buy".to_string(), "milk".to_string()]);
}

#[test]
fn completions_mention_binary_name() {
    let script = String::from_utf8(render_completions(CompletionShell::Bash)).unwrap();
    assert!(script.contains("daybook"));
}

#[tokio::test]
async fn ready_session_requires_login_when_server_is_unreachable() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = Context {
        config: ClientConfig {
            server_url: "http://127.0.0.1:9".to_string(),
            request_timeout: Duration::from_millis(500),
            ..ClientConfig::default()
        },
        store_path: dir.path().join("store.json"),
    };

    let result = ctx.ready_session(daybook_core::NotePath::today()).await;
    assert!(matches!(result, Err(CliError::NotLoggedIn(_))));
}

#[tokio::test]
async fn authed_session_requires_login_without_touching_notes() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = Context {
        config: ClientConfig {
            server_url: "http://127.0.0.1:9".to_string(),
            request_timeout: Duration::from_millis(500),
            ..ClientConfig::default()
        },
        store_path: dir.path().join("store.json"),
    };

    let result = ctx.authed_session().await;
    assert!(matches!(result, Err(CliError::NotLoggedIn(_))));
    let store = std::fs::read_to_string(dir.path().join("store.json")).unwrap_or_default();
    assert!(!store.contains("note_cache"));
}
