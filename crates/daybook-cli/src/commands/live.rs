use daybook_core::SaveState;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::cli::NoteArgs;
use crate::commands::common::{append_line, resolve_note_path, spawn_event_printer, Context};
use crate::error::CliError;

const SAVE_COMMAND: &str = ":w";
const QUIT_COMMAND: &str = ":q";

/// Line-by-line editing: each line is appended to the note and autosaved.
pub async fn run_live(note: &NoteArgs, ctx: &Context) -> Result<(), CliError> {
    let path = resolve_note_path(note)?;
    let session = ctx.ready_session(path.clone()).await?;
    let printer = spawn_event_printer(session.subscribe(), true);

    if let Some(content) = session.content().await.filter(|content| !content.is_empty()) {
        println!("{content}");
    }
    eprintln!(
        "Editing {}. Lines are appended and autosaved; `{SAVE_COMMAND}` saves a snapshot, `{QUIT_COMMAND}` or Ctrl-D quits.",
        path.display_label()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let outcome = loop {
        let line = tokio::select! {
            line = lines.next_line() => line,
            _ = tokio::signal::ctrl_c() => Ok(None),
        };
        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => break Ok(()),
            Err(error) => break Err(CliError::Io(error)),
        };

        match line.trim() {
            QUIT_COMMAND => break Ok(()),
            SAVE_COMMAND => match session.save_now().await {
                Ok(state) => eprintln!("{}", describe_state(state)),
                Err(error) => break Err(error.into()),
            },
            _ => {
                let current = session.content().await.unwrap_or_default();
                if let Err(error) = session.edit(append_line(&current, &line)).await {
                    break Err(error.into());
                }
            }
        }
    };

    let state = session.close_note().await;
    session.teardown().await;
    printer.abort();
    outcome?;

    if let Some(state) = state {
        eprintln!("{}", describe_state(state));
    }
    Ok(())
}

pub const fn describe_state(state: SaveState) -> &'static str {
    match state {
        SaveState::Clean => "All changes saved",
        SaveState::Dirty => "Unsaved changes",
        SaveState::Saving => "Saving...",
        SaveState::SaveFailed => "Save failed; changes are kept in the local cache",
    }
}
