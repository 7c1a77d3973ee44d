use daybook_core::SaveState;

use crate::cli::HistoryCommands;
use crate::commands::common::{
    format_history_lines, resolve_note_path, spawn_event_printer, Context,
};
use crate::error::CliError;

pub async fn run_history(command: HistoryCommands, ctx: &Context) -> Result<(), CliError> {
    match command {
        HistoryCommands::List { note, json } => {
            let path = resolve_note_path(&note)?;
            let session = ctx.authed_session().await?;
            let result = session.list_history(&path).await;
            session.teardown().await;
            let snapshots = result?;

            if json {
                println!("{}", serde_json::to_string_pretty(&snapshots)?);
            } else if snapshots.is_empty() {
                eprintln!("No history for {path}");
            } else {
                for line in format_history_lines(&snapshots) {
                    println!("{line}");
                }
            }
        }
        HistoryCommands::Show { timestamp, note } => {
            let path = resolve_note_path(&note)?;
            let session = ctx.authed_session().await?;
            let result = session.view_history(&path, timestamp).await;
            session.teardown().await;
            println!("{}", result?);
        }
        HistoryCommands::Delete { timestamp, note } => {
            let path = resolve_note_path(&note)?;
            let session = ctx.authed_session().await?;
            let result = session.delete_history(&path, timestamp).await;
            session.teardown().await;
            result?;
            println!("{timestamp}");
        }
        HistoryCommands::Clear { note } => {
            let path = resolve_note_path(&note)?;
            let session = ctx.authed_session().await?;
            let result = session.delete_all_history(&path).await;
            session.teardown().await;
            result?;
            println!("{path}");
        }
        HistoryCommands::Restore { timestamp, note } => {
            let path = resolve_note_path(&note)?;
            let session = ctx.ready_session(path.clone()).await?;
            let printer = spawn_event_printer(session.subscribe(), false);
            let result = session.restore_history(timestamp).await;
            session.teardown().await;
            printer.abort();

            if result? == SaveState::SaveFailed {
                return Err(CliError::SaveFailed);
            }
            println!("{path}");
        }
    }
    Ok(())
}
