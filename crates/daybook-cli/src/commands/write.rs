use daybook_core::SaveState;

use crate::cli::NoteArgs;
use crate::commands::common::{read_piped_stdin, resolve_note_path, spawn_event_printer, Context};
use crate::error::CliError;

pub async fn run_write(
    note: &NoteArgs,
    content: Option<String>,
    ctx: &Context,
) -> Result<(), CliError> {
    let path = resolve_note_path(note)?;
    let content = match content {
        Some(content) => content,
        None => read_piped_stdin()?.ok_or(CliError::EmptyContent)?,
    };

    let session = ctx.ready_session(path.clone()).await?;
    let printer = spawn_event_printer(session.subscribe(), false);

    session.edit(content).await?;
    let state = session.close_note().await;
    session.teardown().await;
    printer.abort();

    if state == Some(SaveState::SaveFailed) {
        return Err(CliError::SaveFailed);
    }
    println!("{path}");
    Ok(())
}
