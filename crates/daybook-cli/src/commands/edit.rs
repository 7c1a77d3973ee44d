use daybook_core::SaveState;

use crate::cli::NoteArgs;
use crate::commands::common::{
    capture_editor_input_with_initial, resolve_note_path, spawn_event_printer, Context,
};
use crate::error::CliError;

pub async fn run_edit(note: &NoteArgs, ctx: &Context) -> Result<(), CliError> {
    let path = resolve_note_path(note)?;
    let session = ctx.ready_session(path.clone()).await?;
    let printer = spawn_event_printer(session.subscribe(), false);

    let original = session.content().await.unwrap_or_default();
    let edited = match capture_editor_input_with_initial(&original) {
        Ok(edited) => edited,
        Err(error) => {
            session.teardown().await;
            printer.abort();
            return Err(error);
        }
    };

    if edited == original {
        session.teardown().await;
        printer.abort();
        println!("{path} unchanged");
        return Ok(());
    }

    session.edit(edited).await?;
    let state = session.save_now().await?;
    session.teardown().await;
    printer.abort();

    if state == SaveState::SaveFailed {
        return Err(CliError::SaveFailed);
    }
    println!("{path}");
    Ok(())
}
