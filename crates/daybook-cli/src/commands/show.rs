use crate::cli::NoteArgs;
use crate::commands::common::{resolve_note_path, spawn_event_printer, Context};
use crate::error::CliError;

pub async fn run_show(note: &NoteArgs, ctx: &Context) -> Result<(), CliError> {
    let path = resolve_note_path(note)?;
    let session = ctx.ready_session(path).await?;
    let printer = spawn_event_printer(session.subscribe(), false);

    let content = session.content().await.unwrap_or_default();
    session.teardown().await;
    printer.abort();

    if content.is_empty() {
        eprintln!("(empty)");
    } else {
        println!("{content}");
    }
    Ok(())
}
