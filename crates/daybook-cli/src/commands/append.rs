use daybook_core::{NotePath, SaveState};

use crate::commands::common::{append_line, resolve_appended_content, spawn_event_printer, Context};
use crate::error::CliError;

pub async fn run_append(
    content_parts: &[String],
    path: Option<&str>,
    ctx: &Context,
) -> Result<(), CliError> {
    let addition = resolve_appended_content(content_parts)?;
    let path = match path {
        Some(raw) => NotePath::from_user_input(raw)?,
        None => NotePath::today(),
    };

    let session = ctx.ready_session(path.clone()).await?;
    let printer = spawn_event_printer(session.subscribe(), false);

    let current = session.content().await.unwrap_or_default();
    session.edit(append_line(&current, &addition)).await?;
    let state = session.close_note().await;
    session.teardown().await;
    printer.abort();

    if state == Some(SaveState::SaveFailed) {
        return Err(CliError::SaveFailed);
    }
    println!("{path}");
    Ok(())
}
