use daybook_core::NotePath;

use crate::commands::common::{spawn_event_printer, Context};
use crate::error::CliError;

pub async fn run_delete(raw_path: &str, ctx: &Context) -> Result<(), CliError> {
    let path = NotePath::from_user_input(raw_path)?;
    let session = ctx.authed_session().await?;
    let printer = spawn_event_printer(session.subscribe(), false);

    let result = session.delete_note(&path).await;
    session.teardown().await;
    printer.abort();
    result?;

    println!("{path}");
    Ok(())
}
