use crate::commands::common::{format_note_lines, note_to_list_item, Context, NoteListItem};
use crate::error::CliError;

pub async fn run_list(limit: usize, as_json: bool, ctx: &Context) -> Result<(), CliError> {
    let session = ctx.authed_session().await?;
    let result = session.list_notes().await;
    session.teardown().await;

    let notes = result?.into_iter().take(limit).collect::<Vec<_>>();
    if as_json {
        let json_items = notes
            .iter()
            .map(note_to_list_item)
            .collect::<Vec<NoteListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
    } else {
        for line in format_note_lines(&notes) {
            println!("{line}");
        }
    }

    Ok(())
}
