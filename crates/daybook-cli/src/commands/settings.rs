use daybook_core::{EditorSession, EditorSettings};

use crate::cli::SettingsCommands;
use crate::commands::common::{spawn_event_printer, Context};
use crate::error::CliError;

pub async fn run_settings(
    command: Option<SettingsCommands>,
    ctx: &Context,
) -> Result<(), CliError> {
    let session = ctx.authed_session().await?;
    session.settings().load().await;
    let printer = spawn_event_printer(session.subscribe(), false);

    let result = apply_settings_command(&session, command.unwrap_or(SettingsCommands::Show));
    // Teardown flushes the debounced settings push.
    session.teardown().await;
    printer.abort();

    println!("{}", serde_json::to_string_pretty(&result?)?);
    Ok(())
}

fn apply_settings_command(
    session: &EditorSession,
    command: SettingsCommands,
) -> Result<EditorSettings, CliError> {
    let settings = session.settings();
    let updated = match command {
        SettingsCommands::Show => settings.current(),
        SettingsCommands::Set { key, value } => {
            settings.update(|current| current.set_option(key.trim(), &value))?
        }
        SettingsCommands::ToggleTheme => settings.update(|current| {
            current.toggle_theme();
            Ok(())
        })?,
        SettingsCommands::Split { editor, preview } => settings.update(|current| {
            current.set_split(editor, preview);
            Ok(())
        })?,
    };
    Ok(updated)
}
