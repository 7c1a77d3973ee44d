use chrono::{Local, TimeZone};
use daybook_core::{BootstrapOutcome, NotePath, ReadyVia};

use crate::commands::common::{login_reason_label, read_password, spawn_event_printer, Context};
use crate::error::CliError;

pub async fn run_login(password: Option<String>, ctx: &Context) -> Result<(), CliError> {
    let password = read_password(password)?;
    let session = ctx.open_session()?;
    let printer = spawn_event_printer(session.subscribe(), false);

    let result = session.login(&password, NotePath::today()).await;
    session.teardown().await;
    printer.abort();
    result?;

    println!("Logged in to {}", ctx.config.server_url);
    Ok(())
}

pub async fn run_logout(ctx: &Context) -> Result<(), CliError> {
    let session = ctx.open_session()?;
    session.logout().await;
    println!("Logged out");
    Ok(())
}

pub async fn run_status(ctx: &Context) -> Result<(), CliError> {
    let session = ctx.open_session()?;
    println!("Server: {}", ctx.config.server_url);
    println!("Device: {}", ctx.config.device);
    println!("Store:  {}", ctx.store_path.display());
    if let Some(written_at) = session.auth_cache().written_at() {
        let checked = Local
            .timestamp_millis_opt(written_at)
            .single()
            .map_or_else(|| written_at.to_string(), |at| at.format("%Y-%m-%d %H:%M").to_string());
        println!("Last login check: {checked}");
    }

    let outcome = session.bootstrap(NotePath::today()).await;
    session.teardown().await;

    match outcome? {
        BootstrapOutcome::EditorReady { via } => {
            let detail = match via {
                ReadyVia::Cache => "cached verdict, verified in the background",
                ReadyVia::Network => "confirmed by the server",
                ReadyVia::FallbackCache => "server did not answer in time; using the cached verdict",
            };
            println!("Status: logged in ({detail})");
        }
        BootstrapOutcome::LoginPrompt { reason } => {
            println!("Status: not logged in ({})", login_reason_label(reason));
        }
    }
    Ok(())
}
