//! Daybook CLI - date-oriented markdown notes from the terminal
//!
//! Each invocation plays the part of one editor tab: it bootstraps a session
//! from the local store, does its work through the autosave pipeline and
//! flushes everything before exiting.

mod cli;
mod commands;
mod error;

#[cfg(test)]
mod tests;

use clap::{CommandFactory, Parser};

use crate::cli::{Cli, Commands};
use crate::commands::append::run_append;
use crate::commands::auth_cmd::{run_login, run_logout, run_status};
use crate::commands::common::Context;
use crate::commands::completions::run_completions;
use crate::commands::delete::run_delete;
use crate::commands::edit::run_edit;
use crate::commands::history::run_history;
use crate::commands::list::run_list;
use crate::commands::live::run_live;
use crate::commands::settings::run_settings;
use crate::commands::show::run_show;
use crate::commands::write::run_write;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("daybook=warn".parse().expect("valid directive")),
        )
        .init();

    let cli = Cli::parse();

    if let Some(Commands::Completions { shell, output }) = &cli.command {
        return run_completions(*shell, output.as_deref());
    }

    let ctx = Context::resolve(cli.store_path, cli.server)?;
    tracing::debug!(server = %ctx.config.server_url, store = %ctx.store_path.display(), "Resolved CLI context");

    match cli.command {
        Some(Commands::Login { password }) => run_login(password, &ctx).await?,
        Some(Commands::Logout) => run_logout(&ctx).await?,
        Some(Commands::Status) => run_status(&ctx).await?,
        Some(Commands::Show { note }) => run_show(&note, &ctx).await?,
        Some(Commands::Edit { note }) => run_edit(&note, &ctx).await?,
        Some(Commands::Write { note, content }) => run_write(&note, content, &ctx).await?,
        Some(Commands::Append { content, path }) => {
            run_append(&content, path.as_deref(), &ctx).await?;
        }
        Some(Commands::Live { note }) => run_live(&note, &ctx).await?,
        Some(Commands::List { limit, json }) => run_list(limit, json, &ctx).await?,
        Some(Commands::Delete { path }) => run_delete(&path, &ctx).await?,
        Some(Commands::History { command }) => run_history(command, &ctx).await?,
        Some(Commands::Settings { command }) => run_settings(command, &ctx).await?,
        Some(Commands::Completions { .. }) => {}
        None => {
            // Quick append: daybook "my thought"
            if cli.note.is_empty() {
                Cli::command().print_help().map_err(CliError::Io)?;
                println!();
            } else {
                run_append(&cli.note, None, &ctx).await?;
            }
        }
    }

    Ok(())
}
