use std::io::{self, Write};
use std::path::Path;

use clap::CommandFactory;
use clap_complete::{generate, Shell};

use crate::cli::{Cli, CompletionShell};
use crate::error::CliError;

impl From<CompletionShell> for Shell {
    fn from(shell: CompletionShell) -> Self {
        match shell {
            CompletionShell::Bash => Self::Bash,
            CompletionShell::Zsh => Self::Zsh,
            CompletionShell::Fish => Self::Fish,
        }
    }
}

/// Writes the script to `output_path`, or to stdout when none is given.
pub fn run_completions(shell: CompletionShell, output_path: Option<&Path>) -> Result<(), CliError> {
    let script = render_completions(shell);
    match output_path {
        Some(path) => {
            std::fs::write(path, &script)?;
            println!("Wrote {shell:?} completions to {}", path.display());
        }
        None => io::stdout().write_all(&script)?,
    }
    Ok(())
}

pub fn render_completions(shell: CompletionShell) -> Vec<u8> {
    let mut command = Cli::command();
    let bin_name = command.get_name().to_string();
    let mut script = Vec::new();
    generate(Shell::from(shell), &mut command, bin_name, &mut script);
    script
}
