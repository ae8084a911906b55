//! CLI entry point and dispatch logic
//!
//! This module owns the `run()` function which:
//! - Parses CLI arguments
//! - Builds CliArgs and discovers Config
//! - Creates the tokio runtime
//! - Dispatches to command handlers
//! - Handles all error output

use clap::Parser;
use clap::error::ErrorKind;

use super::args::{Cli, Commands};
use super::commands::{self, CommandContext};

use crate::{AceError, CliArgs, Config, ExitCode};
use ace_utils::logging::init_tracing;
use ace_utils::session_id::sanitize_session_id;

/// Main CLI execution function.
///
/// Handles ALL output including errors and returns the exit code on failure;
/// `main` only maps it to the process exit status.
pub fn run() -> Result<(), ExitCode> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let informational = matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion);
            let _ = err.print();
            return if informational {
                Ok(())
            } else {
                Err(ExitCode::USAGE)
            };
        }
    };

    let cli_args = CliArgs {
        config_path: cli.config.clone(),
        audience: None,
        collaborator_timeout: cli.timeout,
        lock_ttl_seconds: None,
        verbose: cli.verbose.then_some(true),
        provider: cli.provider.clone(),
        templates_dir: cli.templates_dir.clone(),
    };

    let config = match Config::discover(&cli_args) {
        Ok(config) => config,
        Err(err) => return Err(report(&AceError::Config(err), "config")),
    };

    // A subscriber may already be installed when embedded; that is fine.
    let _ = init_tracing(config.verbose());

    let session_id = match sanitize_session_id(&cli.session) {
        Ok(id) => id,
        Err(err) => return Err(report(&AceError::SessionId(err), "session")),
    };

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("✗ Failed to create async runtime: {e}");
            return Err(ExitCode::INTERNAL);
        }
    };

    let operation = cli.command.name();
    let context = CommandContext::new(session_id, config, cli.force);

    let result = rt.block_on(async {
        match cli.command {
            Commands::Start {
                template,
                audience,
                amend,
            } => commands::execute_start_command(&context, &template, audience, amend),
            Commands::Fill {
                phase,
                assignments,
                audience,
            } => commands::execute_fill_command(&context, phase, assignments, audience),
            Commands::Validate { phase } => commands::execute_validate_command(&context, phase),
            Commands::Render { phase, dry_run } => {
                commands::execute_render_command(&context, phase, dry_run).await
            }
            Commands::Status { json } => commands::execute_status_command(&context, json),
            Commands::Show { phase, json } => commands::execute_show_command(&context, phase, json),
            Commands::Templates { phase } => commands::execute_templates_command(&context, phase),
        }
    });

    match result {
        Ok(()) => Ok(()),
        Err(error) => {
            if let Some(ace_error) = error.downcast_ref::<AceError>() {
                return Err(report(ace_error, operation));
            }
            eprintln!("✗ Unexpected error: {error:#}");
            eprintln!("\n  General troubleshooting:");
            eprintln!("    - Run with --verbose for more detailed output");
            eprintln!("    - Check that ACE_HOME is writable");
            Err(ExitCode::INTERNAL)
        }
    }
}

fn report(error: &AceError, operation: &str) -> ExitCode {
    tracing::debug!(operation, error = %error, "Command failed");
    eprintln!("{}", error.display_for_user());
    error.to_exit_code()
}
