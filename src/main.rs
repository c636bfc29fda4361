use bh_relations::cli::commands;
use bh_relations::cli::{Cli, Commands};
use bh_relations::config;
use bh_relations::logging::init_logging;
use bh_relations::output::OutputContext;
use bh_relations::{RelationsError, StructuredError};
use clap::Parser;
use std::io::{self, IsTerminal};

fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.verbose, cli.quiet, cli.log_file.as_deref()) {
        eprintln!("Failed to initialize logging: {e}");
    }

    let overrides = build_cli_overrides(&cli);
    let ctx = OutputContext::from_flags(cli.json, cli.quiet, cli.no_color);

    let result = match &cli.command {
        Commands::Init { force } => commands::init::execute(*force, None, &ctx),
        Commands::Ticket { command } => commands::ticket::execute(command, &overrides, &ctx),
        Commands::Rel { command } => commands::rel::execute(command, &overrides, &ctx),
        Commands::Types => commands::types::execute(&overrides, &ctx),
        Commands::Blockers { resource } => commands::blockers::execute(resource, &overrides, &ctx),
        Commands::History { resource, limit } => {
            commands::history::execute(resource, *limit, &overrides, &ctx)
        }
        Commands::Config { command } => commands::config::execute(command, &overrides, &ctx),
        Commands::Version => commands::version::execute(&ctx),
    };

    if let Err(e) = result {
        handle_error(&e, cli.json, &overrides);
    }
}

/// Handle errors with structured output support.
///
/// When --json is set or stdout is not a TTY, outputs structured JSON to stderr.
/// Otherwise, outputs human-readable error with optional color.
fn handle_error(err: &RelationsError, json_mode: bool, overrides: &config::CliOverrides) -> ! {
    let structured = match err {
        RelationsError::UnknownRelationType { relation_type } => {
            let known = commands::known_relation_types(overrides);
            StructuredError::unknown_relation_type(relation_type, &known)
        }
        _ => StructuredError::from_error(err),
    };
    let exit_code = structured.code.exit_code();

    let use_json = json_mode || !io::stdout().is_terminal();

    if use_json {
        let json = structured.to_json();
        eprintln!(
            "{}",
            serde_json::to_string_pretty(&json).unwrap_or_else(|_| json.to_string())
        );
    } else {
        let use_color = io::stderr().is_terminal();
        eprintln!("{}", structured.to_human(use_color));
    }

    std::process::exit(exit_code);
}

fn build_cli_overrides(cli: &Cli) -> config::CliOverrides {
    config::CliOverrides {
        db: cli.db.clone(),
        actor: cli.actor.clone(),
        json: Some(cli.json),
        lock_timeout: cli.lock_timeout,
    }
}
