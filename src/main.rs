//! claude-history-sync entry point.

use clap::Parser;
use history_sync::cli::commands;
use history_sync::cli::commands::sync::SyncArgs;
use history_sync::cli::{Cli, Commands};
use history_sync::error::Error;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    // Set up tracing based on verbosity
    init_tracing(cli.verbose, cli.quiet);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if cli.json {
                eprintln!("{}", e.to_structured_json());
            } else if !cli.quiet || matches!(e, Error::Cancelled) {
                if let Some(hint) = e.hint() {
                    eprintln!("Error: {e}\n  Hint: {hint}");
                } else {
                    eprintln!("Error: {e}");
                }
            }
            ExitCode::from(e.exit_code())
        }
    }
}

fn init_tracing(verbose: u8, quiet: bool) {
    use tracing_subscriber::EnvFilter;

    if quiet {
        return;
    }

    // Honor RUST_LOG if set, otherwise use verbosity flag
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        match verbose {
            0 => EnvFilter::new("warn"),
            1 => EnvFilter::new("info"),
            2 => EnvFilter::new("debug,hyper=info,reqwest=info,rustls=info"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn run(cli: &Cli) -> Result<(), Error> {
    let config = cli.config.as_deref();
    let state = cli.state.as_deref();
    let token = cli.token.as_deref();
    let use_keyring = !cli.no_keyring;

    match &cli.command {
        Commands::Sync { dry_run } => commands::sync::execute(SyncArgs {
            config_path: config,
            state_path: state,
            token,
            use_keyring,
            dry_run: *dry_run,
            json: cli.json,
            quiet: cli.quiet,
        }),
        Commands::Status => commands::status::execute(config, state, token, use_keyring, cli.json),
        Commands::Login {
            access_token,
            refresh_token,
            expires_in,
        } => commands::login::execute_login(
            access_token,
            refresh_token.as_deref(),
            *expires_in,
            use_keyring,
            cli.json,
        ),
        Commands::Logout => commands::login::execute_logout(use_keyring, cli.json),
        Commands::Version => commands::version::execute(cli.json),
    }
}
