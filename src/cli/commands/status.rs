//! Status command implementation.

use std::path::{Path, PathBuf};

use colored::Colorize;
use serde::Serialize;

use crate::auth::CredentialProvider;
use crate::cli::commands::credentials;
use crate::config::{Config, default_config_path, resolve_state_path};
use crate::error::Result;
use crate::sync::SyncState;

/// Output for status command.
#[derive(Serialize)]
struct StatusOutput {
    config_path: PathBuf,
    config: Config,
    auth: AuthInfo,
    state_path: PathBuf,
    state: Option<StateInfo>,
    state_error: Option<String>,
}

#[derive(Serialize)]
struct AuthInfo {
    authenticated: bool,
    source: String,
    error: Option<String>,
}

#[derive(Serialize)]
struct StateInfo {
    last_sync_at: String,
    sessions: usize,
    messages: usize,
}

fn auth_info(provider: &dyn CredentialProvider) -> AuthInfo {
    match provider.bearer_token() {
        Ok(_) => AuthInfo {
            authenticated: true,
            source: provider.source().to_string(),
            error: None,
        },
        Err(e) => AuthInfo {
            authenticated: false,
            source: provider.source().to_string(),
            error: Some(e.to_string()),
        },
    }
}

/// Execute the status command.
///
/// Credential and state problems are reported, not returned.
///
/// # Errors
///
/// Returns an error if the config file is invalid or output fails.
pub fn execute(
    config_path: Option<&Path>,
    state_path: Option<&Path>,
    token: Option<&str>,
    use_keyring: bool,
    json: bool,
) -> Result<()> {
    let config = Config::resolve(config_path)?;
    let config_path = config_path.map_or_else(default_config_path, Path::to_path_buf);
    let state_path = resolve_state_path(state_path);

    let auth = auth_info(credentials(token, use_keyring).as_ref());

    let (state, state_error) = match SyncState::load(&state_path) {
        Ok(state) => (
            Some(StateInfo {
                last_sync_at: state.last_sync_at.clone(),
                sessions: state.sessions.len(),
                messages: state.total_messages(),
            }),
            None,
        ),
        Err(e) => (None, Some(e.to_string())),
    };

    let output = StatusOutput {
        config_path,
        config,
        auth,
        state_path,
        state,
        state_error,
    };

    if json {
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    print_status(&output);
    Ok(())
}

fn print_status(output: &StatusOutput) {
    let config = &output.config;

    println!("{}", "Config".cyan().bold());
    println!("  File:         {}", output.config_path.display());
    println!("  API Endpoint: {}", config.api_endpoint);
    println!("  Machine ID:   {}", config.machine_id);
    println!("  Data Dir:     {}", config.claude_data_dir.display());
    if !config.exclude_patterns.is_empty() {
        println!("  Exclude:      {}", config.exclude_patterns.join(", "));
    }

    println!();
    println!("{}", "Auth".cyan().bold());
    if output.auth.authenticated {
        println!(
            "  Status: {} ({})",
            "authenticated".green(),
            output.auth.source
        );
    } else {
        println!(
            "  Status: {} ({})",
            "not authenticated".red(),
            output.auth.error.as_deref().unwrap_or("unknown error")
        );
    }

    println!();
    println!("{}", "Sync State".cyan().bold());
    println!("  File:         {}", output.state_path.display());
    match (&output.state, &output.state_error) {
        (Some(state), _) => {
            let last = if state.last_sync_at.is_empty() {
                "never".dimmed().to_string()
            } else {
                state.last_sync_at.clone()
            };
            println!("  Last Sync:    {last}");
            println!("  Sessions:     {}", state.sessions);
            println!("  Messages:     {}", state.messages);
        }
        (None, Some(error)) => println!("  {} {error}", "error loading:".red()),
        (None, None) => {}
    }
}
