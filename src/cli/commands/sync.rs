//! Sync command implementation.
//!
//! Resolves configuration and credentials, then drives one
//! [`SyncEngine`] run on a tokio runtime. Ctrl-C or SIGTERM cancels the
//! run: the pending request is dropped, progress made so far is saved, and
//! the command exits with the interrupt code.

use std::path::Path;

use colored::Colorize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::api::HttpHistoryApi;
use crate::cli::commands::credentials;
use crate::config::{Config, resolve_state_path};
use crate::error::{Error, Result};
use crate::sync::{SyncEngine, SyncEvent, SyncOptions, SyncSummary};

/// Options for the sync command, gathered from global and local flags.
#[derive(Debug, Clone, Copy)]
pub struct SyncArgs<'a> {
    pub config_path: Option<&'a Path>,
    pub state_path: Option<&'a Path>,
    pub token: Option<&'a str>,
    pub use_keyring: bool,
    pub dry_run: bool,
    pub json: bool,
    pub quiet: bool,
}

/// Execute the sync command.
///
/// # Errors
///
/// Returns an error if configuration or credentials are unusable, the scan
/// root or state file cannot be read, the state cannot be saved, or the
/// run was interrupted.
pub fn execute(args: SyncArgs<'_>) -> Result<()> {
    let config = Config::resolve(args.config_path)?;
    let state_path = resolve_state_path(args.state_path);
    debug!(
        endpoint = %config.api_endpoint,
        machine_id = %config.machine_id,
        data_dir = %config.claude_data_dir.display(),
        state = %state_path.display(),
        "Resolved configuration"
    );

    let credentials = credentials(args.token, args.use_keyring);
    let options = SyncOptions {
        data_dir: config.claude_data_dir.clone(),
        exclude_patterns: config.exclude_patterns.clone(),
        machine_id: config.machine_id.clone(),
        state_path,
        dry_run: args.dry_run,
    };

    let cancel = CancellationToken::new();
    let api = HttpHistoryApi::new(&config.api_endpoint, &config.machine_id, cancel.clone())?;

    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| Error::Other(format!("Failed to create async runtime: {e}")))?;

    let summary = rt.block_on(async {
        let interrupt = cancel.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            debug!("Shutdown signal received, cancelling sync");
            interrupt.cancel();
        });

        let engine = SyncEngine::new(&api, credentials.as_ref(), options, cancel.clone());
        let engine = if args.json || args.quiet {
            engine
        } else {
            engine.with_progress(print_event)
        };
        engine.run().await
    })?;

    if args.json {
        println!("{}", serde_json::to_string(&summary)?);
    } else if !args.quiet {
        print_summary(&summary);
    }

    if summary.cancelled {
        return Err(Error::Cancelled);
    }
    Ok(())
}

/// Completes on Ctrl-C, or SIGTERM on unix. A handler that cannot be
/// installed never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}

fn print_event(event: &SyncEvent<'_>) {
    match event {
        SyncEvent::Scanning { root } => {
            println!("Scanning {} for conversations...", root.display());
        }
        SyncEvent::Found { files } => println!("Found {files} conversation files"),
        SyncEvent::RemoteHashes { count: Some(count) } => {
            println!("Server has {count} conversations");
        }
        SyncEvent::RemoteHashes { count: None } => println!(
            "{}",
            "Could not fetch conversation list, continuing with UUID-based sync".yellow()
        ),
        SyncEvent::Synced {
            session_id,
            messages,
        } => println!(
            "  {} Synced {messages} messages from {}",
            "✓".green(),
            session_id.bold()
        ),
        SyncEvent::WouldSync {
            session_id,
            messages,
        } => println!(
            "  {} Would sync {messages} messages from {}",
            "~".cyan(),
            session_id.bold()
        ),
        SyncEvent::Failed { session_id, error } => {
            println!("  {} {}: {error}", "✗".red(), session_id.bold());
        }
    }
}

fn print_summary(summary: &SyncSummary) {
    let headline = if summary.cancelled {
        "Sync interrupted".yellow().bold()
    } else if summary.dry_run {
        "Dry run complete".cyan().bold()
    } else {
        "Sync complete".green().bold()
    };

    let verb = if summary.dry_run { "would sync" } else { "synced" };
    let mut line = format!(
        "{headline}: {} sessions {verb} ({} messages), {} skipped (unchanged)",
        summary.synced, summary.messages, summary.skipped
    );
    if summary.unchanged > 0 {
        line.push_str(&format!(", {} up to date", summary.unchanged));
    }
    if summary.errors > 0 {
        line.push_str(&format!(", {}", format!("{} errors", summary.errors).red()));
    }

    println!();
    println!("{line}");
}
