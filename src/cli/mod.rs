//! CLI definitions using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod commands;

/// Sync Claude conversation history to the history service
#[derive(Parser, Debug)]
#[command(name = "claude-history-sync", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: ~/.claude-history-sync/config.json)
    #[arg(long, global = true, env = "CLAUDE_HISTORY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Sync state file (default: ~/.claude-history-sync/state.json)
    #[arg(long, global = true, env = "CLAUDE_HISTORY_STATE")]
    pub state: Option<PathBuf>,

    /// Bearer token to use instead of the stored credentials
    #[arg(long, global = true, env = "CLAUDE_HISTORY_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Keep tokens in the token file only, never the OS keyring
    #[arg(
        long,
        global = true,
        env = "CLAUDE_HISTORY_NO_KEYRING",
        value_parser = clap::builder::FalseyValueParser::new()
    )]
    pub no_keyring: bool,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (no output except errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Upload new conversation messages
    Sync {
        /// Show what would be uploaded without uploading or saving state
        #[arg(long)]
        dry_run: bool,
    },

    /// Show configuration, credentials and sync state
    Status,

    /// Store an access token for later runs
    Login {
        /// Access token issued by the history service
        #[arg(long)]
        access_token: String,

        /// Refresh token, kept alongside the access token
        #[arg(long)]
        refresh_token: Option<String>,

        /// Seconds until the access token expires
        #[arg(long)]
        expires_in: Option<i64>,
    },

    /// Remove stored tokens
    Logout,

    /// Print version information
    Version,
}
