//! Login and logout.
//!
//! Tokens are issued by the history service's sign-in flow; `login` only
//! stores one so later runs can use it.

use chrono::{Duration, Utc};
use serde::Serialize;

use crate::auth::{StoredToken, TokenStore};
use crate::cli::commands::token_store;
use crate::error::{Error, Result};

#[derive(Serialize)]
struct LoginOutput<'a> {
    stored: bool,
    store: &'a str,
    expires_at: Option<String>,
}

/// Build the token record from `login` flags.
fn stored_token(
    access_token: &str,
    refresh_token: Option<&str>,
    expires_in: Option<i64>,
) -> Result<StoredToken> {
    let access_token = access_token.trim();
    if access_token.is_empty() {
        return Err(Error::Other("access token is empty".to_string()));
    }
    if expires_in.is_some_and(|secs| secs <= 0) {
        return Err(Error::Other("--expires-in must be positive".to_string()));
    }

    Ok(StoredToken {
        access_token: access_token.to_string(),
        refresh_token: refresh_token.map(str::to_string),
        expires_at: expires_in.map(|secs| Utc::now() + Duration::seconds(secs)),
    })
}

/// Store an access token.
///
/// # Errors
///
/// Returns an error if the token is invalid or no store accepts it.
pub fn execute_login(
    access_token: &str,
    refresh_token: Option<&str>,
    expires_in: Option<i64>,
    use_keyring: bool,
    json: bool,
) -> Result<()> {
    let token = stored_token(access_token, refresh_token, expires_in)?;
    let store = token_store(use_keyring);
    store.save(&token)?;

    let expires_at = token.expires_at.map(|t| t.to_rfc3339());
    if json {
        let output = LoginOutput {
            stored: true,
            store: store.name(),
            expires_at,
        };
        println!("{}", serde_json::to_string(&output)?);
    } else {
        println!("Token saved to {}.", store.name());
        if let Some(at) = expires_at {
            println!("Expires at {at}.");
        }
    }
    Ok(())
}

/// Remove stored tokens.
///
/// # Errors
///
/// Returns an error if a store fails to clear.
pub fn execute_logout(use_keyring: bool, json: bool) -> Result<()> {
    token_store(use_keyring).clear()?;

    if json {
        println!("{}", serde_json::json!({ "logged_out": true }));
    } else {
        println!("Successfully logged out.");
    }
    Ok(())
}
