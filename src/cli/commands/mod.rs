//! Command implementations.

pub mod login;
pub mod status;
pub mod sync;
pub mod version;

use crate::auth::{
    CredentialProvider, FallbackStore, FileTokenStore, KeyringStore, StaticToken,
    TokenCredentials,
};
use crate::config::app_dir;

/// Token storage used by `login`, `logout` and token lookups: the OS
/// keyring when it works (and `use_keyring` is set), otherwise
/// `~/.claude-history-sync/tokens.json`.
#[must_use]
pub fn token_store(use_keyring: bool) -> FallbackStore<KeyringStore, FileTokenStore> {
    let file = FileTokenStore::in_dir(&app_dir());
    if use_keyring {
        FallbackStore::probe(KeyringStore::new(), file)
    } else {
        FallbackStore::secondary_only(KeyringStore::new(), file)
    }
}

/// Credentials for API calls: the explicit token if one was given,
/// otherwise the stored one.
#[must_use]
pub fn credentials(token: Option<&str>, use_keyring: bool) -> Box<dyn CredentialProvider> {
    match token {
        Some(token) => Box::new(StaticToken::new(token)),
        None => Box::new(TokenCredentials::new(token_store(use_keyring))),
    }
}
