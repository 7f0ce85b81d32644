//! Bearer credentials for the history API.
//!
//! Token acquisition happens elsewhere; this module only stores tokens and
//! answers "give me a currently valid bearer token or fail".

pub mod fallback;
pub mod keyring;
pub mod store;

use chrono::{DateTime, Utc};

pub use fallback::{FallbackStore, StoreMode};
pub use keyring::KeyringStore;
pub use store::{FileTokenStore, StoredToken, TokenStore};

/// Credential errors.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// No token is stored or supplied.
    #[error("no stored credentials")]
    NotFound,

    /// The stored token has expired.
    #[error("token expired at {0}")]
    Expired(DateTime<Utc>),

    /// The backend cannot be used on this machine (no session bus, no
    /// helper binary, unsupported platform).
    #[error("{backend} unavailable: {message}")]
    Unavailable {
        backend: &'static str,
        message: String,
    },

    /// The backend is reachable but the operation failed.
    #[error("{backend} error: {message}")]
    Store {
        backend: &'static str,
        message: String,
    },
}

impl AuthError {
    /// Whether the backend itself is unusable, as opposed to one failed call.
    #[must_use]
    pub const fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

/// Anything that can produce a bearer token.
pub trait CredentialProvider: Send + Sync {
    /// A currently valid bearer token.
    ///
    /// # Errors
    ///
    /// Returns an [`AuthError`] if no valid token is available.
    fn bearer_token(&self) -> Result<String, AuthError>;

    /// Where the token comes from, for status output.
    fn source(&self) -> &str;
}

/// A token supplied directly (flag or environment).
#[derive(Debug, Clone)]
pub struct StaticToken(String);

impl StaticToken {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl CredentialProvider for StaticToken {
    fn bearer_token(&self) -> Result<String, AuthError> {
        let token = self.0.trim();
        if token.is_empty() {
            return Err(AuthError::NotFound);
        }
        Ok(token.to_string())
    }

    fn source(&self) -> &str {
        "explicit token"
    }
}

/// Tokens read from a [`TokenStore`] on every request.
#[derive(Debug)]
pub struct TokenCredentials<S> {
    store: S,
}

impl<S: TokenStore> TokenCredentials<S> {
    pub const fn new(store: S) -> Self {
        Self { store }
    }

    /// The underlying store.
    pub const fn store(&self) -> &S {
        &self.store
    }
}

impl<S: TokenStore> CredentialProvider for TokenCredentials<S> {
    fn bearer_token(&self) -> Result<String, AuthError> {
        let token = self.store.load()?.ok_or(AuthError::NotFound)?;
        if token.is_expired_at(Utc::now()) {
            return Err(AuthError::Expired(token.expires_at.unwrap_or_default()));
        }
        if token.access_token.is_empty() {
            return Err(AuthError::NotFound);
        }
        Ok(token.access_token)
    }

    fn source(&self) -> &str {
        self.store.name()
    }
}
