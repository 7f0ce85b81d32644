//! Token storage.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::AuthError;
use crate::sync::file::atomic_write;

/// Token file name inside the app directory.
pub const TOKEN_FILE: &str = "tokens.json";

/// Tokens are treated as expired this long before their expiry time.
pub const EXPIRY_SKEW_SECS: i64 = 60;

/// A persisted bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredToken {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl StoredToken {
    /// A token with no refresh token and no expiry.
    #[must_use]
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            expires_at: None,
        }
    }

    /// Whether the token is expired, or about to be, at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at
            .is_some_and(|at| now >= at - Duration::seconds(EXPIRY_SKEW_SECS))
    }
}

/// A place tokens can be kept.
pub trait TokenStore: Send + Sync {
    /// Short backend name for messages.
    fn name(&self) -> &'static str;

    /// The stored token, `None` if nothing is stored.
    ///
    /// # Errors
    ///
    /// Returns an [`AuthError`] if the backend cannot be read.
    fn load(&self) -> Result<Option<StoredToken>, AuthError>;

    /// Replace the stored token.
    ///
    /// # Errors
    ///
    /// Returns an [`AuthError`] if the backend cannot be written.
    fn save(&self, token: &StoredToken) -> Result<(), AuthError>;

    /// Remove the stored token. Clearing an empty store succeeds.
    ///
    /// # Errors
    ///
    /// Returns an [`AuthError`] if the backend cannot be written.
    fn clear(&self) -> Result<(), AuthError>;
}

/// Tokens in an owner-only JSON file.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    const NAME: &'static str = "token file";

    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at `<app dir>/tokens.json`.
    #[must_use]
    pub fn in_dir(app_dir: &Path) -> Self {
        Self::new(app_dir.join(TOKEN_FILE))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn error(&self, message: impl std::fmt::Display) -> AuthError {
        AuthError::Store {
            backend: Self::NAME,
            message: format!("{}: {message}", self.path.display()),
        }
    }
}

impl TokenStore for FileTokenStore {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn load(&self) -> Result<Option<StoredToken>, AuthError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.error(e)),
        };
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| self.error(e))
    }

    fn save(&self, token: &StoredToken) -> Result<(), AuthError> {
        let content = serde_json::to_string_pretty(token).map_err(|e| self.error(e))?;
        atomic_write(&self.path, content.as_bytes()).map_err(|e| self.error(e))
    }

    fn clear(&self) -> Result<(), AuthError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.error(e)),
        }
    }
}
