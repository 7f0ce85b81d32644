//! Top-level errors and their exit codes.
//!
//! Every failure surfaces as an [`ErrorCode`]. Exit codes group by cause:
//! 2 credentials, 3 scan, 4 state load, 5 state save, 6 config, 7 service,
//! 8 local I/O, 130 interrupt. With `--json` the error is printed as an
//! object with the code, message and an optional hint.

use thiserror::Error;

use crate::api::ApiError;
use crate::auth::AuthError;
use crate::sync::SyncError;

pub type Result<T> = std::result::Result<T, Error>;

// ── Error Code ────────────────────────────────────────────────

/// Stable error codes. Scripts match on [`ErrorCode::as_str`] or the
/// process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Auth (exit 2)
    NotAuthenticated,
    TokenExpired,
    CredentialStoreError,

    // Scan (exit 3)
    ScanError,

    // State (exit 4)
    StateError,

    // Persist (exit 5)
    PersistError,

    // Config (exit 6)
    ConfigError,

    // API (exit 7)
    ApiError,

    // I/O (exit 8)
    IoError,
    JsonError,

    // Interrupted (exit 130)
    Cancelled,

    // Internal (exit 1)
    InternalError,
}

impl ErrorCode {
    /// Machine-readable SCREAMING_SNAKE code string.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        match self {
            Self::NotAuthenticated => "NOT_AUTHENTICATED",
            Self::TokenExpired => "TOKEN_EXPIRED",
            Self::CredentialStoreError => "CREDENTIAL_STORE_ERROR",
            Self::ScanError => "SCAN_ERROR",
            Self::StateError => "STATE_ERROR",
            Self::PersistError => "PERSIST_ERROR",
            Self::ConfigError => "CONFIG_ERROR",
            Self::ApiError => "API_ERROR",
            Self::IoError => "IO_ERROR",
            Self::JsonError => "JSON_ERROR",
            Self::Cancelled => "CANCELLED",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Category-based exit code.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::InternalError => 1,
            Self::NotAuthenticated | Self::TokenExpired | Self::CredentialStoreError => 2,
            Self::ScanError => 3,
            Self::StateError => 4,
            Self::PersistError => 5,
            Self::ConfigError => 6,
            Self::ApiError => 7,
            Self::IoError | Self::JsonError => 8,
            Self::Cancelled => 130,
        }
    }

    /// Whether running the same command again may succeed without changes.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ApiError | Self::PersistError | Self::CredentialStoreError | Self::Cancelled
        )
    }
}

// ── Error Enum ────────────────────────────────────────────────

/// Errors that can end a CLI command.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Interrupted")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

const fn auth_code(err: &AuthError) -> ErrorCode {
    match err {
        AuthError::NotFound => ErrorCode::NotAuthenticated,
        AuthError::Expired(_) => ErrorCode::TokenExpired,
        AuthError::Unavailable { .. } | AuthError::Store { .. } => ErrorCode::CredentialStoreError,
    }
}

impl Error {
    /// Map this error to its structured `ErrorCode`.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::Sync(err) => match err {
                SyncError::Scan { .. } => ErrorCode::ScanError,
                SyncError::State { .. } => ErrorCode::StateError,
                SyncError::Persist { .. } => ErrorCode::PersistError,
                SyncError::Credential(auth) => auth_code(auth),
                SyncError::Delivery { .. } | SyncError::Rejected(_) => ErrorCode::ApiError,
                SyncError::Read { .. } | SyncError::EmptyContent(_) => ErrorCode::IoError,
                SyncError::Json(_) => ErrorCode::JsonError,
                SyncError::Cancelled => ErrorCode::Cancelled,
            },
            Self::Auth(err) => auth_code(err),
            Self::Api(ApiError::Cancelled) | Self::Cancelled => ErrorCode::Cancelled,
            Self::Api(_) => ErrorCode::ApiError,
            Self::Config(_) => ErrorCode::ConfigError,
            Self::Io(_) => ErrorCode::IoError,
            Self::Json(_) => ErrorCode::JsonError,
            Self::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Category-based exit code, delegating to the `ErrorCode`.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        self.error_code().exit_code()
    }

    /// Recovery hint, or `None` if no actionable suggestion exists.
    #[must_use]
    pub fn hint(&self) -> Option<String> {
        match self.error_code() {
            ErrorCode::NotAuthenticated => Some(
                "Log in with `claude-history-sync login --access-token <TOKEN>`, \
                 or pass --token / set CLAUDE_HISTORY_TOKEN"
                    .to_string(),
            ),
            ErrorCode::TokenExpired => Some(
                "The stored token has expired. Log in again with \
                 `claude-history-sync login --access-token <TOKEN>`"
                    .to_string(),
            ),
            ErrorCode::CredentialStoreError => Some(
                "The credential store failed. Pass --token or set CLAUDE_HISTORY_TOKEN instead"
                    .to_string(),
            ),
            ErrorCode::ScanError => Some(
                "Check claude_data_dir in the config file, or set CLAUDE_HISTORY_DATA_DIR"
                    .to_string(),
            ),
            ErrorCode::StateError => match self {
                Self::Sync(SyncError::State { path, .. }) => Some(format!(
                    "Move {} aside to start over; every session will be re-sent",
                    path.display()
                )),
                _ => None,
            },
            ErrorCode::PersistError => Some(
                "Sessions uploaded in this run will be sent again next run. \
                 Check permissions and free space for the state file."
                    .to_string(),
            ),
            ErrorCode::ConfigError => Some(
                "Fix or remove ~/.claude-history-sync/config.json (or the file given by --config)"
                    .to_string(),
            ),
            ErrorCode::ApiError
            | ErrorCode::IoError
            | ErrorCode::JsonError
            | ErrorCode::Cancelled
            | ErrorCode::InternalError => None,
        }
    }

    /// `{"error": {code, message, retryable, exit_code, hint?}}`
    #[must_use]
    pub fn to_structured_json(&self) -> serde_json::Value {
        let code = self.error_code();
        let mut obj = serde_json::json!({
            "error": {
                "code": code.as_str(),
                "message": self.to_string(),
                "retryable": code.is_retryable(),
                "exit_code": code.exit_code(),
            }
        });

        if let Some(hint) = self.hint() {
            obj["error"]["hint"] = serde_json::Value::String(hint);
        }

        obj
    }
}
