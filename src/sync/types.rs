//! Sync types shared by the scanner, normalizer, hasher and engine.
//!
//! Everything here is derived from the log files on disk; the only
//! persisted shapes live in [`crate::sync::state`].

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::api::ApiError;
use crate::auth::AuthError;

/// A candidate conversation log found by the scanner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFile {
    /// Absolute (or root-relative, as given) path to the `.jsonl` file.
    pub path: PathBuf,
    /// Parent directory relative to the scan root, `/`-separated and
    /// `/`-prefixed. Files directly under the root map to `/`.
    pub project_path: String,
    /// File name without the `.jsonl` extension.
    pub session_id: String,
    /// Last modification time.
    pub modified: DateTime<Utc>,
    /// File size in bytes.
    pub size: u64,
}

/// One normalized conversation message.
///
/// Both accepted line shapes collapse into this record. `uuid` and `role`
/// are never empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    pub uuid: String,
    pub timestamp: String,
    pub role: String,
    pub content: String,
    /// Model name, empty when the line carried none.
    pub model: String,
    /// Record type of the structured shape (`user`, `assistant`, ...).
    pub record_type: Option<String>,
    /// Token count, zero when absent.
    pub tokens: i64,
}

/// Messages newer than a session's watermark.
///
/// A delta is never empty: "no new messages" is represented by `None`
/// at the call site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delta {
    pub session_id: String,
    pub project_path: String,
    pub messages: Vec<Message>,
    /// UUID of the last element of `messages`.
    pub new_last_uuid: String,
}

/// Aggregate counts for one sync run.
#[derive(Debug, Default, Clone, Serialize)]
pub struct SyncSummary {
    /// Number of log files found by the scanner.
    pub scanned: usize,
    /// Sessions whose delta was uploaded (or would be, in dry-run mode).
    pub synced: usize,
    /// Sessions whose local hash matched the remote hash.
    pub skipped: usize,
    /// Sessions whose hash differed but had no messages past the watermark.
    pub unchanged: usize,
    /// Sessions that failed to hash or deliver.
    pub errors: usize,
    /// Messages accepted by the server (or pending, in dry-run mode).
    pub messages: usize,
    /// Whether the run stopped early on an interrupt.
    pub cancelled: bool,
    /// Whether nothing was uploaded or persisted.
    pub dry_run: bool,
}

impl SyncSummary {
    /// Sessions that reached a terminal outcome.
    #[must_use]
    pub fn processed(&self) -> usize {
        self.synced + self.skipped + self.unchanged + self.errors
    }
}

/// Sync-specific errors.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The scan root could not be read.
    #[error("cannot scan {path}: {source}")]
    Scan {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A log file could not be opened or read.
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A session contained no valid messages, so it cannot be hashed.
    #[error("no valid messages in session {0}")]
    EmptyContent(String),

    /// Upload failed after the transport's own retries.
    #[error("delivery failed for session {session_id}: {source}")]
    Delivery {
        session_id: String,
        #[source]
        source: ApiError,
    },

    /// The server answered but did not accept the batch.
    #[error("server rejected session {0}")]
    Rejected(String),

    /// No usable bearer credential.
    #[error("not authenticated: {0}")]
    Credential(#[from] AuthError),

    /// State file exists but cannot be read or parsed.
    #[error("cannot load sync state from {path}: {message}")]
    State { path: PathBuf, message: String },

    /// State file could not be written.
    #[error("cannot save sync state to {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The run was interrupted.
    #[error("sync cancelled")]
    Cancelled,
}

impl SyncError {
    /// Whether this error aborts the whole run rather than one session.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Scan { .. }
                | Self::Credential(_)
                | Self::State { .. }
                | Self::Persist { .. }
                | Self::Cancelled
        )
    }
}

/// Result type for sync operations.
pub type SyncResult<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_processed() {
        let summary = SyncSummary {
            scanned: 9,
            synced: 2,
            skipped: 4,
            unchanged: 1,
            errors: 1,
            ..SyncSummary::default()
        };
        assert_eq!(summary.processed(), 8);
    }

    #[test]
    fn test_fatal_classification() {
        assert!(SyncError::Cancelled.is_fatal());
        assert!(
            SyncError::State {
                path: PathBuf::from("/tmp/state.json"),
                message: "bad".into(),
            }
            .is_fatal()
        );
        assert!(!SyncError::EmptyContent("a".into()).is_fatal());
        assert!(!SyncError::Rejected("s1".into()).is_fatal());
    }
}
