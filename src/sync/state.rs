//! Persistent sync progress.
//!
//! One JSON file records, per session, the UUID of the last delivered
//! message (the watermark). It is loaded once per run, updated in memory as
//! sessions succeed, and replaced atomically at the end of the run.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;

use crate::sync::file::atomic_write;
use crate::sync::types::{SyncError, SyncResult};

/// State file name inside the app directory.
pub const STATE_FILE: &str = "state.json";

/// Progress for one session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    #[serde(default)]
    pub last_synced_uuid: String,
    /// RFC 3339 time of the last successful upload.
    #[serde(default)]
    pub last_sync_at: String,
    /// Messages the server reported processing in the last upload.
    #[serde(default)]
    pub message_count: usize,
}

/// Progress for all sessions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncState {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub sessions: HashMap<String, SessionState>,
    /// RFC 3339 time of the last save.
    #[serde(default)]
    pub last_sync_at: String,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<HashMap<String, SessionState>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<HashMap<String, SessionState>>::deserialize(deserializer)
        .map(Option::unwrap_or_default)
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

impl SyncState {
    /// Load state from `path`.
    ///
    /// A missing file yields an empty state.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::State`] if the file exists but cannot be read
    /// or parsed.
    pub fn load(path: &Path) -> SyncResult<Self> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "No sync state yet");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(SyncError::State {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                });
            }
        };

        serde_json::from_str(&content).map_err(|e| SyncError::State {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Stamp `last_sync_at` and atomically write the state to `path`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Persist`] if the file cannot be written.
    pub fn save(&mut self, path: &Path) -> SyncResult<()> {
        self.last_sync_at = now_rfc3339();
        let content = serde_json::to_string_pretty(self)?;
        atomic_write(path, content.as_bytes()).map_err(|source| SyncError::Persist {
            path: path.to_path_buf(),
            source,
        })
    }

    /// The session's watermark, empty if it was never synced.
    #[must_use]
    pub fn last_synced_uuid(&self, session_id: &str) -> &str {
        self.sessions
            .get(session_id)
            .map_or("", |s| s.last_synced_uuid.as_str())
    }

    /// Record a successful delivery.
    pub fn update_session(&mut self, session_id: &str, last_uuid: &str, message_count: usize) {
        self.sessions.insert(
            session_id.to_string(),
            SessionState {
                last_synced_uuid: last_uuid.to_string(),
                last_sync_at: now_rfc3339(),
                message_count,
            },
        );
    }

    /// Total messages recorded across sessions.
    #[must_use]
    pub fn total_messages(&self) -> usize {
        self.sessions.values().map(|s| s.message_count).sum()
    }
}

/// Default state location: `<app dir>/state.json`.
#[must_use]
pub fn default_state_path(app_dir: &Path) -> PathBuf {
    app_dir.join(STATE_FILE)
}
