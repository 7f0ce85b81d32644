//! Content hashing for change detection.
//!
//! The server computes the same digest over its copy of a session, so the
//! canonical form here is an external contract: a metadata line followed by
//! one line per message, compact JSON with a fixed key order, joined by
//! `\n` with no trailing newline, hashed with SHA256.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::sync::types::{Message, SyncError, SyncResult};

/// Placeholder used when no message names a model.
const UNKNOWN_MODEL: &str = "unknown";

/// Session metadata line. Field order is the serialization order.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionMetadata<'a> {
    session_id: &'a str,
    /// Filled in by the server; always empty on this side.
    user_id: &'a str,
    project_path: &'a str,
    timestamp: &'a str,
    start_time: &'a str,
    end_time: &'a str,
    message_count: usize,
    models: Vec<&'a str>,
    total_tokens: i64,
}

/// One message line. Field order is the serialization order.
#[derive(Debug, Serialize)]
struct MessageLine<'a> {
    uuid: &'a str,
    timestamp: &'a str,
    role: &'a str,
    content: &'a str,
    #[serde(skip_serializing_if = "is_blank")]
    model: &'a str,
    #[serde(skip_serializing_if = "is_zero")]
    tokens: i64,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_blank(s: &&str) -> bool {
    s.is_empty()
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_zero(n: &i64) -> bool {
    *n == 0
}

impl<'a> From<&'a Message> for MessageLine<'a> {
    fn from(m: &'a Message) -> Self {
        Self {
            uuid: &m.uuid,
            timestamp: &m.timestamp,
            role: &m.role,
            content: &m.content,
            model: &m.model,
            tokens: m.tokens,
        }
    }
}

/// Compute a SHA256 hash of a string, as lowercase hex.
#[must_use]
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Build the canonical JSONL document for a session.
///
/// # Errors
///
/// Returns [`SyncError::EmptyContent`] when `messages` is empty.
pub fn canonical_document(
    session_id: &str,
    project_path: &str,
    messages: &[Message],
) -> SyncResult<String> {
    let (Some(first), Some(last)) = (messages.first(), messages.last()) else {
        return Err(SyncError::EmptyContent(session_id.to_string()));
    };

    let metadata = SessionMetadata {
        session_id,
        user_id: "",
        project_path,
        timestamp: &first.timestamp,
        start_time: &first.timestamp,
        end_time: &last.timestamp,
        message_count: messages.len(),
        models: distinct_models(messages),
        total_tokens: messages.iter().map(|m| m.tokens).sum(),
    };

    let mut document = serde_json::to_string(&metadata)?;
    for message in messages {
        document.push('\n');
        document.push_str(&serde_json::to_string(&MessageLine::from(message))?);
    }
    Ok(document)
}

/// Hash a session's normalized content.
///
/// # Errors
///
/// Returns [`SyncError::EmptyContent`] when `messages` is empty.
pub fn hash_session(session_id: &str, project_path: &str, messages: &[Message]) -> SyncResult<String> {
    canonical_document(session_id, project_path, messages).map(|doc| content_hash(&doc))
}

/// Distinct non-empty models in first-seen order, or `["unknown"]`.
fn distinct_models(messages: &[Message]) -> Vec<&str> {
    let mut models: Vec<&str> = Vec::new();
    for message in messages {
        if !message.model.is_empty() && !models.contains(&message.model.as_str()) {
            models.push(&message.model);
        }
    }
    if models.is_empty() {
        models.push(UNKNOWN_MODEL);
    }
    models
}

/// Check if a session must be synced given the remote hash.
///
/// Returns `true` if there is no remote hash or it differs.
#[must_use]
pub fn has_changed(local_hash: &str, remote_hash: Option<&str>) -> bool {
    remote_hash.is_none_or(|h| h.is_empty() || h != local_hash)
}
