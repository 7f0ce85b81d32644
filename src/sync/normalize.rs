//! Line normalization for conversation logs.
//!
//! Two line shapes are accepted, tried in order:
//!
//! 1. **Structured**: `{"uuid", "timestamp", "type", "message": {"role", "model", "content"}}`
//!    where `content` is a string or a list of typed parts.
//! 2. **Legacy**: `{"uuid", "timestamp", "role", "content", "model", "tokens"}` flat.
//!
//! Lines that fit neither shape, or that end up without a `uuid` or
//! `role`, are dropped without error.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use serde::Deserialize;

use crate::sync::types::{Message, SyncError, SyncResult};

/// Structured line as written by current log writers.
#[derive(Debug, Deserialize)]
struct StructuredLine {
    uuid: Option<String>,
    timestamp: Option<String>,
    #[serde(rename = "type")]
    record_type: Option<String>,
    message: Option<StructuredBody>,
}

#[derive(Debug, Deserialize)]
struct StructuredBody {
    role: Option<String>,
    model: Option<String>,
    content: Option<StructuredContent>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StructuredContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Deserialize)]
struct ContentPart {
    #[serde(rename = "type")]
    part_type: Option<String>,
    text: Option<String>,
}

/// Flat line as written by older log writers.
#[derive(Debug, Deserialize)]
struct LegacyLine {
    uuid: Option<String>,
    timestamp: Option<String>,
    role: Option<String>,
    content: Option<String>,
    model: Option<String>,
    tokens: Option<i64>,
}

impl StructuredContent {
    /// The string content, or the first `text` part's text.
    fn into_text(self) -> String {
        match self {
            Self::Text(text) => text,
            Self::Parts(parts) => parts
                .into_iter()
                .find(|p| p.part_type.as_deref() == Some("text"))
                .and_then(|p| p.text)
                .unwrap_or_default(),
        }
    }
}

impl StructuredLine {
    fn into_message(self) -> Option<Message> {
        let body = self.message?;
        let message = Message {
            uuid: self.uuid.unwrap_or_default(),
            timestamp: self.timestamp.unwrap_or_default(),
            role: body.role.unwrap_or_default(),
            content: body.content.map(StructuredContent::into_text).unwrap_or_default(),
            model: body.model.unwrap_or_default(),
            record_type: self.record_type,
            tokens: 0,
        };
        is_identified(&message).then_some(message)
    }
}

impl LegacyLine {
    fn into_message(self) -> Option<Message> {
        let message = Message {
            uuid: self.uuid.unwrap_or_default(),
            timestamp: self.timestamp.unwrap_or_default(),
            role: self.role.unwrap_or_default(),
            content: self.content.unwrap_or_default(),
            model: self.model.unwrap_or_default(),
            record_type: None,
            tokens: self.tokens.unwrap_or(0),
        };
        is_identified(&message).then_some(message)
    }
}

fn is_identified(message: &Message) -> bool {
    !message.uuid.is_empty() && !message.role.is_empty()
}

/// Normalize one raw line, or `None` if it should be discarded.
#[must_use]
pub fn normalize_line(line: &[u8]) -> Option<Message> {
    if line.is_empty() {
        return None;
    }

    if let Some(message) = serde_json::from_slice::<StructuredLine>(line)
        .ok()
        .and_then(StructuredLine::into_message)
    {
        return Some(message);
    }

    serde_json::from_slice::<LegacyLine>(line)
        .ok()
        .and_then(LegacyLine::into_message)
}

/// Read and normalize every line of a log file, in file order.
///
/// The file is closed before this returns.
///
/// # Errors
///
/// Returns [`SyncError::Read`] if the file cannot be opened or read.
/// Malformed lines are skipped, not reported.
pub fn read_messages(path: &Path) -> SyncResult<Vec<Message>> {
    let read_error = |source| SyncError::Read {
        path: path.to_path_buf(),
        source,
    };

    let file = File::open(path).map_err(read_error)?;
    let reader = BufReader::new(file);
    let mut messages = Vec::new();

    for line in reader.split(b'\n') {
        let mut line = line.map_err(read_error)?;
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        if let Some(message) = normalize_line(&line) {
            messages.push(message);
        }
    }

    Ok(messages)
}
