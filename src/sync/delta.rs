//! Watermark-based delta extraction.

use crate::sync::types::{Delta, LogFile, Message};

/// Messages strictly after the watermark.
///
/// - Empty watermark: everything is new.
/// - Watermark found: the suffix after its first occurrence.
/// - Watermark not found: the file was rewritten, so everything is new
///   again. This can re-deliver messages the server already has.
#[must_use]
pub fn new_messages<'a>(messages: &'a [Message], last_synced_uuid: &str) -> &'a [Message] {
    if last_synced_uuid.is_empty() {
        return messages;
    }

    messages
        .iter()
        .position(|m| m.uuid == last_synced_uuid)
        .map_or(messages, |i| &messages[i + 1..])
}

/// Build the delta for a session, or `None` when nothing is new.
#[must_use]
pub fn extract_delta(file: &LogFile, messages: &[Message], last_synced_uuid: &str) -> Option<Delta> {
    let fresh = new_messages(messages, last_synced_uuid);
    let last = fresh.last()?;

    Some(Delta {
        session_id: file.session_id.clone(),
        project_path: file.project_path.clone(),
        new_last_uuid: last.uuid.clone(),
        messages: fresh.to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::path::PathBuf;

    fn file() -> LogFile {
        LogFile {
            path: PathBuf::from("/data/test/test-session.jsonl"),
            project_path: "/test".into(),
            session_id: "test-session".into(),
            modified: Utc::now(),
            size: 0,
        }
    }

    fn messages() -> Vec<Message> {
        ["msg-1", "msg-2", "msg-3"]
            .into_iter()
            .map(|uuid| Message {
                uuid: uuid.into(),
                role: "user".into(),
                ..Message::default()
            })
            .collect()
    }

    fn uuids(delta: &Delta) -> Vec<&str> {
        delta.messages.iter().map(|m| m.uuid.as_str()).collect()
    }

    #[test]
    fn test_delta_all_new() {
        let delta = extract_delta(&file(), &messages(), "").unwrap();
        assert_eq!(uuids(&delta), ["msg-1", "msg-2", "msg-3"]);
        assert_eq!(delta.new_last_uuid, "msg-3");
        assert_eq!(delta.session_id, "test-session");
        assert_eq!(delta.project_path, "/test");
    }

    #[test]
    fn test_delta_incremental() {
        let delta = extract_delta(&file(), &messages(), "msg-1").unwrap();
        assert_eq!(uuids(&delta), ["msg-2", "msg-3"]);
        assert_eq!(delta.new_last_uuid, "msg-3");
    }

    #[test]
    fn test_delta_up_to_date_is_none() {
        assert!(extract_delta(&file(), &messages(), "msg-3").is_none());
    }

    #[test]
    fn test_delta_unknown_watermark_resyncs_everything() {
        let delta = extract_delta(&file(), &messages(), "msg-gone").unwrap();
        assert_eq!(uuids(&delta), ["msg-1", "msg-2", "msg-3"]);
    }

    #[test]
    fn test_delta_empty_session_is_none() {
        assert!(extract_delta(&file(), &[], "").is_none());
        assert!(extract_delta(&file(), &[], "msg-1").is_none());
    }

    #[test]
    fn test_new_messages_uses_first_occurrence() {
        let mut msgs = messages();
        msgs.push(Message {
            uuid: "msg-1".into(),
            role: "user".into(),
            ..Message::default()
        });
        let fresh = new_messages(&msgs, "msg-1");
        assert_eq!(fresh.len(), 3);
        assert_eq!(fresh[0].uuid, "msg-2");
    }
}
