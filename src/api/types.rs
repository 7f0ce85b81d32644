//! Wire types for the history API.

use serde::{Deserialize, Deserializer, Serialize};

use crate::sync::{Delta, Message};

/// `POST /sync` request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    pub machine_id: String,
    pub session_id: String,
    pub project_path: String,
    pub messages: Vec<ApiMessage>,
    /// RFC 3339 time the request was built.
    pub timestamp: String,
}

impl SyncRequest {
    /// Build the upload for a delta.
    #[must_use]
    pub fn from_delta(delta: &Delta, machine_id: &str, timestamp: String) -> Self {
        Self {
            machine_id: machine_id.to_string(),
            session_id: delta.session_id.clone(),
            project_path: delta.project_path.clone(),
            messages: delta.messages.iter().map(ApiMessage::from).collect(),
            timestamp,
        }
    }
}

/// A message as uploaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiMessage {
    pub uuid: String,
    pub timestamp: String,
    pub role: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub model: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub tokens: i64,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_zero(n: &i64) -> bool {
    *n == 0
}

impl From<&Message> for ApiMessage {
    fn from(m: &Message) -> Self {
        Self {
            uuid: m.uuid.clone(),
            timestamp: m.timestamp.clone(),
            role: m.role.clone(),
            content: m.content.clone(),
            model: m.model.clone(),
            tokens: m.tokens,
        }
    }
}

/// `POST /sync` response body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    pub success: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub processed: usize,
    #[serde(default, deserialize_with = "null_as_default")]
    pub session_id: String,
}

/// One entry of `GET /conversations`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    #[serde(default, deserialize_with = "null_as_default")]
    pub session_id: String,
    /// Content hash computed server-side. Empty when the server has none.
    #[serde(default, deserialize_with = "null_as_default")]
    pub hash: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub date: String,
}

/// `GET /conversations` response body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationList {
    #[serde(default, deserialize_with = "null_as_default")]
    pub conversations: Vec<Conversation>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub total: usize,
}

/// Response fields may be `null`; read them as their zero value.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}
