//! History API transport.
//!
//! The sync engine needs two remote operations: list the content hashes of
//! sessions the server already has, and upload a batch of messages for one
//! session. [`HistoryApi`] is that seam; [`HttpHistoryApi`] implements it
//! over HTTPS with bounded retries.

pub mod client;
pub mod retry;
pub mod types;

use std::collections::HashMap;
use std::future::Future;

pub use client::HttpHistoryApi;
pub use retry::RetryPolicy;
pub use types::{ApiMessage, Conversation, ConversationList, SyncRequest, SyncResponse};

/// Transport errors.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Non-success HTTP status.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// Connection, TLS or timeout failure.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Response body did not match the expected shape.
    #[error("invalid response: {0}")]
    Decode(String),

    /// Retryable status on every attempt.
    #[error("giving up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: Box<ApiError> },

    /// The run was interrupted while a request or backoff was pending.
    #[error("request cancelled")]
    Cancelled,
}

impl ApiError {
    /// HTTP status of the failure, if the server answered.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            Self::RetriesExhausted { last, .. } => last.status(),
            _ => None,
        }
    }
}

/// Remote side of a sync run.
pub trait HistoryApi: Send + Sync {
    /// Map of session id to the server's content hash.
    fn conversation_hashes(
        &self,
        token: &str,
    ) -> impl Future<Output = Result<HashMap<String, String>, ApiError>> + Send;

    /// Upload one session's new messages.
    fn upload(
        &self,
        token: &str,
        request: &SyncRequest,
    ) -> impl Future<Output = Result<SyncResponse, ApiError>> + Send;
}
