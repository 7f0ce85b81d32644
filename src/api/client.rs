//! HTTPS client for the history API.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::retry::{RetryPolicy, is_retryable_status};
use super::types::{ConversationList, SyncRequest, SyncResponse};
use super::{ApiError, HistoryApi};

/// Per-request timeout.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Header identifying the uploading machine.
pub const MACHINE_ID_HEADER: &str = "X-Machine-ID";

/// History API over HTTPS.
///
/// Every call observes the run's cancellation token, including the waits
/// between retries.
pub struct HttpHistoryApi {
    client: reqwest::Client,
    endpoint: String,
    machine_id: String,
    retry: RetryPolicy,
    cancel: CancellationToken,
}

impl HttpHistoryApi {
    /// Create a client for `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Request`] if the HTTP client cannot be built.
    pub fn new(
        endpoint: &str,
        machine_id: &str,
        cancel: CancellationToken,
    ) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("claude-history-sync/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            machine_id: machine_id.to_string(),
            retry: RetryPolicy::default(),
            cancel,
        })
    }

    /// Replace the retry policy.
    #[must_use]
    pub const fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Base URL requests are sent to.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.endpoint)
    }

    /// Send the request built by `build`, retrying 429 and 5xx answers.
    async fn execute<F>(&self, build: F) -> Result<reqwest::Response, ApiError>
    where
        F: Fn() -> reqwest::RequestBuilder + Send + Sync,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;

            let response = tokio::select! {
                biased;
                () = self.cancel.cancelled() => return Err(ApiError::Cancelled),
                sent = build().send() => sent?,
            };

            let status = response.status();
            if status.is_success() {
                return Ok(response);
            }

            let body = response.text().await.unwrap_or_default();
            let err = ApiError::Http {
                status: status.as_u16(),
                body,
            };

            if !is_retryable_status(status.as_u16()) {
                return Err(err);
            }
            if attempt >= self.retry.max_attempts() {
                return Err(ApiError::RetriesExhausted {
                    attempts: attempt,
                    last: Box::new(err),
                });
            }

            let delay = self.retry.backoff(attempt);
            warn!(
                status = status.as_u16(),
                attempt,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "Retrying history API request"
            );

            tokio::select! {
                biased;
                () = self.cancel.cancelled() => return Err(ApiError::Cancelled),
                () = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ApiError> {
        response
            .json::<T>()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }
}

impl HistoryApi for HttpHistoryApi {
    async fn conversation_hashes(&self, token: &str) -> Result<HashMap<String, String>, ApiError> {
        let url = self.url("/conversations");
        debug!(%url, "Fetching remote conversation hashes");

        let response = self
            .execute(|| {
                self.client
                    .get(&url)
                    .header(AUTHORIZATION, format!("Bearer {token}"))
                    .header(MACHINE_ID_HEADER, &self.machine_id)
            })
            .await?;

        let list: ConversationList = Self::decode(response).await?;
        Ok(list
            .conversations
            .into_iter()
            .map(|c| (c.session_id, c.hash))
            .collect())
    }

    async fn upload(&self, token: &str, request: &SyncRequest) -> Result<SyncResponse, ApiError> {
        let url = self.url("/sync");
        debug!(
            %url,
            session_id = %request.session_id,
            messages = request.messages.len(),
            "Uploading session"
        );

        let response = self
            .execute(|| {
                self.client
                    .post(&url)
                    .header(AUTHORIZATION, format!("Bearer {token}"))
                    .header(MACHINE_ID_HEADER, &self.machine_id)
                    .header(CONTENT_TYPE, "application/json")
                    .json(request)
            })
            .await?;

        Self::decode(response).await
    }
}
