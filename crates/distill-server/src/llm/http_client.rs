// crates/distill-server/src/llm/http_client.rs
// Shared HTTP client with retry for the LLM providers

use anyhow::{Result, anyhow};
use reqwest::Client;
use std::time::Duration;
use tracing::warn;

/// Maximum retry attempts for transient failures
const DEFAULT_MAX_ATTEMPTS: u32 = 3;
/// Base backoff duration between retries (doubles each attempt)
const DEFAULT_BASE_BACKOFF_SECS: u64 = 1;
/// Request timeout; the annotator is detached so nothing waits on this
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;
/// Connect timeout
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// What a single HTTP attempt produced.
///
/// Retry is reserved for failures where the request provably did not
/// complete (connect/timeout) or the provider explicitly said try
/// again (429/5xx). Anything else aborts: a resend could double-apply
/// a request the provider already processed.
enum AttemptOutcome {
    Done(String),
    Retry(String),
    Abort(anyhow::Error),
}

/// HTTP client wrapper with retry/backoff for provider calls
pub struct LlmHttpClient {
    client: Client,
    pub max_attempts: u32,
    pub base_backoff: Duration,
}

impl LlmHttpClient {
    pub fn new() -> Self {
        Self::with_timeouts(
            Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        )
    }

    pub fn with_timeouts(request_timeout: Duration, connect_timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(request_timeout)
            .connect_timeout(connect_timeout)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_backoff: Duration::from_secs(DEFAULT_BASE_BACKOFF_SECS),
        }
    }

    /// Execute an HTTP request, retrying transient failures with
    /// doubling backoff up to `max_attempts` extra tries.
    ///
    /// The `build_request` closure is called on each attempt with the
    /// reqwest Client and the request body, so callers control URL,
    /// headers, and auth.
    pub async fn execute_request_with_retry<F>(
        &self,
        request_id: &str,
        body: String,
        build_request: F,
    ) -> Result<String>
    where
        F: Fn(&Client, String) -> reqwest::RequestBuilder,
    {
        let mut attempt = 0u32;
        let mut wait = self.base_backoff;

        loop {
            match self.attempt_once(&build_request, body.clone()).await {
                AttemptOutcome::Done(text) => return Ok(text),
                AttemptOutcome::Abort(e) => return Err(e),
                AttemptOutcome::Retry(reason) => {
                    attempt += 1;
                    if attempt > self.max_attempts {
                        return Err(anyhow!(
                            "provider still failing after {attempt} attempts: {reason}"
                        ));
                    }
                    warn!(
                        request_id = %request_id,
                        reason = %reason,
                        "transient provider failure, retrying in {:?}",
                        wait
                    );
                    tokio::time::sleep(wait).await;
                    wait *= 2;
                }
            }
        }
    }

    /// One send, classified for the retry driver.
    async fn attempt_once<F>(&self, build_request: &F, body: String) -> AttemptOutcome
    where
        F: Fn(&Client, String) -> reqwest::RequestBuilder,
    {
        let reply = match build_request(&self.client, body).send().await {
            Ok(reply) => reply,
            Err(e) if e.is_connect() || e.is_timeout() => {
                return AttemptOutcome::Retry(format!("transport error: {e}"));
            }
            Err(e) => return AttemptOutcome::Abort(anyhow!("request failed: {e}")),
        };

        let status = reply.status();
        if status.is_success() {
            return match reply.text().await {
                Ok(text) => AttemptOutcome::Done(text),
                Err(e) => AttemptOutcome::Abort(anyhow!("failed to read response body: {e}")),
            };
        }

        let detail = reply.text().await.unwrap_or_default();
        if status.as_u16() == 429 || status.is_server_error() {
            AttemptOutcome::Retry(format!("status {status}: {detail}"))
        } else {
            AttemptOutcome::Abort(anyhow!("provider returned {status}: {detail}"))
        }
    }
}

impl Default for LlmHttpClient {
    fn default() -> Self {
        Self::new()
    }
}
