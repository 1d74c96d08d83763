//! HTTP transport shared by the ledger clients, with 429 backoff.

use std::time::Duration;

use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::TransportError;

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Backoff applied when an endpoint answers `429 Too Many Requests`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub initial_delay: Duration,
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_attempts: 5,
        }
    }
}

impl RetryPolicy {
    /// No sleeping between attempts, for tests.
    #[must_use]
    pub const fn immediate(max_attempts: u32) -> Self {
        Self {
            initial_delay: Duration::ZERO,
            max_attempts,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ThrottledClient {
    client: reqwest::Client,
    policy: RetryPolicy,
}

impl ThrottledClient {
    pub fn new(policy: RetryPolicy) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()?;
        Ok(Self { client, policy })
    }

    #[must_use]
    pub const fn inner(&self) -> &reqwest::Client {
        &self.client
    }

    #[must_use]
    pub const fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Sends an idempotent request, sleeping with doubling delay while the
    /// endpoint throttles.
    pub async fn send(&self, request: RequestBuilder) -> Result<Response, TransportError> {
        let mut delay = self.policy.initial_delay;
        let mut attempt = 1;

        loop {
            let Some(current) = request.try_clone() else {
                return Ok(request.send().await?);
            };

            let response = current.send().await?;
            if response.status() != StatusCode::TOO_MANY_REQUESTS {
                return Ok(response);
            }

            if attempt >= self.policy.max_attempts {
                return Err(TransportError::Throttled {
                    url: response.url().to_string(),
                    attempts: attempt,
                });
            }

            warn!(
                url = %response.url(),
                attempt,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "endpoint is rate limiting, backing off"
            );
            tokio::time::sleep(delay).await;
            delay = delay.saturating_mul(2);
            attempt += 1;
        }
    }

    /// Sends a one-shot submission. Throttling is reported, never retried.
    pub async fn send_once(&self, request: RequestBuilder) -> Result<Response, TransportError> {
        let response = request.send().await?;
        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            return Err(TransportError::Throttled {
                url: response.url().to_string(),
                attempts: 1,
            });
        }
        Ok(response)
    }
}

/// Fails on non-2xx statuses and decodes the body as JSON.
pub async fn decode_json<T: DeserializeOwned>(response: Response) -> Result<T, TransportError> {
    let status = response.status();
    let url = response.url().to_string();
    let body = response.text().await?;

    if !status.is_success() {
        return Err(TransportError::Status {
            status: status.as_u16(),
            url,
            body,
        });
    }

    debug!(%url, bytes = body.len(), "decoding response");
    serde_json::from_str(&body).map_err(|e| TransportError::Decode(format!("{url}: {e}")))
}
