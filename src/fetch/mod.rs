//! HTTP plumbing shared by every agency adapter and backend client.
//!
//! One [`HttpClient`] abstraction, composable auth decorators, and a single
//! retry/timeout [`RequestPolicy`] so no call site grows its own ad hoc
//! wrapper.

mod auth;
mod basic;
mod client;
mod policy;

pub use auth::{HeaderAuth, QueryAuth};
pub use basic::BasicClient;
pub use client::HttpClient;
pub use policy::{FetchError, RequestPolicy};

use reqwest::Method;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

/// Issues a GET for `url` under `policy` and returns the response body.
///
/// Timeouts, transport errors, and 5xx responses are retried up to
/// `policy.retries` extra attempts with doubling backoff; 4xx responses are
/// not, since a rejected request does not get better on its own.
#[tracing::instrument(skip(client, policy), fields(url))]
pub async fn fetch_bytes<C: HttpClient + ?Sized>(
    client: &C,
    url: &str,
    policy: &RequestPolicy,
) -> Result<Vec<u8>, FetchError> {
    let mut wait = policy.backoff;
    let mut attempt: u32 = 0;

    loop {
        let outcome = match tokio::time::timeout(policy.timeout, attempt_get(client, url)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout(policy.timeout)),
        };

        match outcome {
            Ok(bytes) => {
                debug!(bytes = bytes.len(), attempt, "Upstream response received");
                return Ok(bytes);
            }
            Err(err) if err.is_retryable() && attempt < policy.retries => {
                attempt += 1;
                warn!(error = %err, attempt, backoff_ms = wait.as_millis() as u64, "Retrying upstream request");
                tokio::time::sleep(wait).await;
                wait *= 2;
            }
            Err(err) => return Err(err),
        }
    }
}

/// [`fetch_bytes`] followed by a JSON decode into `T`.
pub async fn fetch_json<T: DeserializeOwned, C: HttpClient + ?Sized>(
    client: &C,
    url: &str,
    policy: &RequestPolicy,
) -> Result<T, FetchError> {
    let bytes = fetch_bytes(client, url, policy).await?;
    serde_json::from_slice(&bytes).map_err(FetchError::Decode)
}

async fn attempt_get<C: HttpClient + ?Sized>(client: &C, url: &str) -> Result<Vec<u8>, FetchError> {
    let parsed = url
        .parse()
        .map_err(|_| FetchError::InvalidUrl(url.to_string()))?;
    let req = reqwest::Request::new(Method::GET, parsed);

    let resp = client.execute(req).await?;
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(FetchError::Status {
            status: status.as_u16(),
            body: truncate(&body, 512),
        });
    }

    Ok(resp.bytes().await?.to_vec())
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}
