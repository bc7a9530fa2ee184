use std::time::Duration;

/// Timeout and retry settings applied to every upstream request.
///
/// Defaults match the product behavior: a 30 second overall timeout and one
/// retry. Backoff doubles per attempt starting from `backoff`.
#[derive(Debug, Clone)]
pub struct RequestPolicy {
    pub timeout: Duration,
    pub retries: u32,
    pub backoff: Duration,
}

impl Default for RequestPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            retries: 1,
            backoff: Duration::from_millis(500),
        }
    }
}

impl RequestPolicy {
    /// Policy for calls that must not hold up an interactive flow, such as
    /// the emergency backup log write.
    pub fn quick() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            retries: 0,
            backoff: Duration::from_millis(250),
        }
    }
}

/// Failure of a single logical fetch, after retries are exhausted.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("upstream returned HTTP {status}")]
    Status { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("response body was not the expected JSON: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("invalid request URL: {0}")]
    InvalidUrl(String),
}

impl FetchError {
    /// Whether another attempt could plausibly succeed. Client errors and
    /// malformed bodies are terminal; timeouts, transport failures, and
    /// server errors are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Timeout(_) | FetchError::Transport(_) => true,
            FetchError::Status { status, .. } => *status >= 500,
            FetchError::Decode(_) | FetchError::InvalidUrl(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_matches_product_settings() {
        let policy = RequestPolicy::default();
        assert_eq!(policy.timeout, Duration::from_secs(30));
        assert_eq!(policy.retries, 1);
    }

    #[test]
    fn test_server_errors_are_retryable() {
        let err = FetchError::Status {
            status: 503,
            body: String::new(),
        };
        assert!(err.is_retryable());
    }

    #[test]
    fn test_client_errors_are_terminal() {
        let err = FetchError::Status {
            status: 404,
            body: String::new(),
        };
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_timeouts_are_retryable() {
        assert!(FetchError::Timeout(Duration::from_secs(30)).is_retryable());
    }
}
