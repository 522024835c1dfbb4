use serde::{Deserialize, Serialize};
use std::time::Duration;

// Default configuration values
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Client configuration.
///
/// `refresh_wait_seconds` bounds how long a request queued behind an
/// in-flight token refresh will wait before failing with a network error.
/// Unset means wait indefinitely, which matches the base protocol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the API, without a trailing slash.
    pub base_url: String,
    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    /// Optional cap on how long a queued waiter may be suspended.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_wait_seconds: Option<u64>,
}

fn default_request_timeout() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

impl ClientConfig {
    /// Create a configuration with defaults for everything but the base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            request_timeout_seconds: DEFAULT_REQUEST_TIMEOUT_SECS,
            refresh_wait_seconds: None,
        }
    }

    /// Bound the time a queued waiter may spend suspended behind a refresh.
    pub fn with_refresh_wait(mut self, wait: Duration) -> Self {
        self.refresh_wait_seconds = Some(wait.as_secs());
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    pub fn refresh_wait(&self) -> Option<Duration> {
        self.refresh_wait_seconds.map(Duration::from_secs)
    }
}
