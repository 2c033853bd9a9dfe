use std::fmt;
use std::time::Duration;

use quota_window::TimeUnit;
use serde::Deserialize;
use serde::Serialize;

/// The document creation endpoint of the production API.
pub const DEFAULT_ENDPOINT: &str = "https://ismp.crpt.ru/api/v1/lk/documents/create";

/// Settings for an [`ApiClient`](crate::ApiClient).
///
/// The quota is `request_limit` calls per one `time_unit`, measured over a
/// sliding window.
#[derive(Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Unit the request limit is expressed in
    pub time_unit: TimeUnit,

    /// Maximum requests per `time_unit`, must be positive
    pub request_limit: u32,

    /// Bearer token sent with every request
    pub auth_token: String,

    /// Document creation endpoint (default: production API)
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Per-request transport timeout in milliseconds (default: 30000)
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_timeout_ms() -> u64 {
    30_000
}

impl ClientConfig {
    pub fn new(time_unit: TimeUnit, request_limit: u32, auth_token: impl Into<String>) -> Self {
        Self {
            time_unit,
            request_limit,
            auth_token: auth_token.into(),
            endpoint: default_endpoint(),
            timeout_ms: default_timeout_ms(),
        }
    }

    /// Send documents somewhere other than the production API.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Bound how long a single request may take once admitted.
    ///
    /// Time spent waiting for rate limit capacity is not included.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

// Keep the token out of logs
impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("time_unit", &self.time_unit)
            .field("request_limit", &self.request_limit)
            .field("auth_token", &"<redacted>")
            .field("endpoint", &self.endpoint)
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}
